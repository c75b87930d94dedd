//! S3 Document Store Implementation
//!
//! This module implements the `DocumentStore` trait using an S3-compatible object
//! store as the backend. It handles all S3 operations and converts AWS errors to
//! domain errors.

use std::fmt;
use std::time::Duration;

use aws_sdk_s3::{primitives::ByteStream, Client};
use bytes::Bytes;
use sensorlink_domain::{
    ingestion::{entity::Measurement, error::IngestionError, ids::DocumentKey},
    storage::DocumentStore,
};
use tracing::{debug, error, info, instrument};

/// Where measurement documents live: bucket, then scope, then collection
///
/// Scope and collection become the object key prefix, so several collections can
/// share one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAddress {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
}

impl CollectionAddress {
    pub fn new(
        bucket: impl Into<String>,
        scope: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    /// Object key of the document stored under `key`
    pub fn object_key(&self, key: &DocumentKey) -> String {
        format!("{}/{}/{}.json", self.scope, self.collection, key)
    }
}

impl fmt::Display for CollectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.bucket, self.scope, self.collection)
    }
}

/// S3-based implementation of the DocumentStore port
///
/// This adapter translates document upserts into S3 `PutObject` calls. Writing the
/// same key twice replaces the object, so redelivered messages overwrite their
/// document instead of duplicating it.
///
/// ## Configuration
///
/// The store requires:
/// - A [`CollectionAddress`] naming the bucket and key prefix
/// - An AWS SDK S3 Client (configured with region, credentials, endpoint)
///
/// ## Error Handling
///
/// SDK errors during upsert are converted to `IngestionError::StorageFailure`;
/// failures of the startup readiness check become `IngestionError::ConnectionError`.
#[derive(Clone)]
pub struct S3DocumentStore {
    client: Client,
    address: CollectionAddress,
}

impl S3DocumentStore {
    /// Create a new S3 document store
    ///
    /// # Arguments
    ///
    /// * `client` - Configured AWS S3 client
    /// * `address` - Bucket and key prefix of the collection
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use aws_sdk_s3::Client;
    /// use sensorlink_s3::{CollectionAddress, S3DocumentStore};
    ///
    /// # async fn example() {
    /// let config = aws_config::load_from_env().await;
    /// let s3_client = Client::new(&config);
    /// let address = CollectionAddress::new("telemetry", "sensors", "measurements");
    /// let store = S3DocumentStore::new(s3_client, address);
    /// # }
    /// ```
    pub fn new(client: Client, address: CollectionAddress) -> Self {
        info!(collection = %address, "Initializing S3DocumentStore");
        Self { client, address }
    }

    /// Get the collection address
    pub fn address(&self) -> &CollectionAddress {
        &self.address
    }

    /// Wait until the bucket answers, or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::ConnectionError` if the bucket is unreachable, access
    /// is denied, or the check does not finish in time
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), IngestionError> {
        let bucket = &self.address.bucket;
        debug!(bucket = %bucket, timeout_ms = timeout.as_millis() as u64, "Checking bucket");

        let head = self.client.head_bucket().bucket(bucket).send();
        match tokio::time::timeout(timeout, head).await {
            Ok(Ok(_)) => {
                info!(bucket = %bucket, "Bucket is ready");
                Ok(())
            }
            Ok(Err(err)) => {
                error!(bucket = %bucket, error = ?err, "Bucket readiness check failed");
                Err(IngestionError::connection_error(format!(
                    "S3 head_bucket failed for bucket '{}': {}",
                    bucket, err
                )))
            }
            Err(_) => Err(IngestionError::connection_error(format!(
                "bucket '{}' not ready after {:?}",
                bucket, timeout
            ))),
        }
    }
}

impl DocumentStore for S3DocumentStore {
    #[instrument(skip(self, record), fields(key = %key, collection = %self.address))]
    fn upsert(
        &self,
        key: &DocumentKey,
        record: &Measurement,
    ) -> impl std::future::Future<Output = Result<(), IngestionError>> + Send {
        let client = self.client.clone();
        let bucket = self.address.bucket.clone();
        let object_key = self.address.object_key(key);
        let body = serde_json::to_vec(record).map(Bytes::from);

        async move {
            let body = body.map_err(|err| {
                IngestionError::storage_failure(format!(
                    "failed to serialize document '{}': {}",
                    object_key, err
                ))
            })?;
            debug!(key = %object_key, bucket = %bucket, size = body.len(), "Upserting document to S3");

            match client
                .put_object()
                .bucket(&bucket)
                .key(&object_key)
                .content_type("application/json")
                .body(ByteStream::from(body))
                .send()
                .await
            {
                Ok(_) => {
                    debug!(key = %object_key, "Successfully upserted document to S3");
                    Ok(())
                }
                Err(err) => {
                    error!(key = %object_key, error = ?err, "Failed to upsert document to S3");
                    Err(IngestionError::StorageFailure(format!(
                        "S3 put_object failed for key '{}': {}",
                        object_key, err
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{retry::RetryConfig, BehaviorVersion, Credentials, Region};

    fn address() -> CollectionAddress {
        CollectionAddress::new("telemetry", "sensors", "measurements")
    }

    /// Client pointing at a port nothing listens on
    fn unreachable_client() -> Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "sensorlink-test"))
            .endpoint_url("http://127.0.0.1:1")
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn test_object_key_layout() {
        let key = DocumentKey::derive(&Measurement::new("dev:42", 21.5, 40, 3.3, 1_700_000_000));
        assert_eq!(
            address().object_key(&key),
            "sensors/measurements/dev42-1700000000.json"
        );
    }

    #[test]
    fn test_address_display() {
        assert_eq!(address().to_string(), "telemetry/sensors/measurements");
    }

    #[tokio::test]
    async fn test_upsert_failure_maps_to_storage_failure() {
        let store = S3DocumentStore::new(unreachable_client(), address());
        let record = Measurement::new("dev:1", 20.0, 40, 3.3, 1);
        let key = DocumentKey::derive(&record);

        let result = store.upsert(&key, &record).await;

        match result {
            Err(IngestionError::StorageFailure(msg)) => {
                assert!(msg.contains("sensors/measurements/dev1-1.json"));
            }
            other => panic!("expected StorageFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_bucket_is_connection_error() {
        let store = S3DocumentStore::new(unreachable_client(), address());

        let result = store.wait_until_ready(Duration::from_secs(5)).await;

        assert!(matches!(result, Err(IngestionError::ConnectionError(_))));
    }
}

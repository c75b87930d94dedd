use std::path::PathBuf;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::PullConsumer};
use sensorlink_domain::ingestion::IngestionError;
use tracing::{debug, info, warn};

use crate::source::NatsMessageSource;

/// Connection and binding settings for the message source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsSourceConfig {
    /// Server URL, e.g. `tls://connect.ngs.global`
    pub url: String,
    /// `.creds` file with the user JWT and nkey seed, if the server requires one
    pub credentials_file: Option<PathBuf>,
    /// JetStream stream holding the telemetry
    pub stream: String,
    /// Durable consumer on `stream`; it must already exist
    pub consumer: String,
    pub connection_timeout: Duration,
}

impl Default for NatsSourceConfig {
    fn default() -> Self {
        Self {
            url: "tls://connect.ngs.global".to_string(),
            credentials_file: None,
            stream: "sensors".to_string(),
            consumer: "consumer".to_string(),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// Live session with a NATS server and its JetStream context
pub struct NatsConnection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsConnection {
    /// Connect to the server described by `config`
    ///
    /// # Errors
    ///
    /// - `IngestionError::ConfigError` if the credentials file cannot be read
    /// - `IngestionError::ConnectionError` if the server cannot be reached
    pub async fn connect(config: &NatsSourceConfig) -> Result<Self, IngestionError> {
        info!(
            url = %config.url,
            timeout = ?config.connection_timeout,
            "Connecting to NATS"
        );

        let options = match &config.credentials_file {
            Some(path) => async_nats::ConnectOptions::with_credentials_file(path)
                .await
                .map_err(|err| {
                    IngestionError::config_error(format!(
                        "failed to load NATS credentials from '{}': {}",
                        path.display(),
                        err
                    ))
                })?,
            None => async_nats::ConnectOptions::new(),
        };

        let client = options
            .name("sensor-sink")
            .connection_timeout(config.connection_timeout)
            .connect(config.url.as_str())
            .await
            .map_err(|err| {
                IngestionError::connection_error(format!(
                    "failed to connect to NATS at '{}': {}",
                    config.url, err
                ))
            })?;

        let jetstream = jetstream::new(client.clone());

        info!("Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Bind to an existing durable consumer and start pulling its messages
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::ConnectionError` if the stream or consumer does not
    /// exist or the message stream cannot be opened
    pub async fn consume(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<NatsMessageSource, IngestionError> {
        debug!(stream = stream_name, consumer = consumer_name, "Binding to JetStream consumer");

        let stream = self.jetstream.get_stream(stream_name).await.map_err(|err| {
            IngestionError::connection_error(format!(
                "failed to get stream '{}': {}",
                stream_name, err
            ))
        })?;

        let consumer: PullConsumer = stream.get_consumer(consumer_name).await.map_err(|err| {
            IngestionError::connection_error(format!(
                "failed to get consumer '{}' on stream '{}': {}",
                consumer_name, stream_name, err
            ))
        })?;

        let messages = consumer.messages().await.map_err(|err| {
            IngestionError::connection_error(format!(
                "failed to open message stream for consumer '{}': {}",
                consumer_name, err
            ))
        })?;

        info!(
            stream = stream_name,
            consumer = consumer_name,
            "Consumer bound successfully"
        );
        Ok(NatsMessageSource::new(messages))
    }

    /// Flush outstanding acks and close the connection
    pub async fn close(self) {
        info!("Closing NATS connection");
        if let Err(err) = self.client.flush().await {
            warn!(error = %err, "Failed to flush NATS connection on close");
        }
    }
}

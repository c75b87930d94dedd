//! Sensor Sink - Telemetry Ingestion Service
//!
//! Pulls sensor measurements from a NATS JetStream durable consumer and upserts
//! each one into the document store under a key derived from its device id and
//! timestamp. A message is acknowledged only once its document is stored.

mod config;
mod shutdown;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use sensorlink_domain::{IngestionPipeline, RunSummary};
use sensorlink_nats::NatsConnection;
use sensorlink_s3::S3DocumentStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, SinkConfig, StoreCredentials};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing(LogFormat::from_env()?);

    info!("Starting sensor-sink");

    match run().await {
        Ok(summary) => {
            info!(
                acknowledged = summary.acknowledged,
                rejected = summary.rejected,
                unacknowledged = summary.unacknowledged,
                unrejected = summary.unrejected,
                "Sensor sink stopped"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = ?err, "Sensor sink failed");
            Err(err)
        }
    }
}

async fn run() -> Result<RunSummary> {
    let config = SinkConfig::from_env().context("invalid configuration")?;

    let credentials = StoreCredentials::load(&config.credentials_path)?;
    let s3_client = build_s3_client(&credentials).await;
    let store = S3DocumentStore::new(s3_client, credentials.collection_address());
    store
        .wait_until_ready(config.startup_timeout)
        .await
        .context("document store is not ready")?;

    let connection = NatsConnection::connect(&config.nats).await?;
    let mut source = connection
        .consume(&config.nats.stream, &config.nats.consumer)
        .await?;

    let pipeline = IngestionPipeline::new(store, config.pipeline);

    let shutdown = CancellationToken::new();
    shutdown::spawn_signal_listener(shutdown.clone());

    let result = pipeline.run(&mut source, shutdown).await;

    drop(source);
    connection.close().await;

    Ok(result?)
}

/// Build an S3 client for the store described by the credentials file
///
/// Static keys from the file take precedence over the ambient AWS credential
/// chain. Path-style addressing keeps S3-compatible endpoints working.
async fn build_s3_client(credentials: &StoreCredentials) -> aws_sdk_s3::Client {
    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(credentials.region().to_string()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true);

    if credentials.has_static_keys() {
        builder = builder.credentials_provider(Credentials::new(
            &credentials.username,
            &credentials.password,
            None,
            None,
            "sensorlink-credentials-file",
        ));
    }

    if let Some(url) = credentials.endpoint_url() {
        info!(endpoint = %url, "Using custom store endpoint");
        builder = builder.endpoint_url(url);
    }

    aws_sdk_s3::Client::from_conf(builder.build())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

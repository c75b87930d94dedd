//! Process configuration
//!
//! Settings come from `SENSORLINK_*` environment variables (a `.env` file is loaded
//! first). Store credentials live in a JSON file, by default `credentials.json` next
//! to the executable.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sensorlink_domain::ingestion::{IngestionError, MalformedPolicy, RetryPolicy};
use sensorlink_domain::PipelineConfig;
use sensorlink_nats::NatsSourceConfig;
use sensorlink_s3::CollectionAddress;
use serde::Deserialize;

pub const NATS_URL: &str = "SENSORLINK_NATS_URL";
pub const NATS_CREDS: &str = "SENSORLINK_NATS_CREDS";
pub const NATS_STREAM: &str = "SENSORLINK_NATS_STREAM";
pub const NATS_CONSUMER: &str = "SENSORLINK_NATS_CONSUMER";
pub const STORE_CREDENTIALS: &str = "SENSORLINK_STORE_CREDENTIALS";
pub const STARTUP_TIMEOUT_SECS: &str = "SENSORLINK_STARTUP_TIMEOUT_SECS";
pub const RETRY_MAX_ATTEMPTS: &str = "SENSORLINK_RETRY_MAX_ATTEMPTS";
pub const RETRY_INITIAL_BACKOFF_MS: &str = "SENSORLINK_RETRY_INITIAL_BACKOFF_MS";
pub const RETRY_MAX_BACKOFF_MS: &str = "SENSORLINK_RETRY_MAX_BACKOFF_MS";
pub const ON_MALFORMED: &str = "SENSORLINK_ON_MALFORMED";
pub const LOG_FORMAT: &str = "SENSORLINK_LOG_FORMAT";

const DEFAULT_NATS_CREDS_FILE: &str = "nats.creds";
const DEFAULT_STORE_CREDENTIALS_FILE: &str = "credentials.json";
const DEFAULT_REGION: &str = "us-east-1";

type Result<T> = std::result::Result<T, IngestionError>;

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        parse_or(&lookup, LOG_FORMAT, Self::default())
    }
}

impl FromStr for LogFormat {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(IngestionError::config_error(format!(
                "unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Contents of the store credentials file
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCredentials {
    /// Endpoint of the store; `https://` is assumed when no scheme is given
    pub connection_string: String,
    pub bucket_name: String,
    pub username: String,
    pub password: String,
    pub scope: String,
    pub collection: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl StoreCredentials {
    /// Read and validate the credentials file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            IngestionError::config_error(format!(
                "failed to read store credentials '{}': {}",
                path.display(),
                err
            ))
        })?;
        let credentials: Self = serde_json::from_str(&raw).map_err(|err| {
            IngestionError::config_error(format!(
                "invalid store credentials '{}': {}",
                path.display(),
                err
            ))
        })?;

        for (field, value) in [
            ("bucketName", &credentials.bucket_name),
            ("scope", &credentials.scope),
            ("collection", &credentials.collection),
        ] {
            if value.trim().is_empty() {
                return Err(IngestionError::config_error(format!(
                    "store credentials '{}': '{}' must not be empty",
                    path.display(),
                    field
                )));
            }
        }

        if credentials.username.is_empty() != credentials.password.is_empty() {
            return Err(IngestionError::config_error(format!(
                "store credentials '{}': 'username' and 'password' must be set together",
                path.display()
            )));
        }

        Ok(credentials)
    }

    /// Endpoint URL with a scheme, or `None` to use the SDK default endpoint
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.connection_string.trim();
        if endpoint.is_empty() {
            None
        } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Some(endpoint.to_string())
        } else {
            Some(format!("https://{endpoint}"))
        }
    }

    pub fn region(&self) -> &str {
        self.region
            .as_deref()
            .filter(|region| !region.is_empty())
            .unwrap_or(DEFAULT_REGION)
    }

    /// Whether the file carries a key pair, as opposed to deferring to the
    /// ambient AWS credential chain
    pub fn has_static_keys(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn collection_address(&self) -> CollectionAddress {
        CollectionAddress::new(&self.bucket_name, &self.scope, &self.collection)
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("connection_string", &self.connection_string)
            .field("bucket_name", &self.bucket_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scope", &self.scope)
            .field("collection", &self.collection)
            .field("region", &self.region)
            .finish()
    }
}

/// Everything the sink needs to start
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub nats: NatsSourceConfig,
    pub credentials_path: PathBuf,
    /// Bound for connecting to NATS and for the store readiness check
    pub startup_timeout: Duration,
    pub pipeline: PipelineConfig,
}

impl SinkConfig {
    /// Load from the process environment, resolving default files next to the
    /// running executable
    pub fn from_env() -> Result<Self> {
        let exe_dir = executable_dir()?;
        Self::from_lookup(|name| std::env::var(name).ok(), &exe_dir)
    }

    /// Load using `lookup` to resolve variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, exe_dir: &Path) -> Result<Self> {
        let startup_timeout = Duration::from_secs(parse_or(&lookup, STARTUP_TIMEOUT_SECS, 10)?);

        let credentials_file = match lookup(NATS_CREDS) {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(exe_dir.join(DEFAULT_NATS_CREDS_FILE)),
        };

        let defaults = NatsSourceConfig::default();
        let nats = NatsSourceConfig {
            url: lookup(NATS_URL).unwrap_or(defaults.url),
            credentials_file,
            stream: lookup(NATS_STREAM).unwrap_or(defaults.stream),
            consumer: lookup(NATS_CONSUMER).unwrap_or(defaults.consumer),
            connection_timeout: startup_timeout,
        };

        let credentials_path = lookup(STORE_CREDENTIALS)
            .map(PathBuf::from)
            .unwrap_or_else(|| exe_dir.join(DEFAULT_STORE_CREDENTIALS_FILE));

        let default_retry = RetryPolicy::default();
        let max_attempts: u32 = parse_or(&lookup, RETRY_MAX_ATTEMPTS, default_retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(IngestionError::config_error(format!(
                "{} must be at least 1",
                RETRY_MAX_ATTEMPTS
            )));
        }
        let retry = RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(parse_or(
                &lookup,
                RETRY_INITIAL_BACKOFF_MS,
                default_retry.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(parse_or(
                &lookup,
                RETRY_MAX_BACKOFF_MS,
                default_retry.max_backoff.as_millis() as u64,
            )?),
        };

        let on_malformed: MalformedPolicy = parse_or(&lookup, ON_MALFORMED, MalformedPolicy::default())?;

        Ok(Self {
            nats,
            credentials_path,
            startup_timeout,
            pipeline: PipelineConfig {
                retry,
                on_malformed,
            },
        })
    }
}

fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|err| {
        IngestionError::config_error(format!("cannot locate the running executable: {}", err))
    })?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        IngestionError::config_error(format!("executable '{}' has no parent directory", exe.display()))
    })
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err| {
            IngestionError::config_error(format!("invalid value '{}' for {}: {}", raw, name, err))
        }),
    }
}

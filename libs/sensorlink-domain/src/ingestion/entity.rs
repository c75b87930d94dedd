//! Domain entities for telemetry ingestion
//!
//! A Measurement is one telemetry sample reported by a sensor. It is created
//! per inbound message, never mutated, and written verbatim to the document store.

use serde::{Deserialize, Deserializer, Serialize};

/// A Measurement represents one immutable telemetry sample
///
/// The serialized form uses the wire field names (`id`, `temperature`, `humidity`,
/// `voltage`, `timestamp`), so the stored document is the record exactly as the
/// sensor sent it.
///
/// Decoding is lenient: missing fields and explicit `null`s take their zero value.
/// Unknown fields are ignored.
///
/// # Example
///
/// ```rust
/// use sensorlink_domain::ingestion::entity::Measurement;
///
/// let measurement = Measurement::new("dev:42", 21.5, 40, 3.3, 1_700_000_000);
/// assert_eq!(measurement.source_id(), "dev:42");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    /// Identifier of the originating sensor (may contain `:`)
    #[serde(rename = "id", deserialize_with = "null_as_default")]
    source_id: String,

    #[serde(deserialize_with = "null_as_default")]
    temperature: f64,

    #[serde(deserialize_with = "null_as_default")]
    humidity: i64,

    #[serde(deserialize_with = "null_as_default")]
    voltage: f64,

    /// Sender-assigned point in time, unit defined by the sender
    #[serde(deserialize_with = "null_as_default")]
    timestamp: i64,
}

impl Measurement {
    /// Create a Measurement with explicit values
    pub fn new(
        source_id: impl Into<String>,
        temperature: f64,
        humidity: i64,
        voltage: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            temperature,
            humidity,
            voltage,
            timestamp,
        }
    }

    /// Get the identifier of the originating sensor
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn humidity(&self) -> i64 {
        self.humidity
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Get the sender-assigned timestamp
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Treat an explicit JSON `null` like an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

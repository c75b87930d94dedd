use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ingestion::entity::Measurement;

/// Character stripped from source ids before they are used in a key
const SEPARATOR: char = ':';

/// Joins the cleaned source id and the timestamp
const DELIMITER: char = '-';

/// Identifier of a stored measurement document
///
/// DocumentKey is derived from `(source_id, timestamp)`, so the same sample always
/// lands on the same document and redelivery overwrites instead of duplicating.
///
/// Source ids that differ only by `:` map to the same key (`"sensor:17"` and
/// `"sensor17"` both give `"sensor17-<ts>"`). This is a known limitation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Derive the document key for a measurement
    pub fn derive(measurement: &Measurement) -> Self {
        let source: String = measurement
            .source_id()
            .chars()
            .filter(|c| *c != SEPARATOR)
            .collect();

        Self(format!("{}{}{}", source, DELIMITER, measurement.timestamp()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Derive the document key for a measurement
pub fn derive_key(measurement: &Measurement) -> DocumentKey {
    DocumentKey::derive(measurement)
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(source_id: &str, timestamp: i64) -> Measurement {
        Measurement::new(source_id, 20.0, 50, 3.3, timestamp)
    }

    #[test]
    fn test_key_strips_separator() {
        let key = derive_key(&measurement("dev:42", 1_700_000_000));
        assert_eq!(key.as_str(), "dev42-1700000000");
    }

    #[test]
    fn test_key_strips_every_separator() {
        let key = derive_key(&measurement("aa:bb:cc:dd", 7));
        assert_eq!(key.as_str(), "aabbccdd-7");
    }

    #[test]
    fn test_key_is_deterministic() {
        let m = measurement("sensor:3", 42);
        assert_eq!(derive_key(&m), derive_key(&m));
    }

    #[test]
    fn test_stripped_ids_collide() {
        let with_separator = derive_key(&measurement("sensor:17", 1000));
        let without_separator = derive_key(&measurement("sensor17", 1000));

        assert_eq!(with_separator, without_separator);
        assert_eq!(with_separator.as_str(), "sensor17-1000");
    }

    #[test]
    fn test_distinct_timestamps_give_distinct_keys() {
        let first = derive_key(&measurement("dev:1", 1000));
        let second = derive_key(&measurement("dev:1", 1001));
        assert_ne!(first, second);
    }

    #[test]
    fn test_negative_timestamp() {
        let key = derive_key(&measurement("dev", -5));
        assert_eq!(key.as_str(), "dev--5");
    }

    #[test]
    fn test_key_display() {
        let key = derive_key(&measurement("a:b", 9));
        assert_eq!(format!("{}", key), "ab-9");
        assert_eq!(String::from(key), "ab-9");
    }
}

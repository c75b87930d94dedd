//! Payload decoding
//!
//! Turns a raw message body into a [`Measurement`]. The schema check is lenient:
//! only a payload that is not a JSON object, or a field of the wrong type, is
//! rejected.
//!
//! Object members are matched to fields ignoring case. When a field appears more
//! than once, the last occurrence in the document wins.

use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{IngestionError, Measurement};

/// Wire names of the fields a measurement carries
const FIELDS: [&str; 5] = ["id", "temperature", "humidity", "voltage", "timestamp"];

/// Decode a raw JSON payload into a Measurement
///
/// # Errors
///
/// Returns `IngestionError::MalformedPayload` if the payload is not a JSON object
/// or a known field has the wrong type.
pub fn decode(payload: &[u8]) -> Result<Measurement, IngestionError> {
    let Members(members) = serde_json::from_slice(payload)
        .map_err(|err| IngestionError::malformed_payload(err.to_string()))?;

    let mut fields = Map::new();
    for (name, value) in members {
        if let Some(field) = match_field(&name) {
            fields.insert(field.to_string(), value);
        }
    }

    Measurement::deserialize(Value::Object(fields))
        .map_err(|err| IngestionError::malformed_payload(err.to_string()))
}

/// Field a member name refers to, compared case-insensitively
fn match_field(name: &str) -> Option<&'static str> {
    // U+017F (long s) folds to 's'; U+212A (Kelvin sign) lowercases to 'k'.
    let folded: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c == '\u{17f}' { 's' } else { c })
        .collect();
    FIELDS.iter().copied().find(|field| *field == folded)
}

/// Top-level members of a JSON object, in document order, duplicates included
struct Members(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = Members;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Members, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut members = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(member) = access.next_entry::<String, Value>()? {
                    members.push(member);
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

//! S3-compatible document store adapter for SensorLink
//!
//! Implements the domain's `DocumentStore` port on top of any S3-compatible object
//! store. Each measurement document is one JSON object; `PutObject` replaces an
//! existing object, which gives upsert semantics.

pub mod infrastructure;

pub use infrastructure::{CollectionAddress, S3DocumentStore};

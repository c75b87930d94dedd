//! Ports (trait definitions) for external dependencies
//!
//! This module defines the contracts (ports) that external adapters must implement.
//! Following hexagonal architecture, the domain defines what it needs, and the
//! infrastructure provides implementations.
//!
//! ## Static Dispatch
//!
//! We use native Rust async traits with `impl Future` return types instead of
//! `async_trait` to ensure zero-cost abstractions and static dispatch.

use std::future::Future;

use crate::ingestion::{entity::Measurement, error::IngestionError, ids::DocumentKey};

/// Port for document storage
///
/// This trait abstracts away the document store backend (S3, in-memory, etc.).
/// Implementations must handle:
/// - Writing the full measurement under the given key
/// - Overwriting any document already stored under that key
/// - Converting infrastructure errors to domain errors
///
/// The handle is shared for the whole process lifetime, hence `Send + Sync`.
pub trait DocumentStore: Send + Sync {
    /// Insert or overwrite the document stored under `key`
    ///
    /// Writing the same record under the same key twice must leave the store in
    /// the same state as writing it once.
    ///
    /// # Arguments
    ///
    /// * `key` - The derived document key
    /// * `record` - The measurement to store verbatim
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::StorageFailure` on connectivity loss, authorization
    /// failure or store-side rejection
    fn upsert(
        &self,
        key: &DocumentKey,
        record: &Measurement,
    ) -> impl Future<Output = Result<(), IngestionError>> + Send;
}

//! # SensorLink Domain Layer
//!
//! This crate contains the pure business logic and domain models for the SensorLink
//! telemetry ingestion pipeline. It follows hexagonal architecture principles:
//!
//! - **Entities**: Core domain models (Measurement, DocumentKey)
//! - **Ports**: Trait definitions for external dependencies (DocumentStore, MessageSource)
//! - **Services**: The consume, decode, persist, acknowledge loop
//!
//! ## Architecture
//!
//! This layer has NO dependencies on infrastructure concerns (S3, NATS, etc.).
//! All external dependencies are expressed as traits (ports) that are implemented
//! by adapter crates.
//!
//! ## Example
//!
//! ```rust
//! use sensorlink_domain::ingestion::{decode, DocumentKey};
//!
//! let payload = br#"{"id":"dev:42","temperature":21.5,"humidity":40,"voltage":3.3,"timestamp":1700000000}"#;
//! let measurement = decode(payload).unwrap();
//! assert_eq!(DocumentKey::derive(&measurement).as_str(), "dev42-1700000000");
//! ```

pub mod ingestion;
pub mod storage;

// Re-export commonly used types
pub use ingestion::{
    DocumentKey, IngestionError, IngestionPipeline, Measurement, MessageOutcome, PipelineConfig,
    RunSummary,
};
pub use storage::{DocumentStore, InMemoryDocumentStore};

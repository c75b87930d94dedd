//! Ingestion domain module
//!
//! This module contains the core business logic and entities for telemetry ingestion.
//! It defines what a Measurement is and how a message flows through the pipeline:
//! decode, derive key, persist, acknowledge.

pub mod decoder;
pub mod entity;
pub mod error;
pub mod ids;
pub mod ports;
pub mod retry;
pub mod service;

pub use decoder::decode;
pub use entity::Measurement;
pub use error::{IngestionError, Result};
pub use ids::{derive_key, DocumentKey};
pub use ports::{Delivery, MessageSource};
pub use retry::RetryPolicy;
pub use service::{
    IngestionPipeline, MalformedPolicy, MessageOutcome, PipelineConfig, RunSummary, Stage,
};

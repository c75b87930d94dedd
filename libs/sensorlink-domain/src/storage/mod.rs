//! Storage side of the pipeline: the document store port and an in-memory adapter

mod memory;
mod ports;

pub use memory::InMemoryDocumentStore;
pub use ports::DocumentStore;

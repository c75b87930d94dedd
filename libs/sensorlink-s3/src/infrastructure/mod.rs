//! Infrastructure adapters backed by AWS S3

mod s3_document_store;

pub use s3_document_store::{CollectionAddress, S3DocumentStore};

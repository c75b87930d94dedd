//! Port traits for the message source side of the pipeline
//!
//! The pipeline pulls deliveries from a durable, ack-capable source. A delivery is
//! only removed from the source's pending set once it is acknowledged; anything left
//! unacknowledged is redelivered by the source.
//!
//! Like the storage port, these traits use `impl Future` return types for static
//! dispatch.

use std::future::Future;

use crate::ingestion::error::IngestionError;

/// One message handed to the pipeline by a [`MessageSource`]
///
/// The delivery owns the handle needed to settle the message with the source.
pub trait Delivery: Send + Sync {
    /// Raw message body
    fn payload(&self) -> &[u8];

    /// Subject or topic the message was published on
    fn subject(&self) -> &str;

    /// How many times the source has delivered this message, when it tracks it
    fn delivery_attempt(&self) -> Option<u64> {
        None
    }

    /// Confirm the message was durably processed
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::AckFailure` if the source did not accept the ack
    fn ack(&self) -> impl Future<Output = Result<(), IngestionError>> + Send;

    /// Tell the source this message must never be redelivered
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::AckFailure` if the source did not accept the request
    fn reject(&self) -> impl Future<Output = Result<(), IngestionError>> + Send;
}

/// Port for a durable, pull-based message source
pub trait MessageSource: Send {
    type Delivery: Delivery;

    /// Wait for the next delivery
    ///
    /// Returns `None` once the source is closed and no more messages will arrive.
    /// A `Some(Err(_))` is a failed pull; the source stays usable.
    fn next_delivery(
        &mut self,
    ) -> impl Future<Output = Option<Result<Self::Delivery, IngestionError>>> + Send;
}

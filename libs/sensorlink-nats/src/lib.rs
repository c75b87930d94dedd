//! NATS JetStream message source adapter for SensorLink
//!
//! Binds the pipeline to an existing durable pull consumer. Messages are acked
//! explicitly and only by the pipeline; anything left unacknowledged is redelivered
//! by JetStream once the consumer's ack wait expires.

mod client;
mod source;

pub use client::{NatsConnection, NatsSourceConfig};
pub use source::{NatsDelivery, NatsMessageSource};

use std::future::Future;

use async_nats::jetstream::{self, consumer::pull, AckKind};
use futures::StreamExt;
use sensorlink_domain::ingestion::{Delivery, IngestionError, MessageSource};
use tracing::trace;

/// Pull-based message source backed by a JetStream durable consumer
pub struct NatsMessageSource {
    messages: pull::Stream,
}

impl NatsMessageSource {
    pub(crate) fn new(messages: pull::Stream) -> Self {
        Self { messages }
    }
}

impl MessageSource for NatsMessageSource {
    type Delivery = NatsDelivery;

    fn next_delivery(
        &mut self,
    ) -> impl Future<Output = Option<Result<NatsDelivery, IngestionError>>> + Send {
        async move {
            let next = self.messages.next().await?;
            Some(
                next.map(NatsDelivery::new)
                    .map_err(|err| IngestionError::source_failure(err.to_string())),
            )
        }
    }
}

/// A JetStream message together with its ack handle
pub struct NatsDelivery {
    message: jetstream::Message,
}

impl NatsDelivery {
    fn new(message: jetstream::Message) -> Self {
        trace!(subject = %message.subject, "Message pulled");
        Self { message }
    }
}

impl Delivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        self.message.payload.as_ref()
    }

    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn delivery_attempt(&self) -> Option<u64> {
        self.message
            .info()
            .ok()
            .map(|info| info.delivered.max(0) as u64)
    }

    fn ack(&self) -> impl Future<Output = Result<(), IngestionError>> + Send {
        async move {
            self.message
                .ack()
                .await
                .map_err(|err| IngestionError::ack_failure(err.to_string()))
        }
    }

    fn reject(&self) -> impl Future<Output = Result<(), IngestionError>> + Send {
        async move {
            self.message
                .ack_with(AckKind::Term)
                .await
                .map_err(|err| IngestionError::ack_failure(err.to_string()))
        }
    }
}

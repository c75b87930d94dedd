//! Ingestion pipeline - Business logic orchestration
//!
//! This module contains the consume, decode, persist, acknowledge loop. The
//! pipeline coordinates between the message source port, the decoder, the key
//! derivation and the document store port.
//!
//! Each message moves through [`Stage`]s in a fixed order and is only acknowledged
//! once the document store has confirmed the write.

use std::fmt;
use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{decode, Delivery, DocumentKey, IngestionError, MessageSource, RetryPolicy};
use crate::storage::DocumentStore;

/// What to do with a message whose payload cannot be decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Stop the pipeline with `MalformedPayload`, leaving the message pending
    #[default]
    Halt,
    /// Reject the message so the source never redelivers it, then carry on
    Reject,
}

impl FromStr for MalformedPolicy {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "reject" => Ok(Self::Reject),
            other => Err(IngestionError::config_error(format!(
                "unknown malformed payload policy '{}', expected 'halt' or 'reject'",
                other
            ))),
        }
    }
}

/// Configuration for the ingestion pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Retry policy for upserts, acks and source pulls
    pub retry: RetryPolicy,
    /// Handling of undecodable payloads
    pub on_malformed: MalformedPolicy,
}

/// Processing stage of a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Keyed,
    Persisted,
    Acknowledged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::Keyed => "keyed",
            Self::Persisted => "persisted",
            Self::Acknowledged => "acknowledged",
        };
        f.write_str(name)
    }
}

/// How a message left the pipeline when no error stopped it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Persisted under the key and acknowledged
    Acknowledged(DocumentKey),
    /// Malformed payload rejected under [`MalformedPolicy::Reject`]
    Rejected,
    /// Malformed payload whose rejection the source never accepted
    ///
    /// The source will redeliver it, and it will be rejected again.
    Unrejected,
    /// Persisted under the key, but every ack attempt failed
    ///
    /// The source will redeliver the message and the upsert will overwrite the
    /// same document.
    Unacknowledged(DocumentKey),
}

/// Counters for one call to [`IngestionPipeline::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub acknowledged: u64,
    pub rejected: u64,
    pub unacknowledged: u64,
    pub unrejected: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Acknowledged(_) => self.acknowledged += 1,
            MessageOutcome::Rejected => self.rejected += 1,
            MessageOutcome::Unacknowledged(_) => self.unacknowledged += 1,
            MessageOutcome::Unrejected => self.unrejected += 1,
        }
    }

    /// Total number of messages that went through the pipeline
    pub fn processed(&self) -> u64 {
        self.acknowledged + self.rejected + self.unacknowledged + self.unrejected
    }
}

/// Pipeline that moves telemetry from a message source into a document store
///
/// This service encapsulates the ingestion contract:
/// - Decodes each payload into a Measurement
/// - Derives a deterministic document key
/// - Upserts the record via the document store port
/// - Acknowledges the message only after the upsert succeeded
///
/// Messages are handled one at a time, in delivery order.
///
/// ## Static Dispatch
///
/// The pipeline is generic over any `DocumentStore` implementation. The store is
/// injected at construction and only read afterwards.
///
pub struct IngestionPipeline<S> {
    store: S,
    config: PipelineConfig,
}

impl<S> IngestionPipeline<S>
where
    S: DocumentStore,
{
    /// Create a new IngestionPipeline with the given store and configuration
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Create a new IngestionPipeline with default configuration
    pub fn with_store(store: S) -> Self {
        Self::new(store, PipelineConfig::default())
    }

    /// Process a single delivery through every stage
    ///
    /// Transient failures are retried according to the configured policy.
    ///
    /// # Errors
    ///
    /// - `IngestionError::MalformedPayload` if the payload cannot be decoded and the
    ///   policy is [`MalformedPolicy::Halt`]
    /// - `IngestionError::StorageFailure` if the upsert still fails after retries;
    ///   the message is not acknowledged
    pub async fn handle<D: Delivery>(&self, delivery: &D) -> Result<MessageOutcome, IngestionError> {
        self.process(delivery, &CancellationToken::new()).await
    }

    /// Consume `source` until it closes, `shutdown` fires, or a message fails
    ///
    /// Cancellation is observed between messages: the message in flight when
    /// `shutdown` fires is finished before returning. If shutdown cuts its retries
    /// short, the run still stops cleanly and the message stays with the source.
    ///
    /// # Errors
    ///
    /// Returns the error of the first message that could not be handled, or a
    /// `SourceFailure` once pulls have failed `max_attempts` times in a row.
    pub async fn run<M: MessageSource>(
        &self,
        source: &mut M,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, IngestionError> {
        info!("Starting consumption");

        let mut summary = RunSummary::default();
        let mut source_failures: u32 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Received shutdown signal, stopping consumption");
                    break;
                }
                next = source.next_delivery() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => {
                    source_failures = 0;
                    delivery
                }
                Some(Err(err)) => {
                    source_failures += 1;
                    if !err.is_transient() || source_failures >= self.config.retry.max_attempts {
                        error!(
                            error = %err,
                            consecutive_failures = source_failures,
                            "Message source failed, stopping consumption"
                        );
                        return Err(err);
                    }

                    let delay = self.config.retry.backoff_for(source_failures);
                    warn!(
                        error = %err,
                        consecutive_failures = source_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Failed to pull message, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                None => {
                    info!("Message source closed");
                    break;
                }
            };

            match self.process(&delivery, &shutdown).await {
                Ok(outcome) => summary.record(&outcome),
                Err(err) if err.is_transient() && shutdown.is_cancelled() => {
                    warn!(
                        subject = delivery.subject(),
                        error = %err,
                        "Shutdown interrupted retries, leaving message for redelivery"
                    );
                    break;
                }
                Err(err) => {
                    error!(
                        subject = delivery.subject(),
                        error = %err,
                        "Failed to handle message, stopping consumption"
                    );
                    return Err(err);
                }
            }
        }

        info!(
            acknowledged = summary.acknowledged,
            rejected = summary.rejected,
            unacknowledged = summary.unacknowledged,
            unrejected = summary.unrejected,
            "Consumption stopped"
        );
        Ok(summary)
    }

    async fn process<D: Delivery>(
        &self,
        delivery: &D,
        shutdown: &CancellationToken,
    ) -> Result<MessageOutcome, IngestionError> {
        debug!(
            subject = delivery.subject(),
            delivery_attempt = ?delivery.delivery_attempt(),
            payload_size = delivery.payload().len(),
            stage = %Stage::Received,
            "Processing message"
        );

        let measurement = match decode(delivery.payload()) {
            Ok(measurement) => measurement,
            Err(err) => return self.on_malformed(delivery, err, shutdown).await,
        };
        debug!(source_id = measurement.source_id(), stage = %Stage::Decoded, "Payload decoded");

        let key = DocumentKey::derive(&measurement);
        debug!(key = %key, stage = %Stage::Keyed, "Document key derived");

        let store = &self.store;
        let (key_ref, record) = (&key, &measurement);
        self.config
            .retry
            .run("upsert", shutdown, move || store.upsert(key_ref, record))
            .await?;
        info!(key = %key, stage = %Stage::Persisted, "Inserted");

        match self
            .config
            .retry
            .run("ack", shutdown, move || delivery.ack())
            .await
        {
            Ok(()) => {
                debug!(key = %key, stage = %Stage::Acknowledged, "Message acknowledged");
                Ok(MessageOutcome::Acknowledged(key))
            }
            Err(err) => {
                error!(
                    key = %key,
                    error = %err,
                    "Document persisted but acknowledgment failed, leaving message for redelivery"
                );
                Ok(MessageOutcome::Unacknowledged(key))
            }
        }
    }

    async fn on_malformed<D: Delivery>(
        &self,
        delivery: &D,
        err: IngestionError,
        shutdown: &CancellationToken,
    ) -> Result<MessageOutcome, IngestionError> {
        match self.config.on_malformed {
            MalformedPolicy::Halt => Err(err),
            MalformedPolicy::Reject => {
                warn!(
                    subject = delivery.subject(),
                    error = %err,
                    "Rejecting message with malformed payload"
                );
                match self
                    .config
                    .retry
                    .run("reject", shutdown, move || delivery.reject())
                    .await
                {
                    Ok(()) => Ok(MessageOutcome::Rejected),
                    Err(reject_err) => {
                        error!(
                            subject = delivery.subject(),
                            error = %reject_err,
                            "Failed to reject malformed message, leaving it for redelivery"
                        );
                        Ok(MessageOutcome::Unrejected)
                    }
                }
            }
        }
    }

    /// Get the pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the injected document store
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::Measurement;
    use crate::storage::InMemoryDocumentStore;
    use std::future::Future;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const SAMPLE: &str =
        r#"{"id":"dev:42","temperature":21.5,"humidity":40,"voltage":3.3,"timestamp":1700000000}"#;

    type EventLog = Arc<Mutex<Vec<&'static str>>>;

    struct TestDelivery {
        payload: Vec<u8>,
        events: EventLog,
        failing_acks: AtomicU32,
        failing_rejects: AtomicU32,
    }

    impl TestDelivery {
        fn new(payload: &str, events: &EventLog) -> Self {
            Self {
                payload: payload.as_bytes().to_vec(),
                events: events.clone(),
                failing_acks: AtomicU32::new(0),
                failing_rejects: AtomicU32::new(0),
            }
        }

        fn count(&self, event: &str) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| **e == event)
                .count()
        }
    }

    impl Delivery for TestDelivery {
        fn payload(&self) -> &[u8] {
            &self.payload
        }

        fn subject(&self) -> &str {
            "sensors.test"
        }

        fn ack(&self) -> impl Future<Output = Result<(), IngestionError>> + Send {
            let fail = self
                .failing_acks
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let events = self.events.clone();

            async move {
                if fail {
                    events.lock().unwrap().push("ack_failed");
                    Err(IngestionError::ack_failure("no responders"))
                } else {
                    events.lock().unwrap().push("ack");
                    Ok(())
                }
            }
        }

        fn reject(&self) -> impl Future<Output = Result<(), IngestionError>> + Send {
            let fail = self
                .failing_rejects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let events = self.events.clone();

            async move {
                if fail {
                    events.lock().unwrap().push("reject_failed");
                    Err(IngestionError::ack_failure("no responders"))
                } else {
                    events.lock().unwrap().push("reject");
                    Ok(())
                }
            }
        }
    }

    /// Store that fails a number of times before delegating to memory
    struct RecordingStore {
        inner: InMemoryDocumentStore,
        events: EventLog,
        failures_left: AtomicU32,
    }

    impl RecordingStore {
        fn new(events: &EventLog, failures: u32) -> Self {
            Self {
                inner: InMemoryDocumentStore::new(),
                events: events.clone(),
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    impl DocumentStore for RecordingStore {
        fn upsert(
            &self,
            key: &DocumentKey,
            record: &Measurement,
        ) -> impl Future<Output = Result<(), IngestionError>> + Send {
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let events = self.events.clone();
            let write = self.inner.upsert(key, record);

            async move {
                if fail {
                    events.lock().unwrap().push("upsert_failed");
                    return Err(IngestionError::storage_failure("cluster unreachable"));
                }
                write.await?;
                events.lock().unwrap().push("upsert");
                Ok(())
            }
        }
    }

    fn config(max_attempts: u32, on_malformed: MalformedPolicy) -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            on_malformed,
        }
    }

    #[tokio::test]
    async fn test_handle_persists_then_acks() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(1, MalformedPolicy::Halt),
        );
        let delivery = TestDelivery::new(SAMPLE, &events);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        let key = match outcome {
            MessageOutcome::Acknowledged(key) => key,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(key.as_str(), "dev42-1700000000");
        assert_eq!(*events.lock().unwrap(), vec!["upsert", "ack"]);

        let stored = pipeline.store().inner.get(&key).unwrap();
        assert_eq!(stored.source_id(), "dev:42");
        assert_eq!(stored.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_storage_failure_is_never_acked() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, u32::MAX),
            config(3, MalformedPolicy::Halt),
        );
        let delivery = TestDelivery::new(SAMPLE, &events);

        let result = pipeline.handle(&delivery).await;

        assert!(matches!(result, Err(IngestionError::StorageFailure(_))));
        assert_eq!(delivery.count("upsert_failed"), 3);
        assert_eq!(delivery.count("ack"), 0);
        assert!(pipeline.store().inner.is_empty());
    }

    #[tokio::test]
    async fn test_transient_storage_failure_is_retried() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 2),
            config(3, MalformedPolicy::Halt),
        );
        let delivery = TestDelivery::new(SAMPLE, &events);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        assert!(matches!(outcome, MessageOutcome::Acknowledged(_)));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["upsert_failed", "upsert_failed", "upsert", "ack"]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_halts_without_side_effects() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(3, MalformedPolicy::Halt),
        );
        let delivery = TestDelivery::new("{not json", &events);

        let result = pipeline.handle(&delivery).await;

        assert!(matches!(result, Err(IngestionError::MalformedPayload(_))));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_rejected_under_reject_policy() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(3, MalformedPolicy::Reject),
        );
        let delivery = TestDelivery::new("[]", &events);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        assert_eq!(outcome, MessageOutcome::Rejected);
        assert_eq!(*events.lock().unwrap(), vec!["reject"]);
    }

    #[tokio::test]
    async fn test_reject_failure_is_retried() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(3, MalformedPolicy::Reject),
        );
        let delivery = TestDelivery::new("[]", &events);
        delivery.failing_rejects.store(1, Ordering::SeqCst);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        assert_eq!(outcome, MessageOutcome::Rejected);
        assert_eq!(*events.lock().unwrap(), vec!["reject_failed", "reject"]);
    }

    #[tokio::test]
    async fn test_exhausted_reject_is_not_counted_as_rejected() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(2, MalformedPolicy::Reject),
        );
        let delivery = TestDelivery::new("{not json", &events);
        delivery.failing_rejects.store(u32::MAX, Ordering::SeqCst);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        assert_eq!(outcome, MessageOutcome::Unrejected);
        assert_eq!(delivery.count("reject_failed"), 2);
        assert_eq!(delivery.count("reject"), 0);
        assert!(pipeline.store().inner.is_empty());
    }

    #[tokio::test]
    async fn test_ack_failure_is_retried() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(3, MalformedPolicy::Halt),
        );
        let delivery = TestDelivery::new(SAMPLE, &events);
        delivery.failing_acks.store(1, Ordering::SeqCst);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        assert!(matches!(outcome, MessageOutcome::Acknowledged(_)));
        assert_eq!(*events.lock().unwrap(), vec!["upsert", "ack_failed", "ack"]);
    }

    #[tokio::test]
    async fn test_exhausted_ack_leaves_message_unacknowledged() {
        let events = EventLog::default();
        let pipeline = IngestionPipeline::new(
            RecordingStore::new(&events, 0),
            config(2, MalformedPolicy::Halt),
        );
        let delivery = TestDelivery::new(SAMPLE, &events);
        delivery.failing_acks.store(u32::MAX, Ordering::SeqCst);

        let outcome = pipeline.handle(&delivery).await.unwrap();

        match outcome {
            MessageOutcome::Unacknowledged(key) => {
                assert!(pipeline.store().inner.get(&key).is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(delivery.count("ack_failed"), 2);
        assert_eq!(delivery.count("ack"), 0);
    }

    #[test]
    fn test_malformed_policy_from_str() {
        assert_eq!("halt".parse::<MalformedPolicy>().unwrap(), MalformedPolicy::Halt);
        assert_eq!(" Reject ".parse::<MalformedPolicy>().unwrap(), MalformedPolicy::Reject);
        assert!(matches!(
            "skip".parse::<MalformedPolicy>(),
            Err(IngestionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_run_summary_counts() {
        let mut summary = RunSummary::default();
        let key = DocumentKey::derive(&Measurement::new("a", 0.0, 0, 0.0, 1));

        summary.record(&MessageOutcome::Acknowledged(key.clone()));
        summary.record(&MessageOutcome::Acknowledged(key.clone()));
        summary.record(&MessageOutcome::Rejected);
        summary.record(&MessageOutcome::Unacknowledged(key));
        summary.record(&MessageOutcome::Unrejected);

        assert_eq!(summary.acknowledged, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.unacknowledged, 1);
        assert_eq!(summary.unrejected, 1);
        assert_eq!(summary.processed(), 5);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Received.to_string(), "received");
        assert_eq!(Stage::Acknowledged.to_string(), "acknowledged");
    }
}

//! In-memory document store
//!
//! Keeps documents in a map behind a mutex. Clones share the same map, so a test
//! can hand one clone to the pipeline and inspect the other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::DocumentStore;
use crate::ingestion::{DocumentKey, IngestionError, Measurement};

#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<Mutex<HashMap<DocumentKey, Measurement>>>,
    upserts: Arc<AtomicUsize>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the document stored under `key`
    pub fn get(&self, key: &DocumentKey) -> Option<Measurement> {
        self.lock().get(key).cloned()
    }

    /// Number of distinct documents
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful upsert calls, overwrites included
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentKey, Measurement>> {
        // A poisoned map is still consistent: every write is a single insert.
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn upsert(
        &self,
        key: &DocumentKey,
        record: &Measurement,
    ) -> impl Future<Output = Result<(), IngestionError>> + Send {
        let store = self.clone();
        let key = key.clone();
        let record = record.clone();

        async move {
            store.lock().insert(key, record);
            store.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

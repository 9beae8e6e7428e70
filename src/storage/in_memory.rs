use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{StoreError, StoreResult, UnlinkedDataStore, UnlinkedMetadata, UnlinkedSnapshot};
use crate::types::Batch;

#[derive(Default)]
struct Inner {
    metadata: HashMap<String, UnlinkedMetadata>,
    data: HashMap<String, Batch>,
    registered: Vec<String>,
    flushed: HashMap<String, UnlinkedMetadata>,
    register_calls: usize,
    flush_calls: usize,
}

/// In-memory store for development/testing.
///
/// Keeps counters of registrations and flushes so callers can check how the
/// store was driven.
#[derive(Clone, Default)]
pub struct InMemoryUnlinkedStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryUnlinkedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful `register` calls
    pub fn register_calls(&self) -> usize {
        self.lock().register_calls
    }

    pub fn flush_calls(&self) -> usize {
        self.lock().flush_calls
    }

    /// Metadata as of the last flush
    pub fn flushed_metadata(&self, slot: &str) -> Option<UnlinkedMetadata> {
        self.lock().flushed.get(slot).cloned()
    }
}

impl UnlinkedDataStore for InMemoryUnlinkedStore {
    fn contains(&self, slot: &str) -> bool {
        self.lock().registered.iter().any(|s| s == slot)
    }

    fn register(&self, slot: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        if inner.registered.iter().any(|s| s == slot) {
            return Err(StoreError::AlreadyRegistered(slot.to_string()));
        }
        inner.registered.push(slot.to_string());
        inner.register_calls += 1;
        debug!("Registered unlinked slot: {}", slot);
        Ok(())
    }

    fn set_metadata(&self, slot: &str, metadata: UnlinkedMetadata) -> StoreResult<()> {
        let mut inner = self.lock();
        if !inner.registered.iter().any(|s| s == slot) {
            return Err(StoreError::NotRegistered(slot.to_string()));
        }
        inner.metadata.insert(slot.to_string(), metadata);
        Ok(())
    }

    fn metadata(&self, slot: &str) -> Option<UnlinkedMetadata> {
        self.lock().metadata.get(slot).cloned()
    }

    fn flush(&self) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.flushed = inner.metadata.clone();
        inner.flush_calls += 1;
        Ok(())
    }

    fn write(&self, slot: &str, data: &Batch) -> StoreResult<()> {
        let mut inner = self.lock();
        if !inner.registered.iter().any(|s| s == slot) {
            return Err(StoreError::NotRegistered(slot.to_string()));
        }
        inner.data.insert(slot.to_string(), data.clone());
        debug!("Wrote {} datasets to unlinked slot {}", data.len(), slot);
        Ok(())
    }

    fn load(&self, slot: &str) -> StoreResult<Option<UnlinkedSnapshot>> {
        let inner = self.lock();
        let snapshot = match (inner.metadata.get(slot), inner.data.get(slot)) {
            (Some(metadata), Some(data)) => Some(UnlinkedSnapshot {
                metadata: metadata.clone(),
                data: data.clone(),
            }),
            _ => None,
        };
        Ok(snapshot)
    }

    fn list(&self) -> Vec<String> {
        let mut slots = self.lock().registered.clone();
        slots.sort();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_is_reported() {
        let store = InMemoryUnlinkedStore::new();
        store.register("a").unwrap();
        assert!(matches!(
            store.register("a"),
            Err(StoreError::AlreadyRegistered(_))
        ));
        assert_eq!(store.register_calls(), 1);
    }

    #[test]
    fn test_metadata_is_not_durable_until_flush() {
        let store = InMemoryUnlinkedStore::new();
        store.register("a").unwrap();
        store
            .set_metadata("a", UnlinkedMetadata::now(vec!["x".to_string()]))
            .unwrap();
        assert!(store.flushed_metadata("a").is_none());
        store.flush().unwrap();
        assert_eq!(store.flushed_metadata("a").unwrap().strategies, vec!["x"]);
    }

    #[test]
    fn test_write_requires_registration() {
        let store = InMemoryUnlinkedStore::new();
        assert!(matches!(
            store.write("missing", &Vec::new()),
            Err(StoreError::NotRegistered(_))
        ));
    }
}

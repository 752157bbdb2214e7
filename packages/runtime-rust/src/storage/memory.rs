//! In-memory [`StoreBackend`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking, plus
//! connect/close counters so lifecycle tests can observe exactly how many
//! times the underlying resource was opened and torn down.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use super::{Pool, StoreBackend};

/// Error returned by every operation after the store has been closed.
#[derive(Debug, thiserror::Error)]
#[error("memory store is closed")]
pub struct StoreClosed;

/// Separator between collection name and key in the flat map.
/// Collection names are static identifiers and never contain it.
const KEY_SEPARATOR: char = '\u{1f}';

fn record_key(collection: &str, key: &str) -> String {
    format!("{collection}{KEY_SEPARATOR}{key}")
}

/// In-memory store backed by [`DashMap`] for concurrent access.
///
/// `insert_unique` uses the map's entry API, so check-and-insert is atomic
/// under concurrent callers: exactly one of two same-key racers wins.
pub struct MemoryStore {
    entries: DashMap<String, Value>,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

impl MemoryStore {
    /// Creates a new, empty, open store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Returns `true` once [`StoreBackend::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of times [`StoreBackend::close`] has been invoked.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }

    /// Total number of stored values across all collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn guard_open(&self) -> anyhow::Result<()> {
        if self.is_closed() {
            return Err(StoreClosed.into());
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<Value>> {
        self.guard_open()?;
        Ok(self
            .entries
            .get(&record_key(collection, key))
            .map(|entry| entry.value().clone()))
    }

    async fn load_all(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>> {
        self.guard_open()?;
        let prefix = record_key(collection, "");
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| (entry.key()[prefix.len()..].to_string(), entry.value().clone()))
            .collect())
    }

    async fn insert_unique(
        &self,
        collection: &str,
        key: &str,
        value: Value,
    ) -> anyhow::Result<bool> {
        self.guard_open()?;
        match self.entries.entry(record_key(collection, key)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    async fn store(&self, collection: &str, key: &str, value: Value) -> anyhow::Result<()> {
        self.guard_open()?;
        self.entries.insert(record_key(collection, key), value);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<()> {
        self.guard_open()?;
        self.entries.remove(&record_key(collection, key));
        Ok(())
    }

    fn close(&self) -> anyhow::Result<()> {
        self.close_count.fetch_add(1, Ordering::AcqRel);
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Pool over a single shared [`MemoryStore`].
///
/// Every `connect` hands out the same store, modeling a connection pool
/// that multiplexes many logical operations over one backing resource.
pub struct MemoryPool {
    store: Arc<MemoryStore>,
    connect_count: AtomicUsize,
}

impl MemoryPool {
    /// Creates a pool over a fresh empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            connect_count: AtomicUsize::new(0),
        }
    }

    /// Shared handle to the backing store, for test inspection.
    #[must_use]
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Number of times `connect` has been called.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::Acquire)
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pool for MemoryPool {
    async fn connect(&self) -> anyhow::Result<Arc<dyn StoreBackend>> {
        self.connect_count.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::clone(&self.store) as Arc<dyn StoreBackend>)
    }
}

/// Pool whose endpoint can never be reached. Every `connect` fails, which
/// surfaces as `ResourceUnavailable` at the resource layer.
pub struct UnreachablePool;

#[async_trait]
impl Pool for UnreachablePool {
    async fn connect(&self) -> anyhow::Result<Arc<dyn StoreBackend>> {
        anyhow::bail!("storage endpoint unreachable")
    }
}

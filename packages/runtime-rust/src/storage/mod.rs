//! Storage capability surface consumed by the resource layer.
//!
//! The runtime does not specify a wire protocol to the backing store; it
//! only needs a narrow keyed-record surface ("execute against a collection,
//! return values or fail") plus a way to open and close the expensive
//! connection. Backend errors travel as `anyhow::Error` and are wrapped
//! into `Fault::ResourceUnavailable` before they reach a program; raw
//! backend types never cross the Lattice surface.

pub mod memory;

pub use memory::{MemoryPool, MemoryStore, UnreachablePool};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Pluggable persistence backend reached through a pooled connection.
/// Implementations: in-memory (tests, development), `PostgreSQL` (future).
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Load a single value by collection and key.
    async fn load(&self, collection: &str, key: &str) -> anyhow::Result<Option<Value>>;

    /// Load every `(key, value)` pair in the given collection.
    async fn load_all(&self, collection: &str) -> anyhow::Result<Vec<(String, Value)>>;

    /// Insert only if the key is absent. Returns `true` when the value was
    /// inserted, `false` when the key already existed. The check-and-insert
    /// is atomic with respect to concurrent callers.
    async fn insert_unique(&self, collection: &str, key: &str, value: Value)
        -> anyhow::Result<bool>;

    /// Store a single value, overwriting any existing one.
    async fn store(&self, collection: &str, key: &str, value: Value) -> anyhow::Result<()>;

    /// Delete a single value by collection and key.
    async fn delete(&self, collection: &str, key: &str) -> anyhow::Result<()>;

    /// Release resources and close the connection. Synchronous so the
    /// resource layer can call it from a `Drop` path.
    fn close(&self) -> anyhow::Result<()>;
}

/// Connection pool handing out [`StoreBackend`] connections.
///
/// `connect` is the expensive acquisition step; it may fail (endpoint
/// unreachable) and the caller reports that as `ResourceUnavailable`.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Open a pooled connection to the backing store.
    async fn connect(&self) -> anyhow::Result<Arc<dyn StoreBackend>>;
}

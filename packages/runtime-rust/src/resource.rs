//! Scoped lifecycle for the shared storage connection.
//!
//! One [`ResourceHandle`] exists per runtime scope. It opens the pooled
//! connection lazily on first [`acquire`](ResourceHandle::acquire), hands
//! the same connection to every caller inside the scope, and guarantees the
//! underlying close runs exactly once no matter how many times, or on
//! which exit path, [`release`](ResourceHandle::release) is invoked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lattice_core::Fault;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::storage::{Pool, StoreBackend};

/// Owned, lazily acquired, exactly-once-released connection to the backing
/// store.
///
/// - `acquire` is idempotent within the scope: the first successful call
///   connects; every later call returns the same connection. A failed
///   connect leaves the slot empty, so a later acquire may retry.
/// - `release` is idempotent: only the first call closes the connection.
///   `Drop` releases as a last resort, so the close runs on every exit
///   path from the owning scope.
pub struct ResourceHandle {
    pool: Arc<dyn Pool>,
    connection: OnceCell<Arc<dyn StoreBackend>>,
    released: AtomicBool,
    closed: AtomicBool,
}

impl ResourceHandle {
    /// Creates an unacquired handle over the given pool.
    #[must_use]
    pub fn new(pool: Arc<dyn Pool>) -> Self {
        Self {
            pool,
            connection: OnceCell::new(),
            released: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the scope's shared connection, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ResourceUnavailable`] when the pool cannot be
    /// reached or the handle has already been released.
    pub async fn acquire(&self) -> Result<Arc<dyn StoreBackend>, Fault> {
        if self.is_released() {
            return Err(Fault::resource_unavailable("resource handle released"));
        }

        let connection = self
            .connection
            .get_or_try_init(|| async {
                debug!("opening pooled storage connection");
                let connection = self.pool.connect().await?;
                metrics::counter!("lattice_resource_acquired_total").increment(1);
                anyhow::Ok(connection)
            })
            .await
            .map_err(|error| Fault::resource_unavailable(&error))?;

        // A release may have landed while the connect was in flight. It saw
        // an empty cell and closed nothing, so the close falls to us.
        if self.is_released() {
            self.close_connection();
            return Err(Fault::resource_unavailable("resource handle released"));
        }

        Ok(Arc::clone(connection))
    }

    /// Closes the underlying connection. Safe to call any number of times;
    /// only the first call has effect.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.close_connection();
    }

    fn close_connection(&self) {
        let Some(connection) = self.connection.get() else {
            return;
        };
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match connection.close() {
            Ok(()) => debug!("pooled storage connection closed"),
            Err(error) => warn!(%error, "closing pooled storage connection failed"),
        }
        metrics::counter!("lattice_resource_released_total").increment(1);
    }

    /// Returns `true` once [`release`](Self::release) has been called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Returns `true` while the connection is open and usable.
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        self.connection.initialized() && !self.is_released()
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

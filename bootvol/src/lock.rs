//! Per-pool mutual exclusion.
//!
//! Every mutating operation against a storage pool runs while holding that
//! pool's lock. Locks are created on first use and kept for the lifetime of
//! the registry; pool names are few, so the map never shrinks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bootvol_shared::errors::{BootvolError, BootvolResult};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of pool locks, shared by every provisioner that targets the
/// same host.
#[derive(Default)]
pub struct PoolLockRegistry {
    locks: Mutex<HashMap<String, Arc<PoolLock>>>,
}

impl PoolLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `pool`, creating it on first use.
    ///
    /// Always returns the same instance for the same name.
    pub fn lock_for(&self, pool: &str) -> Arc<PoolLock> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(pool) {
            return Arc::clone(lock);
        }

        tracing::trace!(pool = %pool, "Creating pool lock");
        let lock = Arc::new(PoolLock {
            pool: pool.to_string(),
            inner: Arc::new(AsyncMutex::new(())),
        });
        locks.insert(pool.to_string(), Arc::clone(&lock));
        lock
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PoolLockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLockRegistry")
            .field("pools", &self.len())
            .finish()
    }
}

/// Exclusive lock over one pool name.
pub struct PoolLock {
    pool: String,
    inner: Arc<AsyncMutex<()>>,
}

impl PoolLock {
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Wait until the lock is free and take it.
    pub async fn acquire(&self) -> PoolLockGuard {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        tracing::trace!(pool = %self.pool, "Acquired pool lock");
        PoolLockGuard {
            pool: self.pool.clone(),
            _guard: guard,
        }
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> BootvolResult<PoolLockGuard> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| BootvolError::LockTimeout {
                pool: self.pool.clone(),
                waited_ms: timeout.as_millis() as u64,
            })
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(&self) -> Option<PoolLockGuard> {
        let guard = Arc::clone(&self.inner).try_lock_owned().ok()?;
        Some(PoolLockGuard {
            pool: self.pool.clone(),
            _guard: guard,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Held lock; released on drop.
pub struct PoolLockGuard {
    pool: String,
    _guard: OwnedMutexGuard<()>,
}

impl PoolLockGuard {
    pub fn pool(&self) -> &str {
        &self.pool
    }
}

impl Drop for PoolLockGuard {
    fn drop(&mut self) {
        tracing::trace!(pool = %self.pool, "Released pool lock");
    }
}

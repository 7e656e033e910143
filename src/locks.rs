//! Per-parent locking
//!
//! The backend drops or rejects concurrent writes to one edge gateway's
//! service configuration, so every mutating dispatcher on an edge gateway
//! child holds that gateway's mutex for the whole operation. The table is
//! owned by the session, not a process global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for one parent; releasing happens on drop, so every exit path
/// (error, cancellation, panic unwinding) unlocks.
pub struct ParentLockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ParentLockGuard {
    fn drop(&mut self) {
        tracing::debug!("released lock {}", self.key);
    }
}

/// Map of parent key -> mutex, itself protected by a meta-mutex.
#[derive(Default)]
pub struct ParentLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ParentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        // A poisoned meta-mutex only means another task panicked while
        // inserting; the map itself is still consistent.
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(table.entry(key.to_string()).or_default())
    }

    /// Wait for and take the lock for `key`.
    pub async fn lock(&self, key: &str) -> ParentLockGuard {
        let mutex = self.entry(key);
        tracing::debug!("waiting for lock {}", key);
        let guard = mutex.lock_owned().await;
        tracing::debug!("acquired lock {}", key);
        ParentLockGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Number of parents ever locked in this session.
    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock key for an edge gateway.
pub fn edge_gateway_key(edge_gateway_id: &str) -> String {
    format!("edge:{}", edge_gateway_id)
}

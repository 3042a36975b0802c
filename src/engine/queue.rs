use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// What happens when two mutations target the same entity while both are
/// in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameEntityPolicy {
    /// Remote calls run concurrently and each settles independently; whichever
    /// write lands last in memory wins, even a rollback to a stale value.
    #[default]
    LastWriteWins,
    /// Remote calls for one key run one at a time, in the order their futures
    /// are first polled. A settling mutation that has been overtaken by a later
    /// optimistic write leaves the entity alone and hands its rollback target
    /// to that later mutation.
    Serialize,
}

/// Per-key FIFO gate for remote calls.
pub(crate) struct KeyedQueue {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedQueue {
    pub(crate) fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.ensure_lock(key);
        lock.lock_owned().await
    }

    /// Drop the lock for `key` once nobody holds or waits on it.
    pub(crate) fn release(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }

    pub(crate) fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn ensure_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::CacheBackend;
use crate::error::CacheError;

/// In-memory cache backend backed by a HashMap.
///
/// Clone-friendly (cloning shares the same underlying storage). An optional
/// byte quota makes writes fail the way a full browser store would.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    storage: Arc<RwLock<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total stored bytes (keys + values).
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            quota: Some(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for InMemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| CacheError::Storage("lock poisoned".into()))?;
        Ok(storage.get(key).cloned())
    }

    fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| CacheError::Storage("lock poisoned".into()))?;

        if let Some(quota) = self.quota {
            let used: usize = storage
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(CacheError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }

        storage.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| CacheError::Storage("lock poisoned".into()))?;
        Ok(storage.remove(key).is_some())
    }
}

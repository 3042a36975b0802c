use crate::error::CacheError;

/// Raw string key-value persistence underneath [`super::DurableCache`].
///
/// Values are opaque encoded strings; backends know nothing about entity shape.
pub trait CacheBackend: Send + Sync {
    /// Read the value stored under `key`. Returns None if absent.
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store (or overwrite) the value under `key`.
    fn write(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Delete the value under `key`. Returns true if one existed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

impl<B: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<B> {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        (**self).write(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key)
    }
}

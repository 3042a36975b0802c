//! Durable cache - a best-effort, crash-resilient mirror of each collection.
//!
//! The cache is never the source of truth while the process is alive; it only
//! lets a restart pick up the last optimistic state. Reads fall back and writes
//! are logged-and-dropped on failure, so nothing here can fail a mutation.
//!
//! ## Example
//!
//! ```ignore
//! use wardrobe_sync::{DurableCache, InMemoryCache};
//!
//! let cache = DurableCache::new(InMemoryCache::new());
//! cache.save("wardrobe:u1:garments", &garments);
//! let restored: Vec<Garment> = cache.load("wardrobe:u1:garments", Vec::new());
//! ```

mod backend;
mod codec;
#[cfg(feature = "file-cache")]
mod file;
mod in_memory;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheError;

pub use backend::CacheBackend;
pub use codec::CacheCodec;
#[cfg(feature = "file-cache")]
pub use file::FileCache;
pub use in_memory::InMemoryCache;

/// Typed, best-effort front end over a [`CacheBackend`].
#[derive(Debug, Clone)]
pub struct DurableCache<B> {
    backend: B,
    codec: CacheCodec,
}

impl<B: CacheBackend> DurableCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_codec(backend, CacheCodec::default())
    }

    pub fn with_codec(backend: B, codec: CacheCodec) -> Self {
        Self { backend, codec }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn codec(&self) -> CacheCodec {
        self.codec
    }

    /// Serialize and persist. Failures are logged, never returned.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(err) = self.try_save(key, value) {
            tracing::warn!(key, error = %err, "cache write failed; continuing with in-memory state");
        }
    }

    /// Deserialize the stored value, or return `fallback` on any error
    /// (missing key, unreadable storage, corrupt data).
    pub fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_load(key) {
            Ok(Some(value)) => value,
            Ok(None) => fallback,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed; using fallback");
                fallback
            }
        }
    }

    /// Remove the entry. Failures are logged, never returned.
    pub fn clear(&self, key: &str) {
        if let Err(err) = self.backend.delete(key) {
            tracing::warn!(key, error = %err, "cache clear failed");
        }
    }

    pub fn try_save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let encoded = self.codec.encode(value)?;
        self.backend.write(key, encoded)
    }

    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.backend.read(key)? {
            Some(raw) => Ok(Some(self.codec.decode(&raw)?)),
            None => Ok(None),
        }
    }
}

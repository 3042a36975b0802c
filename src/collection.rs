//! One synchronized collection: state, engine, remote store and cache key wired
//! together behind the mutation API the presentation layer calls.

use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheBackend, DurableCache};
use crate::engine::{MutationEngine, MutationOutcome};
use crate::error::RemoteError;
use crate::record::{Identified, Record};
use crate::remote::RemoteStore;
use crate::state::{CollectionState, SubscriptionId};

pub type CollectionEngine<T, B> = MutationEngine<T, CollectionState<T>, B>;

pub struct SyncedCollection<T, R, B> {
    engine: CollectionEngine<T, B>,
    remote: Arc<R>,
}

impl<T, R, B> Clone for SyncedCollection<T, R, B> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            remote: Arc::clone(&self.remote),
        }
    }
}

impl<T, R, B> SyncedCollection<T, R, B>
where
    T: Record,
    R: RemoteStore<T>,
    B: CacheBackend + 'static,
{
    pub fn new(remote: R, engine: CollectionEngine<T, B>) -> Self {
        Self {
            engine,
            remote: Arc::new(remote),
        }
    }

    /// A collection with a fresh empty state and default engine settings.
    pub fn with_defaults(remote: R, cache: DurableCache<B>, cache_key: impl Into<String>) -> Self {
        let engine = MutationEngine::builder(CollectionState::default(), cache, cache_key).build();
        Self::new(remote, engine)
    }

    pub fn engine(&self) -> &CollectionEngine<T, B> {
        &self.engine
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn state(&self) -> &CollectionState<T> {
        self.engine.state()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.engine.snapshot()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&[T]) + Send + Sync + 'static,
    {
        self.state().subscribe(listener)
    }

    /// Load the cached snapshot into memory. Returns the number of entities.
    pub fn hydrate(&self) -> usize {
        let cached: Vec<T> = self.engine.cache().load(self.engine.cache_key(), Vec::new());
        let count = cached.len();
        self.engine.restore_snapshot(cached);
        tracing::debug!(collection = T::COLLECTION, count, "hydrated from cache");
        count
    }

    /// Replace the snapshot with the server's list, then replay every
    /// mutation still in flight on top of it: creates stay at the head,
    /// pending removes stay gone and pending edits stay applied. On failure
    /// the current snapshot is kept and a warning is shown.
    pub async fn refresh(&self) -> Result<usize, RemoteError> {
        match self.remote.list().await {
            Ok(server) => {
                let count = self.engine.rebase(server).len();
                tracing::info!(collection = T::COLLECTION, count, "refreshed from remote");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(collection = T::COLLECTION, error = %err, "refresh failed; keeping local snapshot");
                self.engine
                    .notifier()
                    .warning(format!("could not refresh {}", T::COLLECTION));
                Err(err)
            }
        }
    }

    pub fn update(&self, entity: T) -> impl Future<Output = MutationOutcome<T>> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        self.engine.update(entity, move |patch| async move {
            let id = patch.key().to_string();
            remote.update(id, patch).await
        })
    }

    pub fn remove(&self, id: impl Into<String>) -> impl Future<Output = MutationOutcome<T>> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        self.engine
            .remove(id, move |id| async move { remote.remove(id).await })
    }

    pub fn upsert_keyed(&self, entity: T) -> impl Future<Output = MutationOutcome<T>> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        self.engine
            .upsert_keyed(entity, move |record| async move { remote.upsert(record).await })
    }
}

impl<T, R, B> SyncedCollection<T, R, B>
where
    T: Identified,
    R: RemoteStore<T>,
    B: CacheBackend + 'static,
{
    pub fn create(&self, entity: T) -> impl Future<Output = MutationOutcome<T>> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        self.engine
            .create(entity, move |input| async move { remote.create(input).await })
    }
}

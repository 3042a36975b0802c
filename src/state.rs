//! In-memory collection state.
//!
//! The engine never closes over ambient state; it is handed a
//! [`SnapshotAccess`] (a get/set accessor pair) for the collection it mutates.
//! [`CollectionState`] is the stock implementation: a shared, subscribable
//! `Vec<T>`. [`FnAccess`] adapts any pair of closures.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Get/set access to one collection snapshot.
pub trait SnapshotAccess<T>: Send + Sync {
    fn snapshot(&self) -> Vec<T>;

    fn replace(&self, next: Vec<T>);

    /// Read-modify-write. Returns the snapshot that was stored.
    fn modify<F>(&self, f: F) -> Vec<T>
    where
        F: FnOnce(&[T]) -> Vec<T>,
        T: Clone,
    {
        let next = f(&self.snapshot());
        self.replace(next.clone());
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Box<dyn Fn(&[T]) + Send + Sync>;

struct StateInner<T> {
    data: RwLock<Vec<T>>,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
    next_id: AtomicU64,
}

/// Shared, subscribable snapshot of one collection.
///
/// Clone-friendly (cloning shares the same underlying storage and listeners).
/// Listeners run after every write, outside the data lock, with the new snapshot.
pub struct CollectionState<T> {
    inner: Arc<StateInner<T>>,
}

impl<T> Clone for CollectionState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> CollectionState<T> {
    pub fn new(initial: Vec<T>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                data: RwLock::new(initial),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&[T]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Box::new(listener)));
        id
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, snapshot: &[T]) {
        let listeners = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, listener) in listeners.iter() {
            listener(snapshot);
        }
    }
}

impl<T: Clone + Send + Sync> SnapshotAccess<T> for CollectionState<T> {
    fn snapshot(&self) -> Vec<T> {
        self.inner
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, next: Vec<T>) {
        {
            let mut data = self
                .inner
                .data
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *data = next.clone();
        }
        self.publish(&next);
    }

    fn modify<F>(&self, f: F) -> Vec<T>
    where
        F: FnOnce(&[T]) -> Vec<T>,
        T: Clone,
    {
        let next = {
            let mut data = self
                .inner
                .data
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let next = f(&data);
            *data = next.clone();
            next
        };
        self.publish(&next);
        next
    }
}

/// Adapts a `(get, set)` closure pair to [`SnapshotAccess`].
pub struct FnAccess<T, G, S> {
    get: G,
    set: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, G, S> FnAccess<T, G, S>
where
    G: Fn() -> Vec<T> + Send + Sync,
    S: Fn(Vec<T>) + Send + Sync,
{
    pub fn new(get: G, set: S) -> Self {
        Self {
            get,
            set,
            _marker: PhantomData,
        }
    }
}

impl<T, G, S> SnapshotAccess<T> for FnAccess<T, G, S>
where
    G: Fn() -> Vec<T> + Send + Sync,
    S: Fn(Vec<T>) + Send + Sync,
{
    fn snapshot(&self) -> Vec<T> {
        (self.get)()
    }

    fn replace(&self, next: Vec<T>) {
        (self.set)(next)
    }
}

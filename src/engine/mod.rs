//! Optimistic mutation engine.
//!
//! Each operation runs in two halves. The optimistic half runs before the
//! method returns: the in-memory snapshot is rewritten, mirrored to the
//! durable cache, and a [`PendingMutation`] is registered. The remote half is
//! the returned future: it issues exactly one remote call and then reconciles
//! (success) or reverts (failure) the entity it targeted, writes the cache
//! again, and emits one notification.
//!
//! Rollbacks are targeted at the entity the mutation touched, never a
//! whole-snapshot restore, so mutations on other entities that settled in the
//! meantime survive.
//!
//! An update or remove aimed at a placeholder id applies locally at once, but
//! its remote call waits for the create that owns the placeholder. Once the
//! create confirms, the call is sent against the server's id. If the create
//! fails, the mutation settles as [`Settled::LocalOnly`].
//!
//! ## Example
//!
//! ```ignore
//! let engine = MutationEngine::builder(state.clone(), DurableCache::new(cache), "wardrobe:u1:garments")
//!     .labels(MutationLabels::new("garment"))
//!     .build();
//!
//! let remote = store.clone();
//! let pending = engine.create(jacket, move |input| async move { remote.create(input).await });
//! assert_eq!(state.len(), 1); // already visible, under a placeholder id
//! let outcome = pending.await;
//! ```

mod link;
mod outcome;
mod pending;
mod queue;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::cache::{CacheBackend, DurableCache};
use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::identity::IdentityResolver;
use crate::notify::Notifier;
use crate::reconcile;
use crate::record::{Identified, Record};
use crate::state::SnapshotAccess;

pub use outcome::{MutationLabels, MutationOutcome, Settled};
pub use pending::{MutationId, MutationKind, PendingMutation};
pub use queue::SameEntityPolicy;

use link::{AssignId, CreateTicket, Link, PlaceholderLinks};
use pending::{PendingRegistry, Position};
use queue::KeyedQueue;

struct EngineInner<T, S, B> {
    state: S,
    cache: DurableCache<B>,
    cache_key: String,
    resolver: IdentityResolver,
    notifier: Notifier,
    labels: MutationLabels,
    policy: SameEntityPolicy,
    pending: PendingRegistry<T>,
    queue: KeyedQueue,
    links: PlaceholderLinks<T>,
    /// Held across each snapshot write and its cache write.
    commits: Mutex<()>,
}

/// How a mutation's remote call finds its target.
enum Target<T> {
    Direct,
    /// Aimed at a placeholder whose create is still in flight.
    AfterCreate(Link<T>),
    /// Aimed at a placeholder that no in-flight create owns.
    Unsent,
}

/// The server id for a mutation that was aimed at a placeholder.
struct Rekey<T> {
    key: String,
    assign: AssignId<T>,
}

impl<T> Rekey<T> {
    fn apply(&self, entity: &mut T) {
        (self.assign)(entity, self.key.clone());
    }
}

/// Optimistic mutation engine for one collection.
///
/// Clone-friendly (clones share state, cache, pending mutations and queue).
/// State listeners run while the engine holds its commit lock and must not
/// start mutations on the same engine synchronously.
pub struct MutationEngine<T, S, B> {
    inner: Arc<EngineInner<T, S, B>>,
}

impl<T, S, B> Clone for MutationEngine<T, S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub struct EngineBuilder<T, S, B> {
    state: S,
    cache: DurableCache<B>,
    cache_key: String,
    resolver: IdentityResolver,
    notifier: Notifier,
    labels: MutationLabels,
    policy: SameEntityPolicy,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, B> EngineBuilder<T, S, B>
where
    T: Record,
    S: SnapshotAccess<T> + 'static,
    B: CacheBackend + 'static,
{
    pub fn resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Share a notifier (typically one per app) instead of a private one.
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn labels(mut self, labels: MutationLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn policy(mut self, policy: SameEntityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply the placeholder prefix and same-entity policy from `config`.
    pub fn config(self, config: &SyncConfig) -> Self {
        self.resolver(IdentityResolver::new(config.placeholder_prefix.clone()))
            .policy(config.same_entity_policy)
    }

    pub fn build(self) -> MutationEngine<T, S, B> {
        MutationEngine {
            inner: Arc::new(EngineInner {
                state: self.state,
                cache: self.cache,
                cache_key: self.cache_key,
                resolver: self.resolver,
                notifier: self.notifier,
                labels: self.labels,
                policy: self.policy,
                pending: PendingRegistry::new(),
                queue: KeyedQueue::new(),
                links: PlaceholderLinks::new(),
                commits: Mutex::new(()),
            }),
        }
    }
}

impl<T, S, B> MutationEngine<T, S, B>
where
    T: Record,
    S: SnapshotAccess<T> + 'static,
    B: CacheBackend + 'static,
{
    pub fn builder(
        state: S,
        cache: DurableCache<B>,
        cache_key: impl Into<String>,
    ) -> EngineBuilder<T, S, B> {
        EngineBuilder {
            state,
            cache,
            cache_key: cache_key.into(),
            resolver: IdentityResolver::default(),
            notifier: Notifier::new(),
            labels: MutationLabels::default(),
            policy: SameEntityPolicy::default(),
            _marker: PhantomData,
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.inner.state.snapshot()
    }

    pub fn state(&self) -> &S {
        &self.inner.state
    }

    pub fn cache(&self) -> &DurableCache<B> {
        &self.inner.cache
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.inner.resolver
    }

    pub fn policy(&self) -> SameEntityPolicy {
        self.inner.policy
    }

    /// In-flight mutations, oldest first.
    pub fn pending(&self) -> Vec<PendingMutation<T>> {
        self.inner.pending.all()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether any in-flight mutation targets `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.is_pending(key)
    }

    /// Replace the whole snapshot (hydration, refresh) and mirror it to the cache.
    pub fn replace_all(&self, snapshot: Vec<T>) {
        self.inner.commit(|_| snapshot);
    }

    /// Replace the snapshot with `server` and replay every in-flight mutation
    /// on top of it, oldest first. Returns the snapshot that was stored.
    pub fn rebase(&self, server: Vec<T>) -> Vec<T> {
        let inner = &self.inner;
        let held = inner.lock_commits();
        let pending = inner.pending.all();
        inner.write(&held, |current| replay(current, server, &pending))
    }

    /// Replace the snapshot in memory only, e.g. when it was just read from the cache.
    pub fn restore_snapshot(&self, snapshot: Vec<T>) {
        self.inner.state.replace(snapshot);
    }

    /// Apply `entity` in place by key, then send it with `remote`.
    ///
    /// On failure the entity's previous value is put back (if it is still
    /// present); the rest of the collection is left as it is.
    pub fn update<F, Fut>(
        &self,
        entity: T,
        remote: F,
    ) -> impl Future<Output = MutationOutcome<T>> + Send + 'static
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let key = entity.key().to_string();
        let written = entity.clone();
        let (id, target) = self.inner.apply(MutationKind::Update, &key, None, |s| {
            (reconcile::replace_by_id(s, written.clone()), Some(written))
        });
        self.inner.clone().run_remote(
            id,
            MutationKind::Update,
            key,
            None,
            target,
            None,
            move |rekey| async move {
                let mut entity = entity;
                if let Some(rekey) = rekey {
                    rekey.apply(&mut entity);
                }
                remote(entity).await.map(Some)
            },
        )
    }

    /// Replace-or-append by natural key, then send it with `remote`.
    ///
    /// On failure the previous entry for that key is put back, or the
    /// appended entry is dropped if there was none.
    pub fn upsert_keyed<F, Fut>(
        &self,
        entity: T,
        remote: F,
    ) -> impl Future<Output = MutationOutcome<T>> + Send + 'static
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let key = entity.key().to_string();
        let written = entity.clone();
        let (id, target) = self.inner.apply(MutationKind::Upsert, &key, None, |s| {
            (reconcile::replace_by_key(s, written.clone()), Some(written))
        });
        self.inner.clone().run_remote(
            id,
            MutationKind::Upsert,
            key,
            None,
            target,
            None,
            move |rekey| async move {
                let mut entity = entity;
                if let Some(rekey) = rekey {
                    rekey.apply(&mut entity);
                }
                remote(entity).await.map(Some)
            },
        )
    }

    /// Drop the entity with `key`, then ask `remote` to delete it.
    ///
    /// On failure the entity is re-inserted after the entity that preceded it
    /// (or at its original index if that one is gone too).
    pub fn remove<F, Fut>(
        &self,
        key: impl Into<String>,
        remote: F,
    ) -> impl Future<Output = MutationOutcome<T>> + Send + 'static
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RemoteError>> + Send + 'static,
    {
        let key = key.into();
        let (id, target) = self.inner.apply(MutationKind::Remove, &key, None, |s| {
            (reconcile::remove_by_id(s, &key), None)
        });
        let sent = key.clone();
        self.inner.clone().run_remote(
            id,
            MutationKind::Remove,
            key,
            None,
            target,
            None,
            move |rekey| {
                let sent = rekey.map_or(sent, |rekey| rekey.key);
                async move { remote(sent).await.map(|()| None) }
            },
        )
    }
}

impl<T, S, B> MutationEngine<T, S, B>
where
    T: Identified,
    S: SnapshotAccess<T> + 'static,
    B: CacheBackend + 'static,
{
    /// Show `entity` at the head of the collection under a fresh placeholder
    /// id, then send it with `remote`.
    ///
    /// On success the placeholder is swapped for the server's entity in place
    /// (a no-op if the user removed it meanwhile). On failure only the
    /// placeholder entity is dropped.
    pub fn create<F, Fut>(
        &self,
        entity: T,
        remote: F,
    ) -> impl Future<Output = MutationOutcome<T>> + Send + 'static
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let placeholder = self.inner.resolver.allocate_placeholder();
        let mut optimistic = entity.clone();
        optimistic.assign_id(placeholder.clone());
        let ticket = self
            .inner
            .links
            .open(&placeholder, <T as Identified>::assign_id);
        let (id, target) = self.inner.apply(
            MutationKind::Create,
            &placeholder,
            Some(placeholder.clone()),
            |s| (reconcile::insert_first(s, optimistic.clone()), Some(optimistic)),
        );
        self.inner.clone().run_remote(
            id,
            MutationKind::Create,
            placeholder.clone(),
            Some(placeholder),
            target,
            Some(ticket),
            move |_| async move { remote(entity).await.map(Some) },
        )
    }
}

impl<T, S, B> EngineInner<T, S, B>
where
    T: Record,
    S: SnapshotAccess<T> + 'static,
    B: CacheBackend + 'static,
{
    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-modify-write the snapshot and mirror the result to the cache.
    fn commit<F>(&self, f: F) -> Vec<T>
    where
        F: FnOnce(&[T]) -> Vec<T>,
    {
        let held = self.lock_commits();
        self.write(&held, f)
    }

    /// Same as [`Self::commit`] for a caller already holding the commit lock.
    fn write<F>(&self, _held: &MutexGuard<'_, ()>, f: F) -> Vec<T>
    where
        F: FnOnce(&[T]) -> Vec<T>,
    {
        let next = self.state.modify(f);
        self.cache.save(&self.cache_key, &next);
        next
    }

    /// The optimistic half: rewrite the snapshot, persist it, and register the
    /// pending mutation with what it needs to roll back.
    fn apply<F>(
        &self,
        kind: MutationKind,
        key: &str,
        placeholder_id: Option<String>,
        transform: F,
    ) -> (MutationId, Target<T>)
    where
        F: FnOnce(&[T]) -> (Vec<T>, Option<T>),
    {
        let held = self.lock_commits();
        let target = if kind != MutationKind::Create && self.resolver.is_placeholder(key) {
            self.links
                .follow(key)
                .map_or(Target::Unsent, Target::AfterCreate)
        } else {
            Target::Direct
        };

        let mut previous_snapshot = Vec::new();
        let mut written = None;
        self.write(&held, |current| {
            previous_snapshot = current.to_vec();
            let (next, value) = transform(current);
            written = value;
            next
        });

        let index = reconcile::position(&previous_snapshot, key);
        let restore = index.map(|i| previous_snapshot[i].clone());
        let restore_position = index.map(|i| Position {
            index: i,
            after: i
                .checked_sub(1)
                .map(|before| previous_snapshot[before].key().to_string()),
        });
        let id = self.pending.register(|id| PendingMutation {
            id,
            kind,
            key: key.to_string(),
            placeholder_id,
            previous_snapshot,
            written,
            restore,
            restore_position,
        });
        drop(held);
        tracing::debug!(
            collection = T::COLLECTION,
            mutation = %id,
            %kind,
            key,
            "optimistic write applied"
        );
        (id, target)
    }

    /// The remote half. Waits for the owning create when aimed at a
    /// placeholder, then holds the per-key gate (if serializing) from before
    /// the call until the corrective write is done.
    #[allow(clippy::too_many_arguments)]
    fn run_remote<C, Fut>(
        self: Arc<Self>,
        id: MutationId,
        kind: MutationKind,
        key: String,
        placeholder_id: Option<String>,
        target: Target<T>,
        ticket: Option<CreateTicket<T>>,
        call: C,
    ) -> impl Future<Output = MutationOutcome<T>> + Send + 'static
    where
        C: FnOnce(Option<Rekey<T>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, RemoteError>> + Send + 'static,
    {
        async move {
            let (key, rekey) = match target {
                Target::Direct => (key, None),
                Target::Unsent => return self.settle_local(id, kind, key, true),
                Target::AfterCreate(link) => {
                    let assign = link.assign;
                    match link.resolved().await {
                        Some(server_key) => (
                            server_key.clone(),
                            Some(Rekey {
                                key: server_key,
                                assign,
                            }),
                        ),
                        None => return self.settle_local(id, kind, key, false),
                    }
                }
            };

            let serialize =
                self.policy == SameEntityPolicy::Serialize && kind != MutationKind::Create;
            let gate = if serialize {
                Some(self.queue.acquire(&key).await)
            } else {
                None
            };

            let result = call(rekey).await;
            let outcome = match result {
                Ok(confirmed) => {
                    self.settle_success(id, kind, key.clone(), placeholder_id, ticket, confirmed)
                }
                Err(error) => {
                    self.settle_failure(id, kind, key.clone(), placeholder_id, ticket, error)
                }
            };

            if let Some(gate) = gate {
                drop(gate);
                self.queue.release(&key);
            }
            outcome
        }
    }

    /// Whether the entity at `key` still holds what `pending` wrote.
    fn still_owns(&self, pending: &PendingMutation<T>) -> bool {
        let current = self.state.snapshot();
        same_value(reconcile::find(&current, &pending.key), pending.written.as_ref())
    }

    fn settle_success(
        &self,
        id: MutationId,
        kind: MutationKind,
        key: String,
        placeholder_id: Option<String>,
        ticket: Option<CreateTicket<T>>,
        confirmed: Option<T>,
    ) -> MutationOutcome<T> {
        let pending = self.pending.take(id);
        let status = match (kind, confirmed) {
            (MutationKind::Create, Some(server)) => {
                if let (Some(placeholder), Some(ticket)) = (placeholder_id.as_deref(), ticket) {
                    self.swap_placeholder(placeholder, &server, ticket);
                }
                Settled::Confirmed(server)
            }
            (MutationKind::Update | MutationKind::Upsert, Some(server)) => {
                let overtaken = self.policy == SameEntityPolicy::Serialize
                    && pending.as_ref().is_some_and(|p| !self.still_owns(p));
                if overtaken {
                    self.pending.hand_down(id, &key, Some(server.clone()), None);
                } else {
                    let entity = server.clone();
                    self.commit(|s| reconcile::replace_by_id(s, entity));
                }
                Settled::Confirmed(server)
            }
            (MutationKind::Remove, _) => {
                if self.policy == SameEntityPolicy::Serialize {
                    if let Some(p) = pending.as_ref().filter(|p| !self.still_owns(p)) {
                        self.pending
                            .hand_down(id, &key, None, p.restore_position.clone());
                    }
                }
                Settled::Removed(key.clone())
            }
            (_, None) => Settled::LocalOnly,
        };

        tracing::info!(
            collection = T::COLLECTION,
            mutation = %id,
            %kind,
            key = %key,
            "mutation confirmed"
        );
        self.notify_success(kind);
        MutationOutcome {
            mutation: id,
            kind,
            key,
            status,
        }
    }

    fn settle_failure(
        &self,
        id: MutationId,
        kind: MutationKind,
        key: String,
        placeholder_id: Option<String>,
        ticket: Option<CreateTicket<T>>,
        error: RemoteError,
    ) -> MutationOutcome<T> {
        tracing::warn!(
            collection = T::COLLECTION,
            mutation = %id,
            %kind,
            key = %key,
            error = %error,
            "remote call failed; rolling back"
        );

        let pending = self.pending.take(id);
        if let Some(pending) = pending {
            let overtaken = kind != MutationKind::Create
                && self.policy == SameEntityPolicy::Serialize
                && !self.still_owns(&pending);
            if overtaken {
                self.pending.hand_down(
                    id,
                    &key,
                    pending.restore.clone(),
                    pending.restore_position.clone(),
                );
            } else {
                self.roll_back(kind, &key, placeholder_id.as_deref(), pending);
            }
        }
        if let Some(ticket) = ticket {
            ticket.abandon();
        }

        self.notifier.error(self.labels.failure(kind));
        MutationOutcome {
            mutation: id,
            kind,
            key,
            status: Settled::RolledBack(error),
        }
    }

    /// Swap the placeholder for the server's entity in place and point any
    /// follow-up mutations at the server id. An edit made to the placeholder
    /// while the create was in flight stays on screen under the new id.
    fn swap_placeholder(&self, placeholder: &str, server: &T, ticket: CreateTicket<T>) {
        let server_key = server.key().to_string();
        let assign = ticket.assign();
        let held = self.lock_commits();
        let edited = self.pending.retarget(placeholder, &server_key, assign);
        self.write(&held, |s| {
            let shown = match reconcile::find(s, placeholder) {
                Some(current) if edited => {
                    let mut current = current.clone();
                    assign(&mut current, server_key.clone());
                    current
                }
                _ => server.clone(),
            };
            self.resolver.reconcile(s, placeholder, shown)
        });
        ticket.confirm(server_key);
    }

    fn roll_back(
        &self,
        kind: MutationKind,
        key: &str,
        placeholder_id: Option<&str>,
        pending: PendingMutation<T>,
    ) {
        match kind {
            MutationKind::Create => {
                let placeholder = placeholder_id.unwrap_or(key);
                self.commit(|s| reconcile::remove_by_id(s, placeholder));
            }
            MutationKind::Update => {
                if let Some(previous) = pending.restore {
                    self.commit(|s| reconcile::replace_by_id(s, previous));
                }
            }
            MutationKind::Upsert => match pending.restore {
                Some(previous) => {
                    self.commit(|s| reconcile::replace_by_id(s, previous));
                }
                None => {
                    self.commit(|s| reconcile::remove_by_id(s, key));
                }
            },
            MutationKind::Remove => {
                if let Some(previous) = pending.restore {
                    let position = pending.restore_position.unwrap_or(Position {
                        index: 0,
                        after: None,
                    });
                    let anchor = position.after.as_deref();
                    self.commit(|s| reconcile::insert_after(s, anchor, position.index, previous));
                }
            }
        }
    }

    /// Settle a mutation aimed at a placeholder the server never confirmed.
    /// `announce` is false when its create just failed and has already
    /// reported the error.
    fn settle_local(
        &self,
        id: MutationId,
        kind: MutationKind,
        key: String,
        announce: bool,
    ) -> MutationOutcome<T> {
        self.pending.take(id);
        tracing::info!(
            collection = T::COLLECTION,
            mutation = %id,
            %kind,
            key = %key,
            "placeholder was never confirmed; settled without a remote call"
        );
        if announce {
            self.notify_success(kind);
        }
        MutationOutcome {
            mutation: id,
            kind,
            key,
            status: Settled::LocalOnly,
        }
    }

    fn notify_success(&self, kind: MutationKind) {
        self.notifier.success(self.labels.success(kind));
    }
}

/// `server` with every in-flight mutation re-applied, oldest first. Creates
/// bring back what is currently shown under their placeholder.
fn replay<T: Record>(current: &[T], server: Vec<T>, pending: &[PendingMutation<T>]) -> Vec<T> {
    let mut next = server;
    for mutation in pending {
        next = match (mutation.kind, mutation.written.as_ref()) {
            (MutationKind::Create, _) => match reconcile::find(current, &mutation.key) {
                Some(shown) => reconcile::insert_first(&next, shown.clone()),
                None => next,
            },
            (MutationKind::Update, Some(written)) => reconcile::replace_by_id(&next, written.clone()),
            (MutationKind::Upsert, Some(written)) => reconcile::replace_by_key(&next, written.clone()),
            (MutationKind::Remove, _) => reconcile::remove_by_id(&next, &mutation.key),
            (_, None) => next,
        };
    }
    next
}

fn same_value<T: Serialize>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => match (serde_json::to_value(a), serde_json::to_value(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

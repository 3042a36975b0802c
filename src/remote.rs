//! Remote store - the network CRUD API for one collection.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::RemoteError;
use crate::reconcile;
use crate::record::{Identified, Record};

/// Network CRUD for one collection.
///
/// Implementations only need to resolve or reject; the engine never inspects
/// error details beyond logging them.
pub trait RemoteStore<T: Record>: Send + Sync + 'static {
    fn list(&self) -> impl Future<Output = Result<Vec<T>, RemoteError>> + Send;

    /// Persist a new record. The returned record carries the server identity.
    fn create(&self, input: T) -> impl Future<Output = Result<T, RemoteError>> + Send;

    fn update(&self, id: String, patch: T) -> impl Future<Output = Result<T, RemoteError>> + Send;

    fn remove(&self, id: String) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Insert-or-replace by natural key. Defaults to `update` on the record's key.
    fn upsert(&self, record: T) -> impl Future<Output = Result<T, RemoteError>> + Send {
        let key = record.key().to_string();
        self.update(key, record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    List,
    Create,
    Update,
    Remove,
    Upsert,
}

struct ServerState<T> {
    records: Vec<T>,
    next_id: u64,
    offline: bool,
    failures: HashMap<RemoteOp, VecDeque<RemoteError>>,
    calls: HashMap<RemoteOp, usize>,
}

/// In-process stand-in for a backend, for tests and offline development.
///
/// Clone-friendly (cloning shares the same server state). Server ids are
/// `srv-1`, `srv-2`, ... when built with [`InMemoryRemoteStore::assigning_ids`].
pub struct InMemoryRemoteStore<T> {
    state: Arc<Mutex<ServerState<T>>>,
    assign: Option<fn(&mut T, String)>,
}

impl<T> Clone for InMemoryRemoteStore<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            assign: self.assign,
        }
    }
}

impl<T: Record> Default for InMemoryRemoteStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> InMemoryRemoteStore<T> {
    /// A store that keeps each record's own key (natural-key collections).
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                records: Vec::new(),
                next_id: 1,
                offline: false,
                failures: HashMap::new(),
                calls: HashMap::new(),
            })),
            assign: None,
        }
    }

    pub fn with_records(self, records: Vec<T>) -> Self {
        self.lock().records = records;
        self
    }

    /// Reject the next call of `op` with `error`. Queued per op, oldest first.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of calls made for `op`, failed ones included.
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Server-side view of the collection.
    pub fn records(&self) -> Vec<T> {
        self.lock().records.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, op: RemoteOp) -> Result<std::sync::MutexGuard<'_, ServerState<T>>, RemoteError> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        if state.offline {
            return Err(RemoteError::network("server unreachable"));
        }
        if let Some(error) = state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            return Err(error);
        }
        Ok(state)
    }

    fn list_now(&self) -> Result<Vec<T>, RemoteError> {
        Ok(self.begin(RemoteOp::List)?.records.clone())
    }

    fn create_now(&self, mut input: T) -> Result<T, RemoteError> {
        let mut state = self.begin(RemoteOp::Create)?;
        if let Some(assign) = self.assign {
            let id = format!("srv-{}", state.next_id);
            state.next_id += 1;
            assign(&mut input, id);
        } else if reconcile::position(&state.records, input.key()).is_some() {
            return Err(RemoteError::rejected(409, format!("{} already exists", input.key())));
        }
        state.records.push(input.clone());
        Ok(input)
    }

    fn update_now(&self, id: String, patch: T) -> Result<T, RemoteError> {
        let mut state = self.begin(RemoteOp::Update)?;
        if id != patch.key() {
            return Err(RemoteError::rejected(400, "key mismatch"));
        }
        match reconcile::position(&state.records, &id) {
            Some(index) => {
                state.records[index] = patch.clone();
                Ok(patch)
            }
            None => Err(RemoteError::NotFound(id)),
        }
    }

    fn remove_now(&self, id: String) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteOp::Remove)?;
        match reconcile::position(&state.records, &id) {
            Some(index) => {
                state.records.remove(index);
                Ok(())
            }
            None => Err(RemoteError::NotFound(id)),
        }
    }

    fn upsert_now(&self, record: T) -> Result<T, RemoteError> {
        let mut state = self.begin(RemoteOp::Upsert)?;
        state.records = reconcile::replace_by_key(&state.records, record.clone());
        Ok(record)
    }
}

impl<T: Identified> InMemoryRemoteStore<T> {
    /// A store that assigns `srv-{n}` ids on create.
    pub fn assigning_ids() -> Self {
        Self {
            assign: Some(<T as Identified>::assign_id),
            ..Self::new()
        }
    }
}

impl<T: Record> RemoteStore<T> for InMemoryRemoteStore<T> {
    fn list(&self) -> impl Future<Output = Result<Vec<T>, RemoteError>> + Send {
        std::future::ready(self.list_now())
    }

    fn create(&self, input: T) -> impl Future<Output = Result<T, RemoteError>> + Send {
        std::future::ready(self.create_now(input))
    }

    fn update(&self, id: String, patch: T) -> impl Future<Output = Result<T, RemoteError>> + Send {
        std::future::ready(self.update_now(id, patch))
    }

    fn remove(&self, id: String) -> impl Future<Output = Result<(), RemoteError>> + Send {
        std::future::ready(self.remove_now(id))
    }

    fn upsert(&self, record: T) -> impl Future<Output = Result<T, RemoteError>> + Send {
        std::future::ready(self.upsert_now(record))
    }
}

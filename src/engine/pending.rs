use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Remove,
    Upsert,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Remove => write!(f, "remove"),
            MutationKind::Upsert => write!(f, "upsert"),
        }
    }
}

/// Monotonic per-engine mutation id; later mutations compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// An in-flight change, alive from the optimistic write until its remote call
/// settles.
#[derive(Debug, Clone)]
pub struct PendingMutation<T> {
    pub id: MutationId,
    pub kind: MutationKind,
    /// Key of the targeted entity (the placeholder for creates).
    pub key: String,
    pub placeholder_id: Option<String>,
    /// Whole collection as it was just before the optimistic write.
    pub previous_snapshot: Vec<T>,
    /// Value this mutation wrote for `key` (None for removes).
    pub(crate) written: Option<T>,
    /// Value to put back for `key` on rollback (None: the key was absent).
    pub(crate) restore: Option<T>,
    /// Where a removed entity sat, for re-insertion.
    pub(crate) restore_position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) index: usize,
    /// Key of the entity that preceded it.
    pub(crate) after: Option<String>,
}

pub(crate) struct PendingRegistry<T> {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<MutationId, PendingMutation<T>>>,
}

impl<T: Clone> PendingRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn register<F>(&self, build: F) -> MutationId
    where
        F: FnOnce(MutationId) -> PendingMutation<T>,
    {
        let id = MutationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let pending = build(id);
        self.lock().insert(id, pending);
        id
    }

    pub(crate) fn take(&self, id: MutationId) -> Option<PendingMutation<T>> {
        self.lock().remove(&id)
    }

    /// Pass rollback responsibility for `key` to the earliest mutation
    /// registered after `after`. Returns false when there is none.
    pub(crate) fn hand_down(
        &self,
        after: MutationId,
        key: &str,
        restore: Option<T>,
        restore_position: Option<Position>,
    ) -> bool {
        let mut entries = self.lock();
        let next = entries
            .range_mut(after..)
            .map(|(_, p)| p)
            .find(|p| p.id != after && p.key == key);
        match next {
            Some(pending) => {
                pending.restore = restore;
                if restore_position.is_some() {
                    pending.restore_position = restore_position;
                }
                true
            }
            None => false,
        }
    }

    /// Point every follow-up mutation aimed at `placeholder` at `server_key`,
    /// rewriting the ids inside the values they carry. Returns true if any of
    /// them wrote a value for the entity.
    pub(crate) fn retarget(
        &self,
        placeholder: &str,
        server_key: &str,
        assign: fn(&mut T, String),
    ) -> bool {
        let mut wrote = false;
        for pending in self.lock().values_mut() {
            if let Some(position) = pending.restore_position.as_mut() {
                if position.after.as_deref() == Some(placeholder) {
                    position.after = Some(server_key.to_string());
                }
            }
            if pending.kind == MutationKind::Create || pending.key != placeholder {
                continue;
            }
            pending.key = server_key.to_string();
            for value in [pending.written.as_mut(), pending.restore.as_mut()]
                .into_iter()
                .flatten()
            {
                assign(value, server_key.to_string());
            }
            wrote |= pending.written.is_some();
        }
        wrote
    }

    pub(crate) fn is_pending(&self, key: &str) -> bool {
        self.lock().values().any(|p| p.key == key)
    }

    pub(crate) fn all(&self) -> Vec<PendingMutation<T>> {
        self.lock().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<MutationId, PendingMutation<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

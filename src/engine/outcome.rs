use crate::error::RemoteError;

use super::pending::{MutationId, MutationKind};

/// How a mutation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T> {
    /// The server accepted the change; this is its copy of the entity.
    Confirmed(T),
    /// The server removed the entity with this key.
    Removed(String),
    /// The target was a placeholder the server never confirmed (its create
    /// failed or was dropped), so no network call was made.
    LocalOnly,
    /// The remote call failed and the optimistic change was reverted.
    RolledBack(RemoteError),
}

/// Terminal result of one engine operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<T> {
    pub mutation: MutationId,
    pub kind: MutationKind,
    pub key: String,
    pub status: Settled<T>,
}

impl<T> MutationOutcome<T> {
    pub fn is_success(&self) -> bool {
        !self.is_rolled_back()
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self.status, Settled::RolledBack(_))
    }

    pub fn confirmed(&self) -> Option<&T> {
        match &self.status {
            Settled::Confirmed(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match &self.status {
            Settled::RolledBack(err) => Some(err),
            _ => None,
        }
    }
}

/// User-facing wording for one collection, e.g. noun "garment" gives
/// "garment added" and "error adding garment".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationLabels {
    noun: String,
}

impl Default for MutationLabels {
    fn default() -> Self {
        Self::new("item")
    }
}

impl MutationLabels {
    pub fn new(noun: impl Into<String>) -> Self {
        Self { noun: noun.into() }
    }

    pub fn noun(&self) -> &str {
        &self.noun
    }

    pub fn success(&self, kind: MutationKind) -> String {
        let verb = match kind {
            MutationKind::Create => "added",
            MutationKind::Update => "updated",
            MutationKind::Remove => "removed",
            MutationKind::Upsert => "saved",
        };
        format!("{} {}", self.noun, verb)
    }

    pub fn failure(&self, kind: MutationKind) -> String {
        let gerund = match kind {
            MutationKind::Create => "adding",
            MutationKind::Update => "updating",
            MutationKind::Remove => "removing",
            MutationKind::Upsert => "saving",
        };
        format!("error {} {}", gerund, self.noun)
    }
}

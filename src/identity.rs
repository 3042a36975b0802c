use uuid::Uuid;

use crate::reconcile;
use crate::record::Record;

pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "temp-";

/// Allocates provisional ids for records the server has not confirmed yet and
/// swaps them for the server's ids once it has.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    prefix: String,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_PREFIX)
    }
}

impl IdentityResolver {
    /// An empty `prefix` falls back to [`DEFAULT_PLACEHOLDER_PREFIX`].
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if prefix.is_empty() {
            tracing::warn!(
                fallback = DEFAULT_PLACEHOLDER_PREFIX,
                "empty placeholder prefix; using the default"
            );
            prefix = DEFAULT_PLACEHOLDER_PREFIX.to_string();
        }
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A fresh placeholder: the prefix followed by a random v4 uuid.
    pub fn allocate_placeholder(&self) -> String {
        format!("{}{}", self.prefix, Uuid::new_v4().simple())
    }

    pub fn is_placeholder(&self, id: &str) -> bool {
        id.starts_with(&self.prefix)
    }

    /// Replace the entity bearing `placeholder_id` with `server_entity` at the
    /// same position. Returns the collection unchanged when the placeholder is
    /// gone (the user removed it while the create was in flight).
    pub fn reconcile<T: Record>(
        &self,
        collection: &[T],
        placeholder_id: &str,
        server_entity: T,
    ) -> Vec<T> {
        if reconcile::position(collection, placeholder_id).is_none() {
            tracing::debug!(
                collection = T::COLLECTION,
                placeholder_id,
                "placeholder no longer present; reconcile skipped"
            );
            return collection.to_vec();
        }
        reconcile::rekey(collection, placeholder_id, server_entity)
    }
}

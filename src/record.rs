use serde::{de::DeserializeOwned, Serialize};

/// A domain record held in a synchronized collection.
///
/// Use `#[derive(Record)]` rather than implementing this by hand.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection name for this record type (e.g., "garments", "planner").
    /// Used as the last segment of the cache key.
    const COLLECTION: &'static str;

    /// Uniqueness key within a snapshot: the `id` for id-keyed collections,
    /// the natural key (e.g. a date) for keyed collections.
    fn key(&self) -> &str;
}

/// Records whose key is a server-assigned id, so a placeholder can stand in
/// for it until the server confirms the create.
pub trait Identified: Record {
    fn assign_id(&mut self, id: String);
}

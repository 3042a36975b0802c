//! Optimistic, local-first synchronization for wardrobe collections.
//!
//! UI actions mutate an in-memory snapshot immediately, the snapshot is mirrored
//! to a durable cache, and the remote store is called in the background. When
//! the call settles the engine either swaps the placeholder for the server's
//! entity or reverts just the entity it touched, writes the cache again, and
//! emits a notification.

// Lets `#[derive(Record)]` expand to `wardrobe_sync::...` inside this crate too.
extern crate self as wardrobe_sync;

pub mod cache;
mod collection;
pub mod config;
mod domain;
pub mod engine;
mod error;
mod identity;
pub mod logging;
pub mod notify;
pub mod reconcile;
mod record;
mod remote;
pub mod state;

pub use cache::{CacheBackend, CacheCodec, DurableCache, InMemoryCache};
#[cfg(feature = "file-cache")]
pub use cache::FileCache;
pub use collection::{CollectionEngine, SyncedCollection};
pub use config::SyncConfig;
pub use domain::{
    Garment, InMemoryRemotes, Look, PlannerEntry, Trip, Wardrobe, WardrobeRemotes,
};
pub use engine::{
    EngineBuilder, MutationEngine, MutationId, MutationKind, MutationLabels, MutationOutcome,
    PendingMutation, SameEntityPolicy, Settled,
};
pub use error::{CacheError, ConfigError, RemoteError, SyncError};
pub use identity::{IdentityResolver, DEFAULT_PLACEHOLDER_PREFIX};
pub use logging::LogConfig;
pub use notify::{Notification, NotificationId, NotificationKind, Notifier};
pub use record::{Identified, Record};
pub use remote::{InMemoryRemoteStore, RemoteOp, RemoteStore};
pub use state::{CollectionState, FnAccess, SnapshotAccess, SubscriptionId};

// Derive macro shares the trait's name, like serde's `Serialize`.
pub use wardrobe_sync_macros::Record;

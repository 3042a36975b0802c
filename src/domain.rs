//! Wardrobe records and the per-user bundle of synchronized collections.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheBackend, DurableCache};
use crate::collection::SyncedCollection;
use crate::config::SyncConfig;
use crate::engine::{MutationEngine, MutationLabels};
use crate::error::RemoteError;
use crate::notify::Notifier;
use crate::remote::{InMemoryRemoteStore, RemoteStore};
use crate::state::CollectionState;
use crate::Record;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Record)]
#[record(collection = "garments")]
pub struct Garment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Listed on the marketplace.
    #[serde(default)]
    pub for_sale: bool,
    #[serde(default)]
    pub price_cents: Option<u32>,
}

impl Garment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A saved outfit: an ordered set of garments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Record)]
#[record(collection = "looks")]
pub struct Look {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub garment_ids: Vec<String>,
    #[serde(default)]
    pub occasion: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Look {
    pub fn new(name: impl Into<String>, garment_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            garment_ids,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Record)]
#[record(collection = "trips")]
pub struct Trip {
    pub id: String,
    pub destination: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
    #[serde(default)]
    pub look_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Trip {
    pub fn new(
        destination: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            ..Self::default()
        }
    }
}

/// The look planned for one calendar day. Keyed by date, one entry per day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Record)]
#[record(collection = "planner")]
pub struct PlannerEntry {
    /// `YYYY-MM-DD`
    #[record(key)]
    pub date: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub look_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PlannerEntry {
    pub fn new(date: impl Into<String>, look_id: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            look_id: Some(look_id.into()),
            ..Self::default()
        }
    }
}

/// Remote stores for the four wardrobe collections.
pub struct WardrobeRemotes<G, L, Tr, P> {
    pub garments: G,
    pub looks: L,
    pub trips: Tr,
    pub planner: P,
}

pub type InMemoryRemotes = WardrobeRemotes<
    InMemoryRemoteStore<Garment>,
    InMemoryRemoteStore<Look>,
    InMemoryRemoteStore<Trip>,
    InMemoryRemoteStore<PlannerEntry>,
>;

impl InMemoryRemotes {
    pub fn in_memory() -> Self {
        Self {
            garments: InMemoryRemoteStore::assigning_ids(),
            looks: InMemoryRemoteStore::assigning_ids(),
            trips: InMemoryRemoteStore::assigning_ids(),
            planner: InMemoryRemoteStore::new(),
        }
    }
}

/// Every synchronized collection of one signed-in user, sharing one notifier
/// and one cache backend. Cache keys are `{namespace}:{user}:{collection}`.
pub struct Wardrobe<G, L, Tr, P, B> {
    user: String,
    config: SyncConfig,
    pub notifier: Notifier,
    pub garments: SyncedCollection<Garment, G, B>,
    pub looks: SyncedCollection<Look, L, B>,
    pub trips: SyncedCollection<Trip, Tr, B>,
    pub planner: SyncedCollection<PlannerEntry, P, B>,
}

impl<G, L, Tr, P, B> Wardrobe<G, L, Tr, P, B>
where
    G: RemoteStore<Garment>,
    L: RemoteStore<Look>,
    Tr: RemoteStore<Trip>,
    P: RemoteStore<PlannerEntry>,
    B: CacheBackend + Clone + 'static,
{
    pub fn open(
        user: impl Into<String>,
        config: SyncConfig,
        backend: B,
        remotes: WardrobeRemotes<G, L, Tr, P>,
    ) -> Self {
        let user = user.into();
        let notifier = Notifier::with_ttl(config.notification_ttl());
        let cache = DurableCache::with_codec(backend, config.codec);

        Self {
            garments: collection(&user, &config, &cache, &notifier, "garment", remotes.garments),
            looks: collection(&user, &config, &cache, &notifier, "look", remotes.looks),
            trips: collection(&user, &config, &cache, &notifier, "trip", remotes.trips),
            planner: collection(&user, &config, &cache, &notifier, "plan", remotes.planner),
            notifier,
            user,
            config,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Load every collection from the cache.
    pub fn hydrate(&self) {
        self.garments.hydrate();
        self.looks.hydrate();
        self.trips.hydrate();
        self.planner.hydrate();
    }

    /// Refresh every collection from the server. Returns the first failure,
    /// after attempting all four.
    pub async fn refresh(&self) -> Result<(), RemoteError> {
        let results = [
            self.garments.refresh().await,
            self.looks.refresh().await,
            self.trips.refresh().await,
            self.planner.refresh().await,
        ];
        results.into_iter().find(|r| r.is_err()).unwrap_or(Ok(0)).map(|_| ())
    }

    /// Forget this user's cached collections (sign-out).
    pub fn clear_cache(&self) {
        self.garments.engine().cache().clear(self.garments.engine().cache_key());
        self.looks.engine().cache().clear(self.looks.engine().cache_key());
        self.trips.engine().cache().clear(self.trips.engine().cache_key());
        self.planner.engine().cache().clear(self.planner.engine().cache_key());
    }
}

impl<B: CacheBackend + Clone + 'static>
    Wardrobe<
        InMemoryRemoteStore<Garment>,
        InMemoryRemoteStore<Look>,
        InMemoryRemoteStore<Trip>,
        InMemoryRemoteStore<PlannerEntry>,
        B,
    >
{
    /// A wardrobe backed by in-process remote stores.
    pub fn in_memory(user: impl Into<String>, config: SyncConfig, backend: B) -> Self {
        Self::open(user, config, backend, InMemoryRemotes::in_memory())
    }
}

fn collection<T, R, B>(
    user: &str,
    config: &SyncConfig,
    cache: &DurableCache<B>,
    notifier: &Notifier,
    noun: &str,
    remote: R,
) -> SyncedCollection<T, R, B>
where
    T: Record,
    R: RemoteStore<T>,
    B: CacheBackend + Clone + 'static,
{
    let engine = MutationEngine::builder(
        CollectionState::default(),
        cache.clone(),
        config.cache_key(user, T::COLLECTION),
    )
    .config(config)
    .notifier(notifier.clone())
    .labels(MutationLabels::new(noun))
    .build();
    SyncedCollection::new(remote, engine)
}

//! The cache under backends that refuse or stall writes.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wardrobe_sync::{
    CacheBackend, CacheError, CollectionState, DurableCache, InMemoryCache, MutationEngine,
    MutationLabels, NotificationKind,
};

use crate::support::{item, offline, Item, CACHE_KEY};

/// Parks the first write until the test lets it through.
struct StallFirstWrite {
    inner: InMemoryCache,
    entered: Mutex<Option<Sender<()>>>,
    release: Mutex<Option<Receiver<()>>>,
}

impl CacheBackend for StallFirstWrite {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        let release = self.release.lock().unwrap().take();
        if let Some(release) = release {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                entered.send(()).unwrap();
            }
            release.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        self.inner.write(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key)
    }
}

#[test]
fn a_stalled_cache_write_is_never_overtaken() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let backend = Arc::new(StallFirstWrite {
        inner: InMemoryCache::new(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    });
    let state = CollectionState::new(vec![item("a", "Coat"), item("b", "Belt")]);
    let engine: MutationEngine<Item, _, _> =
        MutationEngine::builder(state, DurableCache::new(Arc::clone(&backend)), CACHE_KEY).build();

    let first = {
        let engine = engine.clone();
        thread::spawn(move || {
            drop(engine.update(item("a", "Long coat"), |e| async move { Ok(e) }));
        })
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let second = {
        let engine = engine.clone();
        thread::spawn(move || {
            drop(engine.update(item("b", "Red belt"), |e| async move { Ok(e) }));
        })
    };
    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();
    first.join().unwrap();
    second.join().unwrap();

    let cached: Vec<Item> = DurableCache::new(Arc::clone(&backend)).load(CACHE_KEY, Vec::new());
    assert_eq!(
        engine.snapshot(),
        vec![item("a", "Long coat"), item("b", "Red belt")]
    );
    assert_eq!(cached, engine.snapshot());
}

#[tokio::test]
async fn a_full_cache_never_blocks_a_mutation() {
    // Smaller than the cache key alone, so every write is refused.
    let cache = InMemoryCache::with_quota(8);
    let state = CollectionState::new(vec![item("a", "Coat"), item("b", "Belt")]);
    let engine: MutationEngine<Item, _, _> =
        MutationEngine::builder(state, DurableCache::new(cache.clone()), CACHE_KEY)
            .labels(MutationLabels::new("garment"))
            .build();

    let created = engine
        .create(item("", "Hat"), |input| async move {
            Ok(Item {
                id: "srv-1".to_string(),
                ..input
            })
        })
        .await;
    assert_eq!(created.confirmed(), Some(&item("srv-1", "Hat")));

    let update = engine.update(item("a", "Long coat"), |_| async { Err(offline()) });
    assert_eq!(engine.snapshot()[1], item("a", "Long coat"));
    assert!(update.await.is_rolled_back());

    assert!(engine.remove("b", |_| async { Ok(()) }).await.is_success());

    assert_eq!(
        engine.snapshot(),
        vec![item("srv-1", "Hat"), item("a", "Coat")]
    );
    assert!(cache.is_empty());
    let notes: Vec<_> = engine
        .notifier()
        .active()
        .into_iter()
        .map(|n| (n.kind, n.message))
        .collect();
    assert_eq!(
        notes,
        vec![
            (NotificationKind::Success, "garment added".to_string()),
            (NotificationKind::Error, "error updating garment".to_string()),
            (NotificationKind::Success, "garment removed".to_string()),
        ]
    );
}

//! The per-user bundle: shared notifier, per-user cache keys, file-backed restarts.

use tempfile::TempDir;
use wardrobe_sync::{
    CacheCodec, FileCache, Garment, InMemoryCache, Look, NotificationKind, PlannerEntry,
    RemoteOp, SyncConfig, Trip, Wardrobe,
};

#[tokio::test]
async fn notifications_from_every_collection_share_one_tray() {
    let wardrobe = Wardrobe::in_memory("u1", SyncConfig::default(), InMemoryCache::new());

    wardrobe.garments.create(Garment::new("Jacket")).await;
    let mut look = Look::new("Office", vec!["srv-1".to_string()]);
    look.id = "l-missing".to_string();
    let outcome = wardrobe.looks.update(look).await;

    assert!(outcome.is_rolled_back());
    let messages: Vec<_> = wardrobe
        .notifier
        .active()
        .into_iter()
        .map(|n| (n.kind, n.message))
        .collect();
    assert_eq!(
        messages,
        vec![
            (NotificationKind::Success, "garment added".to_string()),
            (NotificationKind::Error, "error updating look".to_string()),
        ]
    );
}

#[tokio::test]
async fn planner_keeps_one_entry_per_day() {
    let wardrobe = Wardrobe::in_memory("u1", SyncConfig::default(), InMemoryCache::new());

    wardrobe
        .planner
        .upsert_keyed(PlannerEntry::new("2024-05-01", "l1"))
        .await;
    wardrobe
        .planner
        .upsert_keyed(PlannerEntry::new("2024-05-01", "l2"))
        .await;

    assert_eq!(
        wardrobe.planner.snapshot(),
        vec![PlannerEntry::new("2024-05-01", "l2")]
    );
    assert_eq!(wardrobe.planner.remote().records(), wardrobe.planner.snapshot());
    assert_eq!(wardrobe.planner.remote().calls(RemoteOp::Upsert), 2);
}

#[tokio::test]
async fn cache_is_partitioned_per_user() {
    let backend = InMemoryCache::new();
    let alice = Wardrobe::in_memory("alice", SyncConfig::default(), backend.clone());
    alice
        .trips
        .create(Trip::new("Lisbon", "2024-06-01", "2024-06-07"))
        .await;

    let bob = Wardrobe::in_memory("bob", SyncConfig::default(), backend.clone());
    bob.hydrate();
    assert!(bob.trips.snapshot().is_empty());

    let alice_again = Wardrobe::in_memory("alice", SyncConfig::default(), backend);
    alice_again.hydrate();
    assert_eq!(alice_again.trips.snapshot().len(), 1);
    assert_eq!(alice_again.trips.engine().cache_key(), "wardrobe:alice:trips");
}

#[tokio::test]
async fn sign_out_clears_the_users_cache() {
    let backend = InMemoryCache::new();
    let wardrobe = Wardrobe::in_memory("u1", SyncConfig::default(), backend.clone());
    wardrobe.garments.create(Garment::new("Jacket")).await;
    wardrobe.clear_cache();

    let next = Wardrobe::in_memory("u1", SyncConfig::default(), backend);
    next.hydrate();
    assert!(next.garments.snapshot().is_empty());
}

#[tokio::test]
async fn file_cache_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let config = SyncConfig::from_json_str(r#"{ "codec": "binary" }"#).unwrap();
    assert_eq!(config.codec, CacheCodec::Binary);

    {
        let wardrobe =
            Wardrobe::in_memory("u1", config.clone(), FileCache::new(dir.path()).unwrap());
        let mut jacket = Garment::new("Jacket");
        jacket.tags = vec!["winter".to_string()];
        jacket.price_cents = Some(4_500);
        wardrobe.garments.create(jacket).await;
        wardrobe
            .planner
            .upsert_keyed(PlannerEntry::new("2024-05-01", "l1"))
            .await;
    }

    let restarted = Wardrobe::in_memory("u1", config, FileCache::new(dir.path()).unwrap());
    restarted.hydrate();

    let garments = restarted.garments.snapshot();
    assert_eq!(garments.len(), 1);
    assert_eq!(garments[0].id, "srv-1");
    assert_eq!(garments[0].tags, vec!["winter"]);
    assert_eq!(garments[0].price_cents, Some(4_500));
    assert_eq!(
        restarted.planner.snapshot(),
        vec![PlannerEntry::new("2024-05-01", "l1")]
    );
}

#[tokio::test]
async fn placeholder_prefix_comes_from_config() {
    let config = SyncConfig::from_json_str(r#"{ "placeholder_prefix": "local-" }"#).unwrap();
    let wardrobe = Wardrobe::in_memory("u1", config, InMemoryCache::new());

    let pending = wardrobe.garments.create(Garment::new("Jacket"));
    let placeholder = wardrobe.garments.snapshot()[0].id.clone();
    assert!(placeholder.starts_with("local-"));
    assert!(wardrobe.garments.engine().is_pending(&placeholder));

    pending.await;
    assert_eq!(wardrobe.garments.snapshot()[0].id, "srv-1");
}

#[tokio::test]
async fn refresh_reports_the_first_failure_but_tries_every_collection() {
    let wardrobe = Wardrobe::in_memory("u1", SyncConfig::default(), InMemoryCache::new());
    wardrobe.looks.remote().set_offline(true);

    assert!(wardrobe.refresh().await.is_err());

    assert_eq!(wardrobe.garments.remote().calls(RemoteOp::List), 1);
    assert_eq!(wardrobe.planner.remote().calls(RemoteOp::List), 1);
    let warnings = wardrobe
        .notifier
        .active()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Warning)
        .count();
    assert_eq!(warnings, 1);
}

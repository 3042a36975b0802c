//! Integration tests for the optimistic mutation engine.

mod durability;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use support::{deferred, item, offline, Harness, Item};
use wardrobe_sync::{
    CollectionState, DurableCache, InMemoryCache, MutationEngine, MutationKind, NotificationKind,
    PlannerEntry, RemoteError, Settled,
};

#[tokio::test]
async fn create_shows_placeholder_then_server_entity() {
    let h = Harness::new(vec![item("g1", "Scarf")]);

    let pending = h.engine.create(item("", "Jacket"), |input| async move {
        Ok(Item {
            id: "srv-1".to_string(),
            ..input
        })
    });

    // Visible before the remote call has even started.
    let optimistic = h.engine.snapshot();
    assert_eq!(optimistic.len(), 2);
    assert!(h.engine.resolver().is_placeholder(&optimistic[0].id));
    assert_eq!(optimistic[0].name, "Jacket");
    assert_eq!(optimistic[1], item("g1", "Scarf"));
    assert_eq!(h.engine.pending_count(), 1);
    h.assert_cache_mirrors_memory();

    let in_flight = &h.engine.pending()[0];
    assert_eq!(in_flight.kind, MutationKind::Create);
    assert_eq!(in_flight.placeholder_id.as_deref(), Some(optimistic[0].id.as_str()));
    assert_eq!(in_flight.previous_snapshot, vec![item("g1", "Scarf")]);

    let outcome = pending.await;
    assert_eq!(outcome.kind, MutationKind::Create);
    assert_eq!(outcome.confirmed(), Some(&item("srv-1", "Jacket")));
    assert_eq!(
        h.engine.snapshot(),
        vec![item("srv-1", "Jacket"), item("g1", "Scarf")]
    );
    assert_eq!(h.engine.pending_count(), 0);
    h.assert_cache_mirrors_memory();
    assert_eq!(h.messages(NotificationKind::Success), vec!["garment added"]);
}

#[tokio::test]
async fn create_failure_drops_only_the_placeholder() {
    let h = Harness::new(vec![item("g1", "Scarf")]);

    let outcome = h
        .engine
        .create(item("", "Jacket"), |_| async { Err(offline()) })
        .await;

    assert!(outcome.is_rolled_back());
    assert_eq!(outcome.error(), Some(&offline()));
    assert_eq!(h.engine.snapshot(), vec![item("g1", "Scarf")]);
    h.assert_cache_mirrors_memory();
    assert_eq!(h.messages(NotificationKind::Error), vec!["error adding garment"]);
    assert!(h.messages(NotificationKind::Success).is_empty());
}

#[tokio::test]
async fn remove_failure_restores_original_order() {
    let h = Harness::new(vec![item("g1", "Scarf"), item("g2", "Boots")]);

    let pending = h.engine.remove("g1", |_| async {
        Err(RemoteError::rejected(500, "internal error"))
    });
    assert_eq!(h.ids(), vec!["g2"]);
    h.assert_cache_mirrors_memory();

    let outcome = pending.await;
    assert!(outcome.is_rolled_back());
    assert_eq!(
        h.engine.snapshot(),
        vec![item("g1", "Scarf"), item("g2", "Boots")]
    );
    h.assert_cache_mirrors_memory();
    assert_eq!(
        h.messages(NotificationKind::Error),
        vec!["error removing garment"]
    );
}

#[tokio::test]
async fn remove_success_keeps_entity_gone() {
    let h = Harness::new(vec![item("g1", "Scarf"), item("g2", "Boots")]);

    let outcome = h.engine.remove("g2", |_| async { Ok(()) }).await;

    assert_eq!(outcome.status, Settled::Removed("g2".to_string()));
    assert_eq!(h.ids(), vec!["g1"]);
    h.assert_cache_mirrors_memory();
    assert_eq!(h.messages(NotificationKind::Success), vec!["garment removed"]);
}

#[tokio::test]
async fn update_success_takes_the_server_copy() {
    let h = Harness::new(vec![item("g1", "Scarf")]);

    let pending = h.engine.update(item("g1", "  Wool scarf "), |mut patch| async move {
        patch.name = patch.name.trim().to_string();
        Ok(patch)
    });
    assert_eq!(h.engine.snapshot(), vec![item("g1", "  Wool scarf ")]);

    let outcome = pending.await;
    assert_eq!(outcome.confirmed(), Some(&item("g1", "Wool scarf")));
    assert_eq!(h.engine.snapshot(), vec![item("g1", "Wool scarf")]);
    h.assert_cache_mirrors_memory();
}

#[tokio::test]
async fn update_failure_restores_previous_value() {
    let h = Harness::new(vec![item("g1", "Scarf"), item("g2", "Boots")]);

    let outcome = h
        .engine
        .update(item("g2", "Red boots"), |_| async { Err(offline()) })
        .await;

    assert!(outcome.is_rolled_back());
    assert_eq!(
        h.engine.snapshot(),
        vec![item("g1", "Scarf"), item("g2", "Boots")]
    );
    h.assert_cache_mirrors_memory();
    assert_eq!(
        h.messages(NotificationKind::Error),
        vec!["error updating garment"]
    );
}

#[tokio::test]
async fn upsert_replaces_the_entry_for_a_date() {
    let state = CollectionState::new(vec![PlannerEntry::new("2024-05-01", "l1")]);
    let engine = MutationEngine::builder(
        state.clone(),
        DurableCache::new(InMemoryCache::new()),
        "wardrobe:u1:planner",
    )
    .build();

    let outcome = engine
        .upsert_keyed(PlannerEntry::new("2024-05-01", "l2"), |entry| async move {
            Ok(entry)
        })
        .await;

    assert!(outcome.is_success());
    assert_eq!(engine.snapshot(), vec![PlannerEntry::new("2024-05-01", "l2")]);
    assert_eq!(
        engine.cache().load::<Vec<PlannerEntry>>(engine.cache_key(), Vec::new()),
        engine.snapshot()
    );
}

#[tokio::test]
async fn upsert_failure_on_new_date_drops_the_entry() {
    let state = CollectionState::new(vec![PlannerEntry::new("2024-05-01", "l1")]);
    let engine = MutationEngine::builder(
        state,
        DurableCache::new(InMemoryCache::new()),
        "wardrobe:u1:planner",
    )
    .build();

    let pending = engine.upsert_keyed(PlannerEntry::new("2024-05-02", "l3"), |_| async {
        Err(RemoteError::network("timeout"))
    });
    assert_eq!(engine.snapshot().len(), 2);

    let outcome = pending.await;
    assert!(outcome.is_rolled_back());
    assert_eq!(engine.snapshot(), vec![PlannerEntry::new("2024-05-01", "l1")]);
    assert_eq!(
        engine.notifier().active()[0].message,
        "error saving item"
    );
}

#[tokio::test]
async fn removing_a_placeholder_before_create_settles_keeps_it_gone() {
    let h = Harness::new(Vec::new());
    let (respond, response) = deferred::<Item>();
    let sent = Arc::new(Mutex::new(Vec::new()));

    let create = h.engine.create(item("", "Jacket"), move |_| response);
    let placeholder = h.ids()[0].clone();
    let log = Arc::clone(&sent);
    let remove = h.engine.remove(placeholder, move |id| {
        log.lock().unwrap().push(id);
        async { Ok(()) }
    });
    assert!(h.engine.snapshot().is_empty());

    respond.send(Ok(item("srv-9", "Jacket"))).unwrap();
    let (created, removed) = tokio::join!(create, remove);

    assert_eq!(created.confirmed(), Some(&item("srv-9", "Jacket")));
    assert_eq!(removed.status, Settled::Removed("srv-9".to_string()));
    // The delete went out against the server id, after the create.
    assert_eq!(*sent.lock().unwrap(), vec!["srv-9"]);
    assert!(h.engine.snapshot().is_empty());
    assert!(h.cached().is_empty());
    assert_eq!(h.engine.pending_count(), 0);
}

#[tokio::test]
async fn editing_a_placeholder_is_sent_once_the_create_confirms() {
    let h = Harness::new(vec![item("g1", "Scarf")]);
    let (respond, response) = deferred::<Item>();
    let sent = Arc::new(Mutex::new(Vec::new()));

    let create = h.engine.create(item("", "Jacket"), move |_| response);
    let placeholder = h.ids()[0].clone();
    let log = Arc::clone(&sent);
    let update = h
        .engine
        .update(item(&placeholder, "Leather jacket"), move |patch| {
            log.lock().unwrap().push(patch.clone());
            async move { Ok(patch) }
        });
    assert_eq!(
        h.engine.snapshot(),
        vec![item(&placeholder, "Leather jacket"), item("g1", "Scarf")]
    );

    respond.send(Ok(item("srv-1", "Jacket"))).unwrap();
    let (created, updated) = tokio::join!(create, update);

    assert_eq!(created.confirmed(), Some(&item("srv-1", "Jacket")));
    assert_eq!(updated.confirmed(), Some(&item("srv-1", "Leather jacket")));
    assert_eq!(*sent.lock().unwrap(), vec![item("srv-1", "Leather jacket")]);
    assert_eq!(
        h.engine.snapshot(),
        vec![item("srv-1", "Leather jacket"), item("g1", "Scarf")]
    );
    h.assert_cache_mirrors_memory();
    assert_eq!(
        h.messages(NotificationKind::Success),
        vec!["garment added", "garment updated"]
    );
}

#[tokio::test]
async fn edits_to_a_failed_create_never_reach_the_server() {
    let h = Harness::new(Vec::new());
    let calls = Arc::new(Mutex::new(0));

    let create = h
        .engine
        .create(item("", "Jacket"), |_| async { Err(offline()) });
    let placeholder = h.ids()[0].clone();
    let counter = Arc::clone(&calls);
    let update = h
        .engine
        .update(item(&placeholder, "Leather jacket"), move |patch| {
            *counter.lock().unwrap() += 1;
            async move { Ok(patch) }
        });

    let (created, updated) = tokio::join!(create, update);

    assert!(created.is_rolled_back());
    assert_eq!(updated.status, Settled::LocalOnly);
    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(h.engine.snapshot().is_empty());
    h.assert_cache_mirrors_memory();
    assert_eq!(h.messages(NotificationKind::Error), vec!["error adding garment"]);
    assert!(h.messages(NotificationKind::Success).is_empty());
    assert_eq!(h.engine.pending_count(), 0);
}

#[tokio::test]
async fn placeholder_left_by_an_earlier_session_is_removed_locally() {
    let h = Harness::new(vec![item("temp-stale", "Hat"), item("g1", "Scarf")]);

    let outcome = h
        .engine
        .remove("temp-stale", |_| async { Err(offline()) })
        .await;

    assert_eq!(outcome.status, Settled::LocalOnly);
    assert_eq!(h.ids(), vec!["g1"]);
    h.assert_cache_mirrors_memory();
    assert_eq!(h.messages(NotificationKind::Success), vec!["garment removed"]);
}

#[tokio::test]
async fn rollback_leaves_other_settled_mutations_alone() {
    let h = Harness::new(vec![
        item("a", "Coat"),
        item("b", "Belt"),
        item("c", "Cap"),
    ]);
    let (fail_update, update_response) = deferred::<Item>();

    let update = h.engine.update(item("a", "Long coat"), move |_| update_response);
    let remove = h.engine.remove("b", |_| async { Ok(()) });
    assert_eq!(
        h.engine.snapshot(),
        vec![item("a", "Long coat"), item("c", "Cap")]
    );

    assert!(remove.await.is_success());
    fail_update.send(Err(offline())).unwrap();
    assert!(update.await.is_rolled_back());

    // The removal of b survives the rollback of a.
    assert_eq!(h.engine.snapshot(), vec![item("a", "Coat"), item("c", "Cap")]);
    h.assert_cache_mirrors_memory();
}

#[tokio::test]
async fn failed_create_does_not_undo_a_concurrent_update() {
    let h = Harness::new(vec![item("a", "Coat")]);
    let (fail_create, create_response) = deferred::<Item>();

    let create = h.engine.create(item("", "Hat"), move |_| create_response);
    let update = h
        .engine
        .update(item("a", "Long coat"), |patch| async move { Ok(patch) });

    assert!(update.await.is_success());
    fail_create.send(Err(offline())).unwrap();
    assert!(create.await.is_rolled_back());

    assert_eq!(h.engine.snapshot(), vec![item("a", "Long coat")]);
    h.assert_cache_mirrors_memory();
}

#[tokio::test]
async fn failed_remove_reinserts_next_to_its_old_neighbour() {
    let h = Harness::new(vec![
        item("a", "Coat"),
        item("b", "Belt"),
        item("c", "Cap"),
    ]);
    let (fail_remove, remove_response) = deferred::<()>();

    let remove = h.engine.remove("b", move |_| remove_response);
    let create = h.engine.create(item("", "Hat"), |input| async move {
        Ok(Item {
            id: "srv-1".to_string(),
            ..input
        })
    });

    assert!(create.await.is_success());
    fail_remove.send(Err(offline())).unwrap();
    assert!(remove.await.is_rolled_back());

    assert_eq!(h.ids(), vec!["srv-1", "a", "b", "c"]);
    h.assert_cache_mirrors_memory();
}

#[tokio::test]
async fn remove_of_unknown_key_has_nothing_to_restore() {
    let h = Harness::new(vec![item("a", "Coat")]);

    let outcome = h
        .engine
        .remove("ghost", |id| async move { Err(RemoteError::NotFound(id)) })
        .await;

    assert_eq!(outcome.error(), Some(&RemoteError::NotFound("ghost".to_string())));
    assert_eq!(h.engine.snapshot(), vec![item("a", "Coat")]);
}

#[tokio::test]
async fn each_invocation_makes_one_remote_call() {
    let h = Harness::new(vec![item("a", "Coat")]);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&calls);
    let create = h.engine.create(item("", "Hat"), move |input| {
        log.lock().unwrap().push("create");
        async move {
            Ok(Item {
                id: "srv-1".to_string(),
                ..input
            })
        }
    });
    let log = Arc::clone(&calls);
    let update = h.engine.update(item("a", "Long coat"), move |_| {
        log.lock().unwrap().push("update");
        async { Err(offline()) }
    });
    let log = Arc::clone(&calls);
    let remove = h.engine.remove("a", move |_| {
        log.lock().unwrap().push("remove");
        async { Ok(()) }
    });

    create.await;
    update.await;
    remove.await;

    assert_eq!(*calls.lock().unwrap(), vec!["create", "update", "remove"]);
}

#[tokio::test]
async fn placeholders_are_unique_and_tagged() {
    let h = Harness::new(Vec::new());

    let in_flight: Vec<_> = (0..50)
        .map(|n| {
            let (_respond, response) = deferred::<Item>();
            h.engine.create(item("", &format!("Garment {n}")), move |_| response)
        })
        .collect();

    let ids: HashSet<String> = h.ids().into_iter().collect();
    assert_eq!(ids.len(), 50);
    assert!(ids.iter().all(|id| id.starts_with("temp-")));
    assert_eq!(h.engine.pending_count(), 50);
    drop(in_flight);
}

#[tokio::test]
async fn subscribers_see_optimistic_and_corrective_writes() {
    let h = Harness::new(vec![item("a", "Coat")]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.state.subscribe(move |snapshot: &[Item]| {
        let names = snapshot.iter().map(|i| i.name.clone()).collect::<Vec<_>>();
        sink.lock().unwrap().push(names);
    });

    h.engine
        .update(item("a", "Long coat"), |_| async { Err(offline()) })
        .await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![vec!["Long coat".to_string()], vec!["Coat".to_string()]]
    );
}

#[tokio::test]
async fn rollbacks_persist_through_a_restart() {
    let h = Harness::new(vec![item("a", "Coat"), item("b", "Belt")]);

    h.engine.remove("a", |_| async { Err(offline()) }).await;

    let restarted = MutationEngine::builder(
        CollectionState::<Item>::default(),
        DurableCache::new(h.cache.clone()),
        support::CACHE_KEY,
    )
    .build();
    let cached: Vec<Item> = restarted
        .cache()
        .load(restarted.cache_key(), Vec::new());
    restarted.restore_snapshot(cached);

    assert_eq!(
        restarted.snapshot(),
        vec![item("a", "Coat"), item("b", "Belt")]
    );
}

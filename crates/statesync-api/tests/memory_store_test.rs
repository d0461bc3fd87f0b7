#![allow(clippy::unwrap_used)]
// Behavioural tests for `MemoryStore` through the `RemoteStore` trait.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use statesync_api::{
    ChildEvent, Error, MemoryStore, Path, RemoteStore, TryRecv, ValueEvent, validate_segment,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn path(raw: &str) -> Path {
    Path::parse(raw).unwrap()
}

fn drain<E>(sub: &mut statesync_api::RemoteSubscription<E>) -> Vec<E> {
    let mut out = Vec::new();
    while let TryRecv::Event(event) = sub.try_recv() {
        out.push(event);
    }
    out
}

fn seeded() -> MemoryStore {
    MemoryStore::from_json(json!({
        "games": {
            "g1": {
                "players": {
                    "alice": {"name": "Alice", "score": 3},
                    "bob": {"name": "Bob", "score": 1}
                },
                "settings": {"title": "Friday"}
            }
        }
    }))
    .unwrap()
}

// ── Segments ────────────────────────────────────────────────────────

#[test]
fn segment_rules_are_exported_for_key_codecs() {
    assert!(validate_segment("player-1").is_ok());
    let reason = validate_segment("a.b").unwrap_err();
    assert!(reason.contains("'.'"), "{reason}");
    assert!(validate_segment("").is_err());
    assert!(validate_segment("a/b").is_err());
}

// ── get / set ───────────────────────────────────────────────────────

#[tokio::test]
async fn get_returns_document_or_none() {
    let store = seeded();
    assert_eq!(
        store.get(&path("games/g1/settings/title")).await.unwrap(),
        Some(json!("Friday"))
    );
    assert_eq!(store.get(&path("games/g2")).await.unwrap(), None);
}

#[tokio::test]
async fn set_null_deletes_and_prunes() {
    let store = MemoryStore::new();
    store.set(&path("a/b"), json!(1)).await.unwrap();
    store.remove(&path("a/b")).await.unwrap();
    assert_eq!(store.snapshot().await, Value::Null);
}

#[tokio::test]
async fn set_rejects_invalid_nested_keys() {
    let store = MemoryStore::new();
    let err = store
        .set(&path("a"), json!({"bad.key": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath { .. }), "{err}");
}

// ── Child subscriptions ─────────────────────────────────────────────

#[tokio::test]
async fn child_subscription_starts_with_snapshot_then_synced() {
    let store = seeded();
    let mut sub = store
        .subscribe_children(&path("games/g1/players"))
        .await
        .unwrap();

    assert_eq!(
        drain(&mut sub),
        vec![
            ChildEvent::Added {
                key: "alice".into(),
                value: json!({"name": "Alice", "score": 3}),
            },
            ChildEvent::Added {
                key: "bob".into(),
                value: json!({"name": "Bob", "score": 1}),
            },
            ChildEvent::Synced,
        ]
    );
}

#[tokio::test]
async fn child_subscription_sees_add_change_remove_in_order() {
    let store = seeded();
    let players = path("games/g1/players");
    let mut sub = store.subscribe_children(&players).await.unwrap();
    drain(&mut sub);

    store
        .set(&path("games/g1/players/carol"), json!({"name": "Carol"}))
        .await
        .unwrap();
    store
        .set(&path("games/g1/players/alice/score"), json!(4))
        .await
        .unwrap();
    store.remove(&path("games/g1/players/bob")).await.unwrap();

    assert_eq!(
        drain(&mut sub),
        vec![
            ChildEvent::Added {
                key: "carol".into(),
                value: json!({"name": "Carol"}),
            },
            ChildEvent::Changed {
                key: "alice".into(),
                value: json!({"name": "Alice", "score": 4}),
            },
            ChildEvent::Removed { key: "bob".into() },
        ]
    );
}

#[tokio::test]
async fn writing_the_base_diffs_all_children() {
    let store = seeded();
    let players = path("games/g1/players");
    let mut sub = store.subscribe_children(&players).await.unwrap();
    drain(&mut sub);

    store
        .set(&players, json!({"bob": {"name": "Bob", "score": 1}, "dan": 1}))
        .await
        .unwrap();

    assert_eq!(
        drain(&mut sub),
        vec![
            ChildEvent::Removed {
                key: "alice".into()
            },
            ChildEvent::Added {
                key: "dan".into(),
                value: json!(1),
            },
        ]
    );
}

#[tokio::test]
async fn identical_child_write_is_echoed() {
    let store = seeded();
    let mut sub = store
        .subscribe_children(&path("games/g1/players"))
        .await
        .unwrap();
    drain(&mut sub);

    store
        .set(&path("games/g1/players/bob/score"), json!(1))
        .await
        .unwrap();
    assert_eq!(
        drain(&mut sub),
        vec![ChildEvent::Changed {
            key: "bob".into(),
            value: json!({"name": "Bob", "score": 1}),
        }]
    );
}

#[tokio::test]
async fn unrelated_writes_are_not_delivered() {
    let store = seeded();
    let mut sub = store
        .subscribe_children(&path("games/g1/players"))
        .await
        .unwrap();
    drain(&mut sub);

    store
        .set(&path("games/g1/settings/title"), json!("Saturday"))
        .await
        .unwrap();
    assert_eq!(sub.try_recv(), TryRecv::Empty);
}

#[tokio::test]
async fn dropped_subscriptions_are_forgotten() {
    let store = seeded();
    let sub = store
        .subscribe_children(&path("games/g1/players"))
        .await
        .unwrap();
    assert_eq!(store.subscriber_count().await, 1);
    drop(sub);
    assert_eq!(store.subscriber_count().await, 0);
}

// ── Value subscriptions ─────────────────────────────────────────────

#[tokio::test]
async fn value_subscription_delivers_current_then_changes() {
    let store = seeded();
    let settings = path("games/g1/settings");
    let mut sub = store.subscribe_value(&settings).await.unwrap();

    store
        .set(&path("games/g1/settings/title"), json!("Saturday"))
        .await
        .unwrap();
    store.remove(&settings).await.unwrap();

    assert_eq!(
        drain(&mut sub),
        vec![
            ValueEvent::Value(json!({"title": "Friday"})),
            ValueEvent::Value(json!({"title": "Saturday"})),
            ValueEvent::Value(Value::Null),
        ]
    );
}

#[tokio::test]
async fn identical_write_does_not_notify_value_subscribers() {
    let store = seeded();
    let title = path("games/g1/settings/title");
    let mut sub = store.subscribe_value(&title).await.unwrap();
    drain(&mut sub);

    store.set(&title, json!("Friday")).await.unwrap();
    assert_eq!(sub.try_recv(), TryRecv::Empty);
}

// ── Failure controls ────────────────────────────────────────────────

#[tokio::test]
async fn offline_store_fails_operations_and_interrupts_subscribers() {
    let store = seeded();
    let mut sub = store
        .subscribe_children(&path("games/g1/players"))
        .await
        .unwrap();
    drain(&mut sub);

    store.set_offline(Some("network down".into())).await;

    assert_eq!(
        sub.recv().await,
        Some(ChildEvent::Interrupted {
            reason: "network down".into()
        })
    );
    assert_eq!(sub.recv().await, None);

    let err = store.get(&path("games")).await.unwrap_err();
    assert!(matches!(err, Error::Unavailable { .. }));
    assert!(err.is_transient());

    store.set_offline(None).await;
    assert!(store.get(&path("games")).await.unwrap().is_some());
}

#[tokio::test]
async fn interrupt_targets_one_path() {
    let store = seeded();
    let players = path("games/g1/players");
    let mut a = store.subscribe_children(&players).await.unwrap();
    let _b = store
        .subscribe_value(&path("games/g1/settings"))
        .await
        .unwrap();
    drain(&mut a);

    assert_eq!(store.interrupt(&players, "revoked").await, 1);
    assert_eq!(
        a.try_recv(),
        TryRecv::Event(ChildEvent::Interrupted {
            reason: "revoked".into()
        })
    );
    assert_eq!(store.subscriber_count().await, 1);
}

#[test]
fn from_json_str_reports_bad_seed() {
    let err = MemoryStore::from_json_str("{not json").unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }));
}

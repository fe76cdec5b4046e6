/// File store tests
///
/// Snapshot, history, and status round-trips through the JSON file layout,
/// plus recovery of entity state by a fresh coordinator over the same
/// directory.
/// Run with: cargo test --test file_store_tests

use durentity::persist::{EntityRecord, FileStore, Store};
use durentity::tracking::{self, ops, order_key};
use durentity::{Coordinator, EntityKey, InstanceId, InstanceState};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn entity_record_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let key = EntityKey::new("order", "fs-1");

    assert!(store.load_entity(&key).await.unwrap().is_none());

    let record = EntityRecord {
        seq: 7,
        state: json!({ "quantity": 2, "tracked_items": ["fs-1-1"] }),
        outbox: Vec::new(),
    };
    store.save_entity(&key, &record).await.unwrap();

    let loaded = store.load_entity(&key).await.unwrap().unwrap();
    assert_eq!(loaded.seq, 7);
    assert_eq!(loaded.state, record.state);
}

#[tokio::test]
async fn history_appends_are_readable_line_by_line() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let coord = Coordinator::new(store.clone());
    tracking::register(&coord);

    let instance = coord.start("scenario1").await.unwrap();
    let status = coord.wait(&instance).await.unwrap();
    assert!(matches!(status.state, InstanceState::Completed { .. }));

    let history = store.load_history(&instance).await.unwrap();
    assert!(!history.is_empty());

    // A second store over the same directory sees the identical log.
    let reopened = FileStore::open(dir.path()).unwrap();
    let reread = reopened.load_history(&instance).await.unwrap();
    assert_eq!(reread.len(), history.len());
    assert_eq!(
        reopened.load_status(&instance).await.unwrap().unwrap(),
        status
    );
}

#[tokio::test]
async fn missing_instance_has_no_history_or_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let nobody = InstanceId::new();
    assert!(store.load_history(&nobody).await.unwrap().is_empty());
    assert!(store.load_status(&nobody).await.unwrap().is_none());
}

#[tokio::test]
async fn entity_state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = order_key("persisted");

    {
        let coord = Coordinator::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        tracking::register(&coord);
        coord
            .entities()
            .dispatch(None, &key, ops::SET_QUANTITY, json!(4))
            .await
            .unwrap();
        coord
            .entities()
            .dispatch(None, &key, ops::ADD_TRACKED_ITEM, json!("persisted-1"))
            .await
            .unwrap();
    }

    let coord = Coordinator::new(Arc::new(FileStore::open(dir.path()).unwrap()));
    tracking::register(&coord);
    let state = coord.read_entity(&key).await.unwrap();
    assert_eq!(state["quantity"], json!(4));
    assert_eq!(state["tracked_items"], json!(["persisted-1"]));
}

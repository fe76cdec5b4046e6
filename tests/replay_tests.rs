/// Replay idempotence tests
///
/// Re-executing a workflow instance against its recorded history reproduces
/// the same terminal result and issues no new side effects: no history
/// growth, no extra entity operations, identical recorded guids.
/// Run with: cargo test --test replay_tests

use durentity::persist::{MemoryStore, Store};
use durentity::tracking::{self, ops, order_key};
use durentity::{Coordinator, InstanceState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn settle() {
    // Resume runs in the background; give a replayed instance time to finish.
    tokio::time::sleep(Duration::from_millis(400)).await;
}

#[tokio::test]
async fn scenario1_replays_without_new_side_effects() {
    let store = Arc::new(MemoryStore::new());
    let coord = Coordinator::new(store.clone());
    tracking::register(&coord);

    let instance = coord.start("scenario1").await.unwrap();
    let status = coord.wait(&instance).await.unwrap();
    let InstanceState::Completed { output } = &status.state else {
        panic!("scenario1 failed: {status:?}");
    };
    let order_id = output["order_id"].as_str().unwrap().to_string();

    let history_before = store.load_history(&instance).await.unwrap();
    let order_before = store
        .load_entity(&order_key(&order_id))
        .await
        .unwrap()
        .unwrap();
    assert!(!history_before.is_empty());

    coord.resume(&instance).await.unwrap();
    settle().await;

    let status_after = coord.status(&instance).await.unwrap();
    assert_eq!(status_after, status, "replay changed the terminal status");

    let history_after = store.load_history(&instance).await.unwrap();
    assert_eq!(
        history_after.len(),
        history_before.len(),
        "replay appended new history events"
    );
    let order_after = store
        .load_entity(&order_key(&order_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        order_after.seq, order_before.seq,
        "replay re-issued entity operations"
    );
}

#[tokio::test]
async fn recorded_guid_survives_a_process_restart() {
    let store = Arc::new(MemoryStore::new());

    let first = Coordinator::new(store.clone());
    first.register_workflow("mint", |ctx| async move {
        Ok(json!(ctx.new_guid().await?.to_string()))
    });
    let instance = first.start("mint").await.unwrap();
    let status = first.wait(&instance).await.unwrap();
    let InstanceState::Completed { output } = status.state else {
        panic!("mint failed");
    };

    // Fresh coordinator over the same store stands in for a restarted
    // process: same registrations, recovered history.
    let second = Coordinator::new(store.clone());
    second.register_workflow("mint", |ctx| async move {
        Ok(json!(ctx.new_guid().await?.to_string()))
    });
    second.resume(&instance).await.unwrap();
    settle().await;

    let replayed = second.status(&instance).await.unwrap();
    assert_eq!(
        replayed.state,
        InstanceState::Completed {
            output: output.clone()
        },
        "replay minted a different guid"
    );
    assert_eq!(store.load_history(&instance).await.unwrap().len(), 1);
}

#[tokio::test]
async fn changed_call_input_fails_replay_as_nondeterministic() {
    let store = Arc::new(MemoryStore::new());

    let first = Coordinator::new(store.clone());
    tracking::register(&first);
    first.register_workflow("set_qty", |ctx| async move {
        ctx.call(&order_key("nd-order"), ops::SET_QUANTITY, json!(1))
            .await?;
        Ok(json!(null))
    });
    let instance = first.start("set_qty").await.unwrap();
    first.wait(&instance).await.unwrap();

    // Same workflow name, but re-execution issues the call with a different
    // input than the one on record.
    let second = Coordinator::new(store.clone());
    tracking::register(&second);
    second.register_workflow("set_qty", |ctx| async move {
        ctx.call(&order_key("nd-order"), ops::SET_QUANTITY, json!(2))
            .await?;
        Ok(json!(null))
    });
    second.resume(&instance).await.unwrap();
    settle().await;

    let replayed = second.status(&instance).await.unwrap();
    let InstanceState::Failed { error } = replayed.state else {
        panic!("divergent replay should fail the instance: {replayed:?}");
    };
    assert!(error.contains("diverged"), "unexpected error: {error}");
}

#[tokio::test]
async fn concurrent_branch_workflow_replays_cleanly() {
    let store = Arc::new(MemoryStore::new());
    let coord = Coordinator::new(store.clone());
    tracking::register(&coord);

    let instance = coord.start("scenario4").await.unwrap();
    let status = coord.wait(&instance).await.unwrap();
    let InstanceState::Completed { output } = &status.state else {
        panic!("scenario4 failed: {status:?}");
    };
    assert_eq!(output["succeeded"], json!(1));
    assert_eq!(output["failed"], json!(9));

    let history_before = store.load_history(&instance).await.unwrap();

    coord.resume(&instance).await.unwrap();
    settle().await;

    let status_after = coord.status(&instance).await.unwrap();
    assert_eq!(
        status_after, status,
        "branchy replay diverged from the original run"
    );
    assert_eq!(
        store.load_history(&instance).await.unwrap().len(),
        history_before.len()
    );
}

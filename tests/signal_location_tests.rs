/// Cross-entity signaling tests
///
/// Location pings are fire-and-forget signals resolved at the receiver: the
/// tracker discards stale timestamps and forwards accepted fixes to its
/// paired tracked item over a second signal hop.
/// Run with: cargo test --test signal_location_tests

use chrono::{TimeZone, Utc};
use durentity::tracking::{self, ops, tracked_item_key, tracker_key};
use durentity::Coordinator;
use serde_json::{json, Value};
use std::time::Duration;

fn coordinator() -> Coordinator {
    let coord = Coordinator::in_memory();
    tracking::register(&coord);
    coord
}

fn ping(ts: i64) -> Value {
    json!({
        "latitude": 47.6,
        "longitude": -122.3,
        "timestamp": Utc.timestamp_opt(ts, 0).unwrap().to_rfc3339(),
    })
}

/// Poll until the entity state matches, or fail after ~2s. Signals carry no
/// reply, so tests observe their effect through the receiver's state.
async fn wait_for(coord: &Coordinator, key: &durentity::EntityKey, check: impl Fn(&Value) -> bool) {
    for _ in 0..100 {
        let state = coord.read_entity(key).await.unwrap();
        if check(&state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("entity {key} never reached the expected state");
}

#[tokio::test]
async fn accepted_ping_reaches_the_paired_item() {
    let coord = coordinator();
    let tracker = tracker_key("sig-tracker");
    let item = tracked_item_key("sig-item");
    coord
        .entities()
        .dispatch(None, &tracker, ops::SET_TRACKED_ITEM_ID, json!("sig-item"))
        .await
        .unwrap();
    coord
        .entities()
        .dispatch(None, &item, ops::SET_TRACKER_ID, json!("sig-tracker"))
        .await
        .unwrap();

    coord.signal(&tracker, ops::SET_CURRENT_LOCATION, ping(2_000));

    wait_for(&coord, &item, |state| {
        state["location"]["latitude"] == json!(47.6)
    })
    .await;
}

#[tokio::test]
async fn stale_ping_is_discarded_not_stored() {
    let coord = coordinator();
    let tracker = tracker_key("stale-tracker");

    coord.signal(&tracker, ops::SET_CURRENT_LOCATION, ping(2_000));
    wait_for(&coord, &tracker, |state| !state["location"].is_null()).await;

    coord.signal(&tracker, ops::SET_CURRENT_LOCATION, ping(1_000));
    // A newer ping after the stale one proves the mailbox drained both.
    coord.signal(&tracker, ops::SET_CURRENT_LOCATION, ping(3_000));

    wait_for(&coord, &tracker, |state| {
        state["location"]["timestamp"]
            .as_str()
            .is_some_and(|ts| ts.starts_with("1970-01-01T00:50:00"))
    })
    .await;

    // The stale fix never replaced anything in between.
    let state = coord.read_entity(&tracker).await.unwrap();
    let ts = state["location"]["timestamp"].as_str().unwrap();
    assert!(!ts.starts_with("1970-01-01T00:16:40"), "stale ping was stored");
}

#[tokio::test]
async fn signals_do_not_wait_for_locks() {
    let coord = coordinator();
    let tracker = tracker_key("free-tracker");

    // No pairing, no locks, no workflow: a bare signal still lands.
    coord.signal(&tracker, ops::SET_CURRENT_LOCATION, ping(1_000));
    wait_for(&coord, &tracker, |state| !state["location"].is_null()).await;

    let state = coord.read_entity(&tracker).await.unwrap();
    assert_eq!(state["tracked_item_id"], json!(null));
}

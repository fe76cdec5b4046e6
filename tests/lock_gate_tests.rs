/// Lock gate tests
///
/// While a workflow strand holds an entity's lock, dispatches from anyone
/// else queue behind the release; the holder's own calls pass through.
/// Run with: cargo test --test lock_gate_tests

use durentity::persist::MemoryStore;
use durentity::tracking::{ops, order_key, Order};
use durentity::{EntityRuntime, InstanceId, LockManager, LockOwner};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn runtime() -> (EntityRuntime, Arc<LockManager>) {
    let locks = Arc::new(LockManager::new());
    let entities = EntityRuntime::new(Arc::new(MemoryStore::new()), Arc::clone(&locks));
    entities.register::<Order>();
    (entities, locks)
}

#[tokio::test]
async fn outside_dispatch_waits_for_lock_release() {
    let (entities, locks) = runtime();
    let key = order_key("gated");
    let holder = LockOwner::root(InstanceId::new());
    let held = locks.acquire_all(&holder, std::slice::from_ref(&key)).await;

    let blocked = {
        let entities = entities.clone();
        let key = key.clone();
        tokio::spawn(async move {
            entities
                .dispatch(None, &key, ops::SET_QUANTITY, json!(3))
                .await
        })
    };

    // The dispatch must still be parked while the lock is held.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());

    drop(held);
    timeout(Duration::from_secs(2), blocked)
        .await
        .expect("dispatch should complete after release")
        .unwrap()
        .unwrap();

    let state = entities.read_state(&key).await.unwrap();
    assert_eq!(state["quantity"], json!(3));
}

#[tokio::test]
async fn holder_calls_pass_the_gate() {
    let (entities, locks) = runtime();
    let key = order_key("self-gated");
    let holder = LockOwner::root(InstanceId::new());
    let _held = locks.acquire_all(&holder, std::slice::from_ref(&key)).await;

    let result = timeout(
        Duration::from_secs(2),
        entities.dispatch(Some(&holder), &key, ops::SET_QUANTITY, json!(5)),
    )
    .await
    .expect("holder's own dispatch must not block");
    result.unwrap();
}

#[tokio::test]
async fn sibling_strand_dispatch_waits_like_an_outsider() {
    let (entities, locks) = runtime();
    let key = order_key("branch-gated");
    let instance = InstanceId::new();
    let holder = LockOwner::new(instance.clone(), 1);
    let sibling = LockOwner::new(instance, 2);
    let held = locks.acquire_all(&holder, std::slice::from_ref(&key)).await;

    let blocked = {
        let entities = entities.clone();
        let key = key.clone();
        tokio::spawn(async move {
            entities
                .dispatch(Some(&sibling), &key, ops::SET_QUANTITY, json!(7))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished(), "sibling strand passed a lock it does not hold");

    drop(held);
    timeout(Duration::from_secs(2), blocked)
        .await
        .expect("dispatch should complete after release")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn queued_dispatches_drain_in_order_after_release() {
    let (entities, locks) = runtime();
    let key = order_key("drain");
    let holder = LockOwner::root(InstanceId::new());
    let held = locks.acquire_all(&holder, std::slice::from_ref(&key)).await;

    let mut waiters = Vec::new();
    for q in [1u32, 2, 3] {
        let entities = entities.clone();
        let key = key.clone();
        waiters.push(tokio::spawn(async move {
            entities
                .dispatch(None, &key, ops::SET_QUANTITY, json!(q))
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    for waiter in waiters {
        timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

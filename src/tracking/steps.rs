//! Orchestration steps for the atomic pairing protocol:
//! reserve a tracked-item slot under the order's lock, then bind tracker and
//! tracked item to each other under a shared two-entity lock.

use super::entities::{ops, order_key, tracked_item_key, tracker_key};
use crate::core::{CoordError, Result};
use crate::orchestration::OrchestrationContext;
use serde_json::{json, Value};

pub async fn create_order(ctx: &OrchestrationContext, order_id: &str, quantity: u32) -> Result<()> {
    ctx.call(&order_key(order_id), ops::SET_QUANTITY, json!(quantity))
        .await?;
    Ok(())
}

/// Reserve one tracked-item slot on the order. Holds the order's lock across
/// the read-check-mutate so concurrent reservations from other instances
/// serialize; fails with `CapacityExceeded` when the order is full.
pub async fn reserve_tracked_item(ctx: &OrchestrationContext, order_id: &str) -> Result<String> {
    let order = order_key(order_id);
    let _scope = ctx.lock(std::slice::from_ref(&order)).await?;

    let quantity: Option<u32> =
        serde_json::from_value(ctx.call(&order, ops::GET_QUANTITY, Value::Null).await?)?;
    let count: u32 =
        serde_json::from_value(ctx.call(&order, ops::GET_TRACKED_ITEM_COUNT, Value::Null).await?)?;
    if count >= quantity.unwrap_or(0) {
        return Err(CoordError::CapacityExceeded);
    }

    let tracked_item_id = format!("{order_id}-{}", count + 1);
    ctx.call(&order, ops::ADD_TRACKED_ITEM, json!(tracked_item_id))
        .await?;
    Ok(tracked_item_id)
}

/// Pair a tracker with a tracked item. Both peer references are written
/// inside one lock scope covering both entities, so no state where only one
/// side is set is ever observable; fails with `AlreadyAssigned` if either
/// side is already bound.
pub async fn assign_tracker(
    ctx: &OrchestrationContext,
    tracker_id: &str,
    tracked_item_id: &str,
) -> Result<()> {
    let tracker = tracker_key(tracker_id);
    let item = tracked_item_key(tracked_item_id);
    let _scope = ctx.lock(&[tracker.clone(), item.clone()]).await?;

    let current_item: Option<String> =
        serde_json::from_value(ctx.call(&tracker, ops::GET_TRACKED_ITEM_ID, Value::Null).await?)?;
    if current_item.is_some() {
        return Err(CoordError::AlreadyAssigned {
            kind: tracker.kind,
            id: tracker.id,
        });
    }
    let current_tracker: Option<String> =
        serde_json::from_value(ctx.call(&item, ops::GET_TRACKER_ID, Value::Null).await?)?;
    if current_tracker.is_some() {
        return Err(CoordError::AlreadyAssigned {
            kind: item.kind,
            id: item.id,
        });
    }

    ctx.call(&tracker, ops::SET_TRACKED_ITEM_ID, json!(tracked_item_id))
        .await?;
    ctx.call(&item, ops::SET_TRACKER_ID, json!(tracker_id))
        .await?;
    Ok(())
}

/// Reserve a slot on the order, then pair the tracker with it.
pub async fn apply_tracking_configuration(
    ctx: &OrchestrationContext,
    order_id: &str,
    tracker_id: &str,
) -> Result<()> {
    let tracked_item_id = reserve_tracked_item(ctx, order_id).await?;
    assign_tracker(ctx, tracker_id, &tracked_item_id).await
}

use super::location::TrackerLocation;
use crate::core::{CoordError, EntityKey, Result};
use crate::entity::{Effects, EntityState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Wire-level operation names for the tracking entities.
pub mod ops {
    pub const GET_QUANTITY: &str = "get_quantity";
    pub const SET_QUANTITY: &str = "set_quantity";
    pub const GET_TRACKED_ITEM_COUNT: &str = "get_tracked_item_count";
    pub const ADD_TRACKED_ITEM: &str = "add_tracked_item";

    pub const GET_TRACKER_ID: &str = "get_tracker_id";
    pub const SET_TRACKER_ID: &str = "set_tracker_id";
    pub const SET_LOCATION: &str = "set_location";

    pub const GET_TRACKED_ITEM_ID: &str = "get_tracked_item_id";
    pub const SET_TRACKED_ITEM_ID: &str = "set_tracked_item_id";
    pub const SET_CURRENT_LOCATION: &str = "set_current_location";
}

pub fn order_key(id: &str) -> EntityKey {
    EntityKey::new(Order::KIND, id)
}

pub fn tracked_item_key(id: &str) -> EntityKey {
    EntityKey::new(TrackedItem::KIND, id)
}

pub fn tracker_key(id: &str) -> EntityKey {
    EntityKey::new(Tracker::KIND, id)
}

fn unknown_op(key: &EntityKey, operation: &str) -> CoordError {
    CoordError::UnknownOperation {
        entity: key.to_string(),
        operation: operation.to_string(),
    }
}

fn parse<T: serde::de::DeserializeOwned>(input: Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| CoordError::BadPayload(e.to_string()))
}

/// Single-assignment guard shared by both sides of a pairing: setting an
/// already-set field to a different peer is `AlreadyAssigned`; re-issuing
/// the identical completed assignment is `DuplicateAssignment`. Neither
/// mutates the stored value.
fn assign_once(slot: &mut Option<String>, value: String, key: &EntityKey) -> Result<Value> {
    match slot {
        Some(existing) if *existing == value => Err(CoordError::DuplicateAssignment {
            kind: key.kind.clone(),
            id: key.id.clone(),
        }),
        Some(_) => Err(CoordError::AlreadyAssigned {
            kind: key.kind.clone(),
            id: key.id.clone(),
        }),
        None => {
            *slot = Some(value);
            Ok(Value::Null)
        }
    }
}

// ============================================================================
// Order
// ============================================================================

/// Capacity container: holds a declared quantity and the ids of tracked
/// items reserved against it. The capacity invariant
/// (`tracked_items.len() <= quantity`) is enforced here, not only in the
/// reservation workflow, so it holds under any interleaving.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    pub quantity: Option<u32>,
    pub tracked_items: HashSet<String>,
}

impl EntityState for Order {
    const KIND: &'static str = "order";

    fn apply(
        &mut self,
        key: &EntityKey,
        operation: &str,
        input: Value,
        _effects: &mut Effects,
    ) -> Result<Value> {
        match operation {
            ops::GET_QUANTITY => Ok(json!(self.quantity)),
            ops::SET_QUANTITY => {
                self.quantity = Some(parse(input)?);
                Ok(Value::Null)
            }
            ops::GET_TRACKED_ITEM_COUNT => Ok(json!(self.tracked_items.len())),
            ops::ADD_TRACKED_ITEM => {
                let tracked_item_id: String = parse(input)?;
                if self.tracked_items.contains(&tracked_item_id) {
                    // Callers treat the id as an exclusive reservation, so a
                    // repeated add is a protocol fault, not a no-op.
                    return Err(CoordError::DuplicateTrackedItem {
                        kind: key.kind.clone(),
                        id: key.id.clone(),
                        item: tracked_item_id,
                    });
                }
                if self.tracked_items.len() >= self.quantity.unwrap_or(0) as usize {
                    return Err(CoordError::CapacityExceeded);
                }
                self.tracked_items.insert(tracked_item_id);
                Ok(Value::Null)
            }
            _ => Err(unknown_op(key, operation)),
        }
    }
}

// ============================================================================
// Tracked Item
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackedItem {
    pub tracker_id: Option<String>,
    pub location: Option<TrackerLocation>,
}

impl EntityState for TrackedItem {
    const KIND: &'static str = "tracked_item";

    fn apply(
        &mut self,
        key: &EntityKey,
        operation: &str,
        input: Value,
        _effects: &mut Effects,
    ) -> Result<Value> {
        match operation {
            ops::GET_TRACKER_ID => Ok(json!(self.tracker_id)),
            ops::SET_TRACKER_ID => assign_once(&mut self.tracker_id, parse(input)?, key),
            ops::SET_LOCATION => {
                // Geofencing or arrival checks would go here.
                self.location = Some(parse(input)?);
                Ok(Value::Null)
            }
            _ => Err(unknown_op(key, operation)),
        }
    }
}

// ============================================================================
// Tracker
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tracker {
    pub tracked_item_id: Option<String>,
    pub location: Option<TrackerLocation>,
}

impl EntityState for Tracker {
    const KIND: &'static str = "tracker";

    fn apply(
        &mut self,
        key: &EntityKey,
        operation: &str,
        input: Value,
        effects: &mut Effects,
    ) -> Result<Value> {
        match operation {
            ops::GET_TRACKED_ITEM_ID => Ok(json!(self.tracked_item_id)),
            ops::SET_TRACKED_ITEM_ID => assign_once(&mut self.tracked_item_id, parse(input)?, key),
            ops::SET_CURRENT_LOCATION => {
                let location: TrackerLocation = parse(input)?;
                if let Some(current) = &self.location {
                    if location.timestamp < current.timestamp {
                        // Out-of-date ping; keep the stored fix. Not an error.
                        return Ok(Value::Null);
                    }
                }
                self.location = Some(location.clone());
                if let Some(tracked_item_id) = &self.tracked_item_id {
                    effects.signal(
                        tracked_item_key(tracked_item_id),
                        ops::SET_LOCATION,
                        json!(location),
                    );
                }
                Ok(Value::Null)
            }
            _ => Err(unknown_op(key, operation)),
        }
    }
}

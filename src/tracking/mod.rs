// ============================================================================
// Item Tracking Sample Domain
// ============================================================================
//
// Orders reserve capacity for tracked items; trackers are paired with tracked
// items atomically under a two-entity lock; location pings flow tracker →
// tracked item by fire-and-forget signal with receiver-side staleness checks.

pub mod entities;
pub mod location;
pub mod scenarios;
pub mod steps;

pub use entities::{ops, order_key, tracked_item_key, tracker_key, Order, TrackedItem, Tracker};
pub use location::TrackerLocation;

use crate::facade::Coordinator;

/// Register the tracking entities and the sample scenario workflows.
pub fn register(coord: &Coordinator) {
    coord.register_entity::<Order>();
    coord.register_entity::<TrackedItem>();
    coord.register_entity::<Tracker>();
    scenarios::register(coord);
}

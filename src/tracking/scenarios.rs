//! Sample scenario workflows exercising the pairing protocol. Registered by
//! name so they can be started from the HTTP ingress or from tests.

use super::steps;
use crate::core::CoordError;
use crate::facade::Coordinator;
use futures::future::join_all;
use serde_json::json;
use tracing::info;

pub const SCENARIO_1: &str = "scenario1";
pub const SCENARIO_2: &str = "scenario2";
pub const SCENARIO_3: &str = "scenario3";
pub const SCENARIO_4: &str = "scenario4";

pub fn register(coord: &Coordinator) {
    // Happy path: order with quantity 2, two trackers attached.
    coord.register_workflow(SCENARIO_1, |ctx| async move {
        let order_id = format!("order-{}", ctx.new_guid().await?);
        let quantity = 2;
        let mut tracker_ids = Vec::new();
        for i in 1..=2 {
            tracker_ids.push(format!("tracker-{}-{i}", ctx.new_guid().await?));
        }

        steps::create_order(&ctx, &order_id, quantity).await?;
        if !ctx.is_replaying() {
            info!(order_id, quantity, "order created");
        }
        for tracker_id in &tracker_ids {
            steps::apply_tracking_configuration(&ctx, &order_id, tracker_id).await?;
            if !ctx.is_replaying() {
                info!(order_id, tracker_id, "tracker paired");
            }
        }
        Ok(json!({ "order_id": order_id, "trackers": tracker_ids }))
    });

    // Tracker already in use: pairing the same tracker onto a second order
    // fails with AlreadyAssigned, which the workflow catches.
    coord.register_workflow(SCENARIO_2, |ctx| async move {
        let order1_id = format!("order-{}", ctx.new_guid().await?);
        let order2_id = format!("order-{}", ctx.new_guid().await?);
        let tracker_id = format!("tracker-{}", ctx.new_guid().await?);

        steps::create_order(&ctx, &order1_id, 2).await?;
        steps::apply_tracking_configuration(&ctx, &order1_id, &tracker_id).await?;
        steps::create_order(&ctx, &order2_id, 2).await?;

        match steps::apply_tracking_configuration(&ctx, &order2_id, &tracker_id).await {
            Err(CoordError::AlreadyAssigned { .. }) => {
                if !ctx.is_replaying() {
                    info!(tracker_id, "second pairing rejected as expected");
                }
                Ok(json!({ "caught": "already_assigned" }))
            }
            Ok(()) => Err(CoordError::Runtime(
                "re-pairing an assigned tracker unexpectedly succeeded".to_string(),
            )),
            Err(other) => Err(other),
        }
    });

    // Capacity exhausted: a third tracker on a quantity-2 order fails with
    // CapacityExceeded, which the workflow catches.
    coord.register_workflow(SCENARIO_3, |ctx| async move {
        let order_id = format!("order-{}", ctx.new_guid().await?);
        let mut tracker_ids = Vec::new();
        for i in 1..=3 {
            tracker_ids.push(format!("tracker-{}-{i}", ctx.new_guid().await?));
        }

        steps::create_order(&ctx, &order_id, 2).await?;
        for tracker_id in &tracker_ids[..2] {
            steps::apply_tracking_configuration(&ctx, &order_id, tracker_id).await?;
        }

        match steps::apply_tracking_configuration(&ctx, &order_id, &tracker_ids[2]).await {
            Err(CoordError::CapacityExceeded) => {
                if !ctx.is_replaying() {
                    info!(order_id, "extra pairing rejected as expected");
                }
                Ok(json!({ "caught": "capacity_exceeded" }))
            }
            Ok(()) => Err(CoordError::Runtime(
                "pairing beyond order capacity unexpectedly succeeded".to_string(),
            )),
            Err(other) => Err(other),
        }
    });

    // Ten simultaneous pairing attempts against a quantity-1 order; exactly
    // one reservation wins. Each attempt runs on its own context fork so its
    // history replays independently of how the attempts interleave.
    coord.register_workflow(SCENARIO_4, |ctx| async move {
        let order_id = format!("order-{}", ctx.new_guid().await?);
        let attempts = 10;
        let mut tracker_ids = Vec::new();
        for i in 0..attempts {
            tracker_ids.push(format!("tracker-{}-{i}", ctx.new_guid().await?));
        }

        steps::create_order(&ctx, &order_id, 1).await?;

        let mut branches = Vec::new();
        for tracker_id in tracker_ids {
            let branch = ctx.fork();
            let order_id = order_id.clone();
            branches.push(async move {
                steps::apply_tracking_configuration(&branch, &order_id, &tracker_id).await
            });
        }
        let results = join_all(branches).await;

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - succeeded;
        if !ctx.is_replaying() {
            info!(order_id, attempts, succeeded, failed, "simultaneous pairing attempts settled");
        }
        Ok(json!({ "attempts": attempts, "succeeded": succeeded, "failed": failed }))
    });
}

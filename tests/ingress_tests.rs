/// HTTP ingress tests
///
/// Drives the axum router directly with `tower::ServiceExt::oneshot`, the
/// way an external client would hit the running binary.
/// Run with: cargo test --test ingress_tests

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use durentity::tracking::{self, tracker_key};
use durentity::{Coordinator, InstanceId};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> (axum::Router, Arc<Coordinator>) {
    let coord = Arc::new(Coordinator::in_memory());
    tracking::register(&coord);
    (durentity::server::router(Arc::clone(&coord)), coord)
}

async fn body_json(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn start_workflow_returns_accepted_with_instance_id() {
    let (app, coord) = app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/workflows/scenario1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response.into_body()).await;
    let instance = InstanceId::from(body["instance_id"].as_str().unwrap());
    let status = coord.wait(&instance).await.unwrap();
    assert!(status.state.is_terminal());
}

#[tokio::test]
async fn unknown_workflow_is_404() {
    let (app, _coord) = app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/workflows/scenario99")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["code"], json!("not_found"));
}

#[tokio::test]
async fn instance_status_is_queryable() {
    let (app, coord) = app();
    let instance = coord.start("scenario3").await.unwrap();
    coord.wait(&instance).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/instances/{instance}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["workflow"], json!("scenario3"));
    assert_eq!(body["state"], json!("completed"));
}

#[tokio::test]
async fn unknown_instance_is_404() {
    let (app, _coord) = app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/instances/no-such-instance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn location_update_is_forwarded_as_a_signal() {
    let (app, coord) = app();
    let payload = json!({
        "latitude": 51.5,
        "longitude": -0.12,
        "timestamp": "2024-05-01T12:00:00Z",
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/trackers/http-tracker/location")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let key = tracker_key("http-tracker");
    for _ in 0..100 {
        let state = coord.read_entity(&key).await.unwrap();
        if state["location"]["latitude"] == json!(51.5) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("location signal never reached the tracker");
}

#[tokio::test]
async fn malformed_location_payload_is_rejected() {
    let (app, _coord) = app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/trackers/http-tracker/location")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{ "latitude": "not-a-number" }"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

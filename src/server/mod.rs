//! HTTP ingress for the coordination engine.
//!
//! Thin collaborator over the facade: start a workflow by name, query an
//! instance's status, and forward tracker location pings as entity signals.

use crate::core::{CoordError, InstanceId};
use crate::facade::Coordinator;
use crate::tracking::{ops, tracker_key, TrackerLocation};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub struct ApiError(CoordError);

impl From<CoordError> for ApiError {
    fn from(err: CoordError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CoordError::UnknownWorkflow(_) | CoordError::InstanceNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            CoordError::BadPayload(_) | CoordError::Serialization(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}

pub fn router(coord: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/workflows/:name", post(start_workflow))
        .route("/instances/:id", get(instance_status))
        .route("/trackers/:id/location", post(update_tracker_location))
        .layer(TraceLayer::new_for_http())
        .with_state(coord)
}

pub async fn serve(coord: Arc<Coordinator>, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(coord)).await?;
    Ok(())
}

async fn start_workflow(
    State(coord): State<Arc<Coordinator>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let instance = coord.start(&name).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "instance_id": instance })),
    ))
}

async fn instance_status(
    State(coord): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = coord.status(&InstanceId::from(id)).await?;
    Ok(Json(status))
}

async fn update_tracker_location(
    State(coord): State<Arc<Coordinator>>,
    Path(id): Path<String>,
    Json(location): Json<TrackerLocation>,
) -> Result<impl IntoResponse, ApiError> {
    coord.signal(
        &tracker_key(&id),
        ops::SET_CURRENT_LOCATION,
        json!(location),
    );
    Ok(StatusCode::ACCEPTED)
}

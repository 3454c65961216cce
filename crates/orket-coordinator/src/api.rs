// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface over the card store.
//!
//! JSON bodies are strict: unknown fields are rejected. Every success body
//! is the full [`Card`], so clients never assume absence of terminal
//! fields. Race rejections map to 403/404/409 as structured JSON — the
//! handlers never leak internal errors.

use crate::store::{Card, CoordinatorError, CoordinatorStore};
use axum::{
    extract::{Path as AxPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The card store behind all routes.
    pub store: Arc<CoordinatorStore>,
}

/// Body of `POST /cards/{id}/claim`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimRequest {
    /// Claiming worker.
    pub node_id: String,
    /// Lease length in seconds.
    pub lease_duration: f64,
}

/// Body of `POST /cards/{id}/renew`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewRequest {
    /// Renewing worker (must own the lease).
    pub node_id: String,
    /// New lease length in seconds.
    pub lease_duration: f64,
}

/// Body of `POST /cards/{id}/complete` and `POST /cards/{id}/fail`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteRequest {
    /// Reporting worker.
    pub node_id: String,
    /// Outcome payload; a default is committed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CardsQuery {
    state: Option<String>,
}

/// Structured API error.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to return.
    pub status: StatusCode,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// New error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let status = match err {
            CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::NotOwner(_) => StatusCode::FORBIDDEN,
            CoordinatorError::AlreadyClaimed(_) | CoordinatorError::LeaseLost(_) => {
                StatusCode::CONFLICT
            }
        };
        Self::new(status, err.to_string())
    }
}

/// Build the coordinator router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/cards", get(cmd_list_cards))
        .route("/cards/{id}/claim", post(cmd_claim))
        .route("/cards/{id}/renew", post(cmd_renew))
        .route("/cards/{id}/complete", post(cmd_complete))
        .route("/cards/{id}/fail", post(cmd_fail))
        .route("/admin/reset", post(cmd_reset))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_list_cards(
    Query(query): Query<CardsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Card>>, ApiError> {
    let wanted = query.state.unwrap_or_else(|| "open".to_string());
    if !wanted.eq_ignore_ascii_case("open") {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "only state=open is supported",
        ));
    }
    Ok(Json(state.store.list_open_cards()))
}

async fn cmd_claim(
    AxPath(id): AxPath<String>,
    State(state): State<AppState>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<Card>, ApiError> {
    let card = state.store.claim(&id, &req.node_id, req.lease_duration)?;
    info!(card_id = %id, node_id = %req.node_id, "card claimed");
    Ok(Json(card))
}

async fn cmd_renew(
    AxPath(id): AxPath<String>,
    State(state): State<AppState>,
    Json(req): Json<RenewRequest>,
) -> Result<Json<Card>, ApiError> {
    let card = state.store.renew(&id, &req.node_id, req.lease_duration)?;
    Ok(Json(card))
}

async fn cmd_complete(
    AxPath(id): AxPath<String>,
    State(state): State<AppState>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Card>, ApiError> {
    let card = state.store.complete(&id, &req.node_id, req.result)?;
    info!(card_id = %id, node_id = %req.node_id, "card completed");
    Ok(Json(card))
}

async fn cmd_fail(
    AxPath(id): AxPath<String>,
    State(state): State<AppState>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Card>, ApiError> {
    let card = state.store.fail(&id, &req.node_id, req.result)?;
    info!(card_id = %id, node_id = %req.node_id, "card failed");
    Ok(Json(card))
}

async fn cmd_reset(
    State(state): State<AppState>,
    Json(cards): Json<Vec<Card>>,
) -> impl IntoResponse {
    let count = cards.len();
    state.store.reset(cards);
    Json(json!({ "reset": count }))
}

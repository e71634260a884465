//! Liveness, readiness, and statistics.

use crate::error::{ApiError, ErrorKind};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /ready`: verifies the store answers.
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state
        .store
        .list()
        .map_err(|err| ApiError::new(ErrorKind::ServiceUnavailable, err.to_string()))?;
    Ok(Json(json!({"status": "ready"})))
}

/// `GET /stats`
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let resources = state.store.list()?.len();
    Ok(Json(json!({
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "resources": resources,
        "provenanceChains": state.provenance.chain_count(),
        "receipts": state.governance.payments().receipt_count(),
        "pendingInvoices": state.governance.payments().pending_invoices(),
        "pendingChallenges": state.identity.pending_challenges(),
        "requests": state.stats.requests.load(Ordering::Relaxed),
        "errors": state.stats.errors.load(Ordering::Relaxed),
    })))
}

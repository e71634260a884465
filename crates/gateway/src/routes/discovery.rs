//! Discovery and resource routes: well-known, root, catalog, prompts,
//! node fetch, and registration.

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use hyprcat_catalog::SearchParams;
use hyprcat_linkdata::default_context;
use hyprcat_linkdata::vocab::WELL_KNOWN_PATH;
use hyprcat_provenance::ActivityDraft;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

fn with_context(mut doc: Value) -> Value {
    if doc.get("@context").is_none() {
        doc["@context"] = default_context();
    }
    doc
}

fn serve_stored(state: &AppState, id: &str) -> Result<Json<Value>, ApiError> {
    let node = state
        .get_resource(id)?
        .ok_or_else(|| ApiError::not_found(format!("no resource {id}")))?;
    Ok(Json(with_context(node.to_value())))
}

/// `GET /.well-known/hyprcat`
pub async fn well_known(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let id = format!("{}{WELL_KNOWN_PATH}", state.config.base_url);
    serve_stored(&state, &id)
}

/// `GET /`
pub async fn root(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let id = format!("{}/", state.config.base_url);
    serve_stored(&state, &id)
}

/// `GET /prompts`
pub async fn prompts(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let id = format!("{}/prompts", state.config.base_url);
    serve_stored(&state, &id)
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    pub domain: Option<String>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

/// `GET /catalog`: the collection plus search and pagination.
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CatalogQuery>,
) -> Result<Json<Value>, ApiError> {
    let search = SearchParams {
        query: params.q,
        r#type: params.r#type,
        domain: params.domain,
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(0),
    };
    let doc = state.catalog.search(&search)?;
    Ok(Json(doc))
}

/// `GET /nodes/*path`: fetch a stored resource by its id path.
pub async fn node(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = state.node_id_for(path.trim_start_matches('/'));
    serve_stored(&state, &id)
}

/// `POST /nodes`: validated registration into the catalog.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let node = state.catalog.register(&body)?;
    let id = node.id.clone().unwrap_or_default();
    let activity = auth.did().and_then(|did| {
        state.attribute(
            did,
            "resource registration",
            node.to_value(),
            ActivityDraft::new("register resource", "hyprcat:RegisterAction")
                .method("POST")
                .target_url(id.as_str())
                .status_code(201),
        )
    });
    let mut response =
        (StatusCode::CREATED, Json(with_context(node.to_value()))).into_response();
    super::operations::provenance_header(&state, &mut response, activity.as_ref());
    Ok(response)
}

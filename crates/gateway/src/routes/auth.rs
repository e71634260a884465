//! Identity routes: challenge issue, signature verification, profile,
//! and the wallet snapshot.

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use hyprcat_linkdata::default_context;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

fn challenge_endpoint(state: &AppState) -> String {
    format!("{}/auth/challenge", state.config.base_url)
}

fn str_field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| body.get(*k).and_then(Value::as_str))
}

/// `POST /auth/challenge`: issue a single-use nonce.
pub async fn challenge(
    State(state): State<Arc<AppState>>,
    body: Option<Json<Value>>,
) -> Json<Value> {
    let domain = body
        .as_ref()
        .and_then(|Json(body)| str_field(body, &["domain", "hyprcat:domain"]))
        .map(str::to_string);
    let challenge = state.identity.issue_challenge(domain.as_deref());
    Json(json!({
        "@context": default_context(),
        "@type": "hyprcat:AuthChallenge",
        "nonce": challenge.nonce,
        "domain": challenge.domain,
        "issuedAt": challenge.issued_at,
        "expiresAt": challenge.expires_at,
        "hyprcat:verifyEndpoint": format!("{}/auth/verify", state.config.base_url),
    }))
}

/// `POST /auth/verify`: exchange a signed challenge for a session token.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let did = str_field(&body, &["did", "hyprcat:did"])
        .ok_or_else(|| ApiError::invalid("did is required"))?
        .to_string();
    let signature = str_field(&body, &["signature", "hyprcat:signature"])
        .ok_or_else(|| ApiError::invalid("signature is required"))?
        .to_string();
    let nonce = str_field(&body, &["nonce", "hyprcat:nonce"])
        .ok_or_else(|| ApiError::invalid("nonce is required"))?
        .to_string();
    if let Some(key) = str_field(&body, &["publicKey", "publicKeyMaterial"]) {
        state.identity.register_key(&did, key);
    }

    let token = state.identity.verify_challenge(&did, &signature, &nonce)?;
    state.wallets.create_if_absent(&did);
    info!(%did, "session issued");
    let doc = json!({
        "@context": default_context(),
        "@type": "hyprcat:Session",
        "token": token.token,
        "did": token.did,
        "scope": token.scope,
        "issuedAt": token.issued_at,
        "expiresAt": token.expires_at,
    });
    Ok((StatusCode::OK, Json(doc)).into_response())
}

/// `GET /auth/profile`: requires a verified session.
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    if !auth.is_authenticated() {
        return Err(ApiError::authentication_required(&challenge_endpoint(&state)));
    }
    let did = auth.did().expect("authenticated context has did").to_string();
    let wallet = state.wallets.create_if_absent(&did);
    Ok(Json(json!({
        "@context": default_context(),
        "@id": did,
        "@type": "hyprcat:Profile",
        "hyprcat:scope": auth.scope,
        "hyprcat:balance": wallet.balance(hyprcat_wallet::DEFAULT_CURRENCY),
        "hyprcat:tokenKinds": wallet.tokens.len(),
    })))
}

/// `GET /wallet`: wallet snapshot for any identified caller.
pub async fn wallet(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let did = auth
        .did()
        .ok_or_else(|| ApiError::authentication_required(&challenge_endpoint(&state)))?
        .to_string();
    let wallet = state.wallets.create_if_absent(&did);
    Ok(Json(json!({
        "@context": default_context(),
        "@id": did,
        "@type": "hyprcat:Wallet",
        "hyprcat:balances": wallet.balances,
        "hyprcat:tokens": wallet.tokens,
        "hyprcat:subscriptions": wallet.subscriptions,
    })))
}

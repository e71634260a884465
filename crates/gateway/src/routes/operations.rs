//! Operation routes: checkout, federated query, learning-record export,
//! and token mint/burn economics.

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use hyprcat_governance::{Constraint, Outcome, PaymentConstraint, Receipt, RequestContext};
use hyprcat_linkdata::{default_context, validate_input};
use hyprcat_provenance::{export_bundle, export_summary, ActivityDraft};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Price per token unit for minting.
pub const TOKEN_MINT_PRICE_SAT: u64 = 10;

/// Fraction of the mint price refunded on burn (denominator).
const BURN_REFUND_DIVISOR: u64 = 2;

/// Recipient identity for demo payments.
const DEMO_RECIPIENT: &str = "did:web:hyprmart.example";

fn u64_field(body: &Value, keys: &[&str]) -> Option<u64> {
    for key in keys {
        match body.get(key) {
            Some(Value::Number(n)) => return n.as_u64(),
            Some(Value::String(s)) => return s.trim().parse().ok(),
            _ => continue,
        }
    }
    None
}

fn str_field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| body.get(*k).and_then(Value::as_str))
}

fn request_context(auth: &AuthContext, action: &str, target: Option<String>) -> RequestContext {
    RequestContext {
        did: auth.did.clone(),
        action: Some(action.to_string()),
        target,
        payment_proof: auth.payment_proof.clone(),
    }
}

/// Stamp a response that recorded provenance: the activity id plus a link
/// to the provenance document for the caller.
pub(crate) fn provenance_header(
    state: &AppState,
    response: &mut Response,
    activity: Option<&String>,
) {
    let Some(activity) = activity else { return };
    if let Ok(value) = HeaderValue::from_str(activity) {
        response.headers_mut().insert("X-Provenance-Id", value);
    }
    let link = format!(
        "<{}/operations/lrs/export>; rel=\"http://www.w3.org/ns/prov#has_provenance\"",
        state.config.base_url
    );
    if let Ok(value) = HeaderValue::from_str(&link) {
        response.headers_mut().insert(axum::http::header::LINK, value);
    }
}

fn receipt_value(receipt: &Receipt) -> Value {
    serde_json::to_value(receipt).unwrap_or(Value::Null)
}

/// `POST /operations/checkout`: paid purchase through the 402 pipeline.
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let item = str_field(&body, &["schema:itemOffered", "itemOffered"]).map(str::to_string);
    // When the offered item resolves to a stored product, its buy
    // affordance's property shapes gate the payload.
    if let Some(item_id) = &item {
        if let Ok(Some(product)) = state.get_resource(item_id) {
            if let Some(op) = product.operations().into_iter().find(|op| op.method == "POST") {
                if !op.expects.is_empty() {
                    let report = validate_input(&body, &op.expects);
                    if !report.is_valid() {
                        return Err(ApiError::validation(report.error_paths()));
                    }
                }
            }
        }
    }
    let amount = u64_field(&body, &["schema:price", "price"])
        .ok_or_else(|| ApiError::invalid("schema:price is required"))?;
    if amount == 0 {
        return Err(ApiError::invalid("schema:price must be positive"));
    }
    let constraint = Constraint::Payment(PaymentConstraint {
        amount,
        currency: "SAT".to_string(),
        recipient: DEMO_RECIPIENT.to_string(),
    });
    let ctx = request_context(&auth, "schema:BuyAction", item.clone());
    match state.governance.evaluate(&constraint, &ctx)? {
        Outcome::PaymentRequired(invoice) => Err(ApiError::payment_required(&invoice)),
        Outcome::Granted { receipts } => {
            let receipt = receipts
                .first()
                .ok_or_else(|| ApiError::invalid("payment produced no receipt"))?;
            let order_id = format!("urn:uuid:{}", Uuid::new_v4());
            let order = json!({
                "@context": default_context(),
                "@id": order_id,
                "@type": "schema:Order",
                "schema:price": amount,
                "schema:priceCurrency": "SAT",
                "schema:orderedItem": item,
                "x402:paymentReceipt": receipt_value(receipt),
            });
            let activity = auth.did().and_then(|did| {
                state.attribute(
                    did,
                    "checkout",
                    order.clone(),
                    ActivityDraft::new("paid checkout", "schema:BuyAction")
                        .method("POST")
                        .target_url(item.as_deref().unwrap_or("checkout"))
                        .status_code(201)
                        .payload(body.clone()),
                )
            });
            info!(payer = ?auth.did, amount, "checkout settled");
            let mut response = (StatusCode::CREATED, Json(order)).into_response();
            provenance_header(&state, &mut response, activity.as_ref());
            Ok(response)
        }
    }
}

/// `POST /operations/query`: federated query over the simulated sources.
pub async fn query(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let text = str_field(&body, &["schema:query", "czero:query", "query"])
        .ok_or_else(|| ApiError::validation(vec!["schema:query".to_string()]))?;
    let result = state.federation.execute(text).await?;
    let did = auth.did().unwrap_or("did:web:anonymous").to_string();
    let activity = state.attribute(
        &did,
        "federated query",
        json!({"schema:query": text}),
        ActivityDraft::new("federated query", "hyprcat:QueryAction")
            .method("POST")
            .target_url(format!("{}/operations/query", state.config.base_url).as_str())
            .status_code(200)
            .payload(json!({"schema:query": text})),
    );
    let doc = json!({
        "@context": default_context(),
        "@type": "czero:ResultSet",
        "items": result.items,
        "totalResults": result.total_results,
        "queryLanguage": result.query_language,
        "executionTime": result.execution_time,
        "sources": result.sources,
        "wasGeneratedBy": activity,
    });
    let mut response = (StatusCode::OK, Json(doc)).into_response();
    provenance_header(&state, &mut response, activity.as_ref());
    Ok(response)
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// `GET /operations/lrs/export`: provenance chains for the caller.
pub async fn lrs_export(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ExportQuery>,
) -> Result<Json<Value>, ApiError> {
    let did = auth.did().ok_or_else(|| {
        ApiError::authentication_required(&format!("{}/auth/challenge", state.config.base_url))
    })?;
    let chains = state.provenance.history_of(did);
    let flat = params.format.as_deref() == Some("summary");
    let members: Vec<Value> = chains
        .iter()
        .map(|chain| {
            if flat {
                export_summary(chain)
            } else {
                export_bundle(chain)
            }
        })
        .collect();
    Ok(Json(json!({
        "@context": default_context(),
        "@id": format!("{}/operations/lrs/export", state.config.base_url),
        "@type": "hyprcat:LearningRecordExport",
        "prov:wasAttributedTo": did,
        "totalItems": members.len(),
        "member": members,
    })))
}

/// `POST /operations/token/mint`: paid token minting.
pub async fn token_mint(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let token_id = str_field(&body, &["hyprcat:tokenId", "tokenId"])
        .ok_or_else(|| ApiError::invalid("tokenId is required"))?
        .to_string();
    let count = u64_field(&body, &["hyprcat:amount", "amount"]).unwrap_or(1).max(1);
    let price = count * TOKEN_MINT_PRICE_SAT;
    let constraint = Constraint::Payment(PaymentConstraint {
        amount: price,
        currency: "SAT".to_string(),
        recipient: DEMO_RECIPIENT.to_string(),
    });
    let ctx = request_context(&auth, "hyprcat:MintAction", Some(token_id.clone()));
    match state.governance.evaluate(&constraint, &ctx)? {
        Outcome::PaymentRequired(invoice) => Err(ApiError::payment_required(&invoice)),
        Outcome::Granted { receipts } => {
            let did = auth
                .did()
                .ok_or_else(|| {
                    ApiError::authentication_required(&format!(
                        "{}/auth/challenge",
                        state.config.base_url
                    ))
                })?
                .to_string();
            let balance = state.wallets.add_tokens(&did, &token_id, count)?;
            let doc = json!({
                "@context": default_context(),
                "@type": "hyprcat:TokenMint",
                "hyprcat:tokenId": token_id,
                "hyprcat:amount": count,
                "hyprcat:balance": balance,
                "x402:paymentReceipt": receipts.first().map(receipt_value),
            });
            let activity = state.attribute(
                &did,
                "token mint",
                doc.clone(),
                ActivityDraft::new("token mint", "hyprcat:MintAction")
                    .method("POST")
                    .target_url(token_id.as_str())
                    .status_code(201),
            );
            let mut response = (StatusCode::CREATED, Json(doc)).into_response();
            provenance_header(&state, &mut response, activity.as_ref());
            Ok(response)
        }
    }
}

/// `DELETE /operations/token/burn`: burn tokens, refunding half the mint
/// price.
pub async fn token_burn(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let did = auth
        .did()
        .ok_or_else(|| {
            ApiError::authentication_required(&format!(
                "{}/auth/challenge",
                state.config.base_url
            ))
        })?
        .to_string();
    let token_id = str_field(&body, &["hyprcat:tokenId", "tokenId"])
        .ok_or_else(|| ApiError::invalid("tokenId is required"))?
        .to_string();
    let count = u64_field(&body, &["hyprcat:amount", "amount"]).unwrap_or(1).max(1);
    let remaining = state.wallets.burn_tokens(&did, &token_id, count)?;
    let refund = count * TOKEN_MINT_PRICE_SAT / BURN_REFUND_DIVISOR;
    let balance = state.wallets.credit(&did, "SAT", refund)?;
    let doc = json!({
        "@context": default_context(),
        "@type": "hyprcat:TokenBurn",
        "hyprcat:tokenId": token_id,
        "hyprcat:amount": count,
        "hyprcat:remaining": remaining,
        "hyprcat:refund": refund,
        "hyprcat:balance": balance,
    });
    let activity = state.attribute(
        &did,
        "token burn",
        doc.clone(),
        ActivityDraft::new("token burn", "hyprcat:BurnAction")
            .method("DELETE")
            .target_url(token_id.as_str())
            .status_code(200),
    );
    let mut response = (StatusCode::OK, Json(doc)).into_response();
    provenance_header(&state, &mut response, activity.as_ref());
    Ok(response)
}

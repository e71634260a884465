//! Request pipeline: content negotiation, identity resolution, rate
//! limiting, and response decoration, as explicit middleware functions.

use crate::error::{ApiError, ErrorKind};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use hyprcat_governance::PaymentProof;
use hyprcat_linkdata::vocab::{PROTOCOL_VERSION, WELL_KNOWN_PATH};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// How the request's identity was established.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthKind {
    /// Verified session token.
    Bearer,
    /// Challenge-response verified inline.
    DidAuth,
    /// `X-Agent-DID` header only; weakly attributed.
    Attributed,
    #[default]
    Anonymous,
}

/// Identity resolved for the request, stored as a request extension.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    pub did: Option<String>,
    pub scope: Option<String>,
    pub kind: AuthKind,
    /// Parsed `X-Payment-Proof`, when the header is present.
    pub payment_proof: Option<PaymentProof>,
}

impl AuthContext {
    /// DID when any identity is present.
    pub fn did(&self) -> Option<&str> {
        self.did.as_deref()
    }

    /// Strongly authenticated (token or challenge), not just attributed.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.kind, AuthKind::Bearer | AuthKind::DidAuth)
    }
}

/// Fixed-window rate limiter keyed by identity or client address.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, (u64, u32)>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `(allowed, remaining, reset_epoch_secs)`.
    pub fn check(&self, key: &str, window_secs: u64, max: u32) -> (bool, u32, u64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let window_start = now - (now % window_secs.max(1));
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        // Opportunistic prune of stale windows.
        windows.retain(|_, (start, _)| *start >= window_start.saturating_sub(window_secs));
        let entry = windows.entry(key.to_string()).or_insert((window_start, 0));
        if entry.0 != window_start {
            *entry = (window_start, 0);
        }
        let reset = window_start + window_secs;
        if entry.1 >= max {
            return (false, 0, reset);
        }
        entry.1 += 1;
        (true, max.saturating_sub(entry.1), reset)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

static ACCEPTABLE: &[&str] = &["application/ld+json", "application/json", "*/*"];

/// Content negotiation: JSON-LD, plain JSON, or a wildcard; anything else
/// is 406.
pub async fn negotiate(request: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(accept) = request.headers().get(header::ACCEPT) {
        let accept = accept.to_str().unwrap_or("");
        let acceptable = accept.split(',').any(|part| {
            let media = part.split(';').next().unwrap_or("").trim();
            ACCEPTABLE.contains(&media) || media == "application/*"
        });
        if !acceptable {
            return Err(ApiError::new(
                ErrorKind::NotAcceptable,
                format!("cannot produce {accept}"),
            ));
        }
    }
    Ok(next.run(request).await)
}

fn parse_did_auth(value: &str) -> Option<(String, String, String)> {
    let rest = value.strip_prefix("DID-Auth ")?;
    let mut did = None;
    let mut sig = None;
    let mut nonce = None;
    for part in rest.split(';') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("sig=") {
            sig = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("nonce=") {
            nonce = Some(v.to_string());
        } else if !part.is_empty() && did.is_none() {
            did = Some(part.to_string());
        }
    }
    Some((did?, sig?, nonce?))
}

/// Identity resolution, in precedence order: Bearer token, DID-Auth
/// challenge response, `X-Agent-DID` attribution.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut ctx = AuthContext::default();

    if let Some(authorization) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = authorization.strip_prefix("Bearer ") {
            match state.identity.verify_token(token.trim()) {
                Some(claims) => {
                    ctx.did = Some(claims.did);
                    ctx.scope = Some(claims.scope);
                    ctx.kind = AuthKind::Bearer;
                }
                None => {
                    return Err(ApiError::new(
                        ErrorKind::AuthenticationFailed,
                        "invalid or expired session token",
                    ));
                }
            }
        } else if authorization.starts_with("DID-Auth ") {
            let (did, sig, nonce) = parse_did_auth(authorization).ok_or_else(|| {
                ApiError::new(ErrorKind::AuthenticationFailed, "malformed DID-Auth header")
            })?;
            let token = state.identity.verify_challenge(&did, &sig, &nonce)?;
            state.wallets.create_if_absent(&did);
            ctx.did = Some(token.did);
            ctx.scope = Some(token.scope);
            ctx.kind = AuthKind::DidAuth;
        }
    }

    if ctx.did.is_none() {
        if let Some(did) = request
            .headers()
            .get("X-Agent-DID")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            ctx.did = Some(did.to_string());
            ctx.kind = AuthKind::Attributed;
        }
    }

    if let Some(proof) = request
        .headers()
        .get("X-Payment-Proof")
        .and_then(|v| v.to_str().ok())
    {
        let mut parsed = PaymentProof::parse(proof);
        if parsed.invoice_id.is_none() {
            parsed.invoice_id = request
                .headers()
                .get("X-Payment-Invoice")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
        }
        ctx.payment_proof = Some(parsed);
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Fixed-window rate limiting keyed by identity, falling back to the
/// forwarded client address.
pub async fn rate_limit(
    State((state, limiter)): State<(Arc<AppState>, Arc<RateLimiter>)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .extensions()
        .get::<AuthContext>()
        .and_then(|ctx| ctx.did.clone())
        .or_else(|| {
            request
                .headers()
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string());

    let window = state.config.rate_limit_window.as_secs();
    let max = state.config.rate_limit_max;
    let (allowed, remaining, reset) = limiter.check(&key, window, max);
    if !allowed {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        return Err(ApiError::rate_limited(reset.saturating_sub(now).max(1)));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&max.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
    Ok(response)
}

/// Response decoration: version tag, trace id, Link headers advertising
/// the catalog and service description, optional security headers, and
/// request accounting.
pub async fn decorate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let trace_id = request
        .headers()
        .get("X-Trace-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(request).await;
    state.stats.record(response.status().is_client_error() || response.status().is_server_error());
    let is_success = response.status().is_success();

    let base = &state.config.base_url;
    let link = format!(
        "<{base}{WELL_KNOWN_PATH}>; rel=\"service-desc\", <{base}/catalog>; rel=\"https://hyprcat.dev/ns/core#catalog\"",
    );
    let headers = response.headers_mut();
    headers.insert("X-HyprCAT-Version", HeaderValue::from_static(PROTOCOL_VERSION));
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        headers.insert("X-Trace-Id", value);
    }
    // Handlers may have set their own Link relations; merge, never clobber.
    let merged = match headers.get(header::LINK).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {link}"),
        None => link,
    };
    if let Ok(value) = HeaderValue::from_str(&merged) {
        headers.insert(header::LINK, value);
    }
    if is_success {
        let plain_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(true);
        if plain_json {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/ld+json"),
            );
        }
    }
    if state.config.enable_security_headers {
        headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
        headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
        headers.insert(
            "Referrer-Policy",
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
    }
    response
}

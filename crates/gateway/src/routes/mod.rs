//! Route assembly and the middleware stack.

pub mod auth;
pub mod discovery;
pub mod operations;
pub mod system;

use crate::middleware as mw;
use crate::middleware::RateLimiter;
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use hyprcat_linkdata::vocab::WELL_KNOWN_PATH;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the full gateway router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let limiter = Arc::new(RateLimiter::new());
    let mut router = Router::new()
        .route(WELL_KNOWN_PATH, get(discovery::well_known))
        .route("/", get(discovery::root))
        .route("/catalog", get(discovery::catalog))
        .route("/prompts", get(discovery::prompts))
        .route("/nodes", post(discovery::register))
        .route("/nodes/*path", get(discovery::node))
        .route("/operations/checkout", post(operations::checkout))
        .route("/operations/query", post(operations::query))
        .route("/operations/lrs/export", get(operations::lrs_export))
        .route("/operations/token/mint", post(operations::token_mint))
        .route("/operations/token/burn", delete(operations::token_burn))
        .route("/auth/challenge", post(auth::challenge))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/profile", get(auth::profile))
        .route("/wallet", get(auth::wallet))
        .route("/health", get(system::health))
        .route("/ready", get(system::ready))
        .route("/stats", get(system::stats))
        .layer(middleware::from_fn_with_state(
            (Arc::clone(&state), limiter),
            mw::rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            mw::authenticate,
        ))
        .layer(middleware::from_fn(mw::negotiate))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            mw::decorate,
        ))
        .layer(cors_layer(&state.config.cors_origins));
    if state.config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.enable_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router.with_state(state)
}

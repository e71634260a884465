//! Client navigator: fetches linked-data resources, executes affordances,
//! and translates governance responses into typed failures the agent
//! runtime can act on.

pub mod cache;
pub mod client;
pub mod events;
pub mod template;

pub use cache::ResponseCache;
pub use client::{Navigator, NavigatorConfig};
pub use events::ClientEvent;
pub use template::expand_template;

/// Typed fetch/execution failures.
///
/// Governance responses become first-class variants so the agent loop can
/// negotiate (auto-pay, token checks) instead of string-matching bodies.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// 402 with the invoice body issued by the server.
    #[error("payment required")]
    PaymentRequired { invoice: serde_json::Value },
    /// 403 carrying a token-gate document.
    #[error("token gate denied")]
    TokenGate { gate: serde_json::Value },
    /// 403 without a recognizable gate.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// 404.
    #[error("not found: {0}")]
    NotFound(String),
    /// 401 with an optional challenge endpoint pointer.
    #[error("authentication required")]
    AuthenticationRequired { challenge: Option<String> },
    /// 429 with the advertised retry delay.
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },
    /// Input failed the operation's property shapes.
    #[error("input validation failed: {0:?}")]
    Validation(Vec<String>),
    /// Unexpected HTTP status after retries.
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    /// Network-level failure after retries.
    #[error("transport error: {0}")]
    Transport(String),
    /// The navigator was cancelled mid-flight.
    #[error("cancelled")]
    Cancelled,
    /// Response body was not valid JSON.
    #[error("malformed response body")]
    MalformedBody,
}

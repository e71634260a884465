//! The JSON-LD error envelope and the mapping from subsystem errors.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyprcat_catalog::CatalogError;
use hyprcat_federation::FederationError;
use hyprcat_governance::{GovernanceError, Invoice};
use hyprcat_identity::IdentityError;
use hyprcat_linkdata::default_context;
use hyprcat_provenance::ProvError;
use hyprcat_storage::StorageError;
use hyprcat_wallet::WalletError;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

/// Error kinds, one per row of the protocol taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    AuthenticationRequired,
    AuthenticationFailed,
    PaymentRequired,
    AccessDenied,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    Conflict,
    ValidationError,
    RateLimited,
    InternalError,
    FederationError,
    ServiceUnavailable,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::AuthenticationRequired | Self::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::Conflict => StatusCode::CONFLICT,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::FederationError => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::AuthenticationRequired => "AuthenticationRequired",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::PaymentRequired => "PaymentRequired",
            Self::AccessDenied => "AccessDenied",
            Self::NotFound => "NotFound",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::NotAcceptable => "NotAcceptable",
            Self::Conflict => "Conflict",
            Self::ValidationError => "ValidationError",
            Self::RateLimited => "RateLimited",
            Self::InternalError => "InternalError",
            Self::FederationError => "FederationError",
            Self::ServiceUnavailable => "ServiceUnavailable",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::AuthenticationRequired => "Authentication Required",
            Self::AuthenticationFailed => "Authentication Failed",
            Self::PaymentRequired => "Payment Required",
            Self::AccessDenied => "Access Denied",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NotAcceptable => "Not Acceptable",
            Self::Conflict => "Conflict",
            Self::ValidationError => "Validation Error",
            Self::RateLimited => "Too Many Requests",
            Self::InternalError => "Internal Server Error",
            Self::FederationError => "Federation Error",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// An API error carrying the envelope fields plus kind-specific extras.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub detail: String,
    /// Request path the error occurred on.
    pub instance: Option<String>,
    /// Extra JSON-LD properties merged into the envelope (invoice fields,
    /// validation paths, retry hints).
    pub extra: Value,
    /// `Retry-After` seconds for 429 responses.
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            instance: None,
            extra: Value::Null,
            retry_after: None,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, what)
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, detail)
    }

    pub fn authentication_required(challenge_endpoint: &str) -> Self {
        let mut err = Self::new(
            ErrorKind::AuthenticationRequired,
            "authenticate via the challenge endpoint",
        );
        err.extra = json!({ "hyprcat:challengeEndpoint": challenge_endpoint });
        err
    }

    /// 402 carrying a freshly issued invoice.
    pub fn payment_required(invoice: &Invoice) -> Self {
        let mut err = Self::new(ErrorKind::PaymentRequired, "payment required");
        err.extra = json!({
            "x402:invoiceId": invoice.invoice_id,
            "x402:amount": invoice.amount,
            "x402:currency": invoice.currency,
            "x402:recipient": invoice.recipient,
            "x402:bolt11": invoice.bolt11,
            "x402:expiresAt": invoice.expires_at,
            "x402:paymentHeader": "X-Payment-Proof",
            "x402:invoiceHeader": "X-Payment-Invoice",
        });
        err
    }

    /// 422 listing the failing property paths.
    pub fn validation(paths: Vec<String>) -> Self {
        let mut err = Self::new(ErrorKind::ValidationError, "input failed validation");
        err.extra = json!({ "hyprcat:paths": paths });
        err
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut err = Self::new(ErrorKind::RateLimited, "rate limit exceeded");
        err.retry_after = Some(retry_after_secs);
        err
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// The JSON-LD envelope body.
    pub fn body(&self) -> Value {
        let mut body = json!({
            "@context": default_context(),
            "@id": format!("urn:uuid:{}", Uuid::new_v4()),
            "@type": "hyprcat:Error",
            "type": self.kind.name(),
            "statusCode": self.kind.status().as_u16(),
            "title": self.kind.title(),
            "detail": self.detail,
        });
        if let Some(instance) = &self.instance {
            body["instance"] = json!(instance);
        }
        if let Some(extra) = self.extra.as_object() {
            let obj = body.as_object_mut().expect("object literal");
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = if self.kind == ErrorKind::InternalError {
            // Detail stays server-side; the caller gets an opaque envelope.
            error!(detail = %self.detail, "internal error");
            let mut sanitized = ApiError::new(ErrorKind::InternalError, "internal error");
            sanitized.instance = self.instance.clone();
            sanitized.body()
        } else {
            self.body()
        };
        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/ld+json"),
        );
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::new(ErrorKind::InternalError, err.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Invalid(paths) => {
                let mut api = ApiError::invalid("resource failed validation");
                api.extra = json!({ "hyprcat:paths": paths });
                api
            }
            missing @ CatalogError::MissingCatalog => {
                ApiError::new(ErrorKind::InternalError, missing.to_string())
            }
            CatalogError::Storage(inner) => inner.into(),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        ApiError::new(ErrorKind::AuthenticationFailed, err.to_string())
    }
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        match &err {
            WalletError::InsufficientFunds { .. } => {
                ApiError::new(ErrorKind::PaymentRequired, err.to_string())
            }
            WalletError::InsufficientTokens { .. } => ApiError::invalid(err.to_string()),
            WalletError::Unknown(_) => ApiError::not_found(err.to_string()),
            WalletError::Storage(_) => ApiError::new(ErrorKind::InternalError, err.to_string()),
        }
    }
}

impl From<GovernanceError> for ApiError {
    fn from(err: GovernanceError) -> Self {
        match &err {
            GovernanceError::InvoiceUnknown(_)
            | GovernanceError::InvoiceExpired(_)
            | GovernanceError::AmountMismatch { .. }
            | GovernanceError::InvalidProof => ApiError::invalid(err.to_string()),
            GovernanceError::Wallet(inner) => match inner {
                WalletError::InsufficientFunds { .. } => {
                    ApiError::new(ErrorKind::PaymentRequired, err.to_string())
                }
                _ => ApiError::invalid(err.to_string()),
            },
            GovernanceError::GateDenied {
                token, required, ..
            } => {
                let mut api = ApiError::new(ErrorKind::AccessDenied, err.to_string());
                api.extra = json!({
                    "@type": "hyprcat:TokenGate",
                    "hyprcat:requiredToken": token,
                    "hyprcat:minBalance": required,
                });
                api
            }
            GovernanceError::PolicyDenied(_) => {
                ApiError::new(ErrorKind::AccessDenied, err.to_string())
            }
            GovernanceError::PayerRequired => {
                ApiError::new(ErrorKind::AuthenticationRequired, err.to_string())
            }
        }
    }
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        match &err {
            FederationError::Parse(_) => {
                let mut api = ApiError::new(ErrorKind::ValidationError, err.to_string());
                api.extra = json!({ "hyprcat:paths": ["schema:query"] });
                api
            }
            FederationError::SourceFailure { endpoint } => {
                let mut api = ApiError::new(ErrorKind::FederationError, err.to_string());
                api.extra = json!({ "hyprcat:failedSource": endpoint });
                api
            }
            FederationError::Timeout => {
                ApiError::new(ErrorKind::FederationError, err.to_string())
            }
        }
    }
}

impl From<ProvError> for ApiError {
    fn from(err: ProvError) -> Self {
        ApiError::new(ErrorKind::InternalError, err.to_string())
    }
}

//! The navigator itself: cached, retrying fetch plus operation execution.

use crate::cache::{parse_max_age, ResponseCache};
use crate::events::ClientEvent;
use crate::FetchError;
use hyprcat_linkdata::{validate_input, Node, Operation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Navigator configuration.
#[derive(Clone, Debug)]
pub struct NavigatorConfig {
    /// Weak attribution sent as `X-Agent-DID` on every request.
    pub agent_did: Option<String>,
    /// Session token sent as `Authorization: Bearer`.
    pub bearer_token: Option<String>,
    /// Transient-failure retries beyond the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Honor `Cache-Control: max-age` on GETs.
    pub cache_enabled: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            agent_did: None,
            bearer_token: None,
            max_retries: 3,
            backoff_base: Duration::from_millis(250),
            request_timeout: Duration::from_secs(30),
            cache_enabled: true,
        }
    }
}

/// Hypermedia client over reqwest.
pub struct Navigator {
    client: reqwest::Client,
    config: Mutex<NavigatorConfig>,
    cache: ResponseCache,
    history: Mutex<Vec<String>>,
    events: broadcast::Sender<ClientEvent>,
    cancelled: AtomicBool,
}

impl Navigator {
    pub fn new(config: NavigatorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client builds");
        let (events, _) = broadcast::channel(256);
        Self {
            client,
            config: Mutex::new(config),
            cache: ResponseCache::new(),
            history: Mutex::new(Vec::new()),
            events,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Subscribe to the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Attach a session token to subsequent requests.
    pub fn set_bearer_token(&self, token: Option<String>) {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).bearer_token = token;
    }

    /// Cancel in-flight retry loops; subsequent calls fail fast.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation.
    pub fn reset_cancellation(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// URLs visited so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// True when `url` was already fetched this run; used by agents to
    /// detect cycles and bound exploration.
    pub fn visited(&self, url: &str) -> bool {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|seen| seen == url)
    }

    fn record_visit(&self, url: &str) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(url.to_string());
        self.emit(ClientEvent::Navigation {
            url: url.to_string(),
        });
    }

    fn snapshot_config(&self) -> NavigatorConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn apply_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        config: &NavigatorConfig,
        extra: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        request = request.header("Accept", "application/ld+json, application/json");
        if let Some(did) = &config.agent_did {
            request = request.header("X-Agent-DID", did.clone());
        }
        if let Some(token) = &config.bearer_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        for (name, value) in extra {
            request = request.header(name.clone(), value.clone());
        }
        request
    }

    async fn translate_failure(&self, url: &str, response: reqwest::Response) -> FetchError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body: Value = response.json().await.unwrap_or(Value::Null);
        match status {
            401 => FetchError::AuthenticationRequired {
                challenge: body
                    .get("hyprcat:challengeEndpoint")
                    .or_else(|| body.get("challengeEndpoint"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            402 => {
                let amount = body
                    .get("x402:amount")
                    .or_else(|| body.get("amount"))
                    .and_then(Value::as_u64);
                self.emit(ClientEvent::PaymentRequired {
                    url: url.to_string(),
                    amount,
                });
                FetchError::PaymentRequired { invoice: body }
            }
            403 => {
                let has_gate = body
                    .get("hyprcat:requiredToken")
                    .or_else(|| body.get("requiredToken"))
                    .is_some()
                    || body
                        .get("@type")
                        .and_then(Value::as_str)
                        .map(|t| t.contains("TokenGate"))
                        .unwrap_or(false);
                if has_gate {
                    FetchError::TokenGate { gate: body }
                } else {
                    FetchError::AccessDenied(
                        body.get("detail")
                            .and_then(Value::as_str)
                            .unwrap_or("forbidden")
                            .to_string(),
                    )
                }
            }
            404 => FetchError::NotFound(url.to_string()),
            429 => FetchError::RateLimited {
                retry_after_secs: retry_after,
            },
            status => FetchError::Http {
                status,
                body: body.to_string(),
            },
        }
    }

    async fn send_with_retries(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
        extra: &HashMap<String, String>,
    ) -> Result<(u16, Value, Option<Duration>), FetchError> {
        let config = self.snapshot_config();
        let mut attempt = 0u32;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(FetchError::Cancelled);
            }
            self.emit(ClientEvent::Request {
                method: method.to_string(),
                url: url.to_string(),
            });
            let mut request = self.client.request(method.clone(), url);
            request = self.apply_headers(request, &config, extra);
            if let Some(body) = body {
                request = request.json(body);
            }
            let outcome = request.send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status();
                    self.emit(ClientEvent::Response {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                    if status.is_success() {
                        let max_age = response
                            .headers()
                            .get("Cache-Control")
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_max_age);
                        let value: Value =
                            response.json().await.map_err(|_| FetchError::MalformedBody)?;
                        return Ok((status.as_u16(), value, max_age));
                    }
                    // Transient server errors retry with backoff.
                    if status.is_server_error() && status.as_u16() != 502 && attempt < config.max_retries {
                        attempt += 1;
                        let delay = config.backoff_base * 2u32.saturating_pow(attempt - 1);
                        warn!(%url, status = status.as_u16(), attempt, "retrying after server error");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(self.translate_failure(url, response).await);
                }
                Err(err) if attempt < config.max_retries => {
                    attempt += 1;
                    let delay = config.backoff_base * 2u32.saturating_pow(attempt - 1);
                    warn!(%url, error = %err, attempt, "retrying after transport error");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(FetchError::Transport(err.to_string())),
            }
        }
    }

    /// Fetch a resource with the JSON-LD accept header, consulting the
    /// cache first.
    pub async fn fetch(&self, url: &str) -> Result<Node, FetchError> {
        self.fetch_with_headers(url, &HashMap::new()).await
    }

    /// Fetch with extra headers (payment proofs, invoice references).
    pub async fn fetch_with_headers(
        &self,
        url: &str,
        extra: &HashMap<String, String>,
    ) -> Result<Node, FetchError> {
        let cache_enabled = self.snapshot_config().cache_enabled && extra.is_empty();
        if cache_enabled {
            if let Some(cached) = self.cache.get(url) {
                debug!(%url, "cache hit");
                return Ok(Node::from_value(&cached));
            }
        }
        let (_, value, max_age) = self
            .send_with_retries(reqwest::Method::GET, url, None, extra)
            .await?;
        if cache_enabled {
            if let Some(max_age) = max_age {
                self.cache.put(url, value.clone(), max_age);
            }
        }
        self.record_visit(url);
        Ok(Node::from_value(&value))
    }

    /// Execute an affordance: validate input, resolve the target, send.
    ///
    /// Returns the response status alongside the decoded body so callers
    /// can attest exactly what happened.
    pub async fn execute_operation(
        &self,
        op: &Operation,
        input: Option<&Value>,
        extra: &HashMap<String, String>,
    ) -> Result<(u16, Value), FetchError> {
        if !op.expects.is_empty() {
            let payload = input.cloned().unwrap_or(Value::Object(Default::default()));
            let report = validate_input(&payload, &op.expects);
            if !report.is_valid() {
                return Err(FetchError::Validation(report.error_paths()));
            }
        }
        let url = op.target_or_default();
        if url.is_empty() {
            return Err(FetchError::NotFound("operation has no target".to_string()));
        }
        let method = reqwest::Method::from_bytes(op.method.as_bytes())
            .map_err(|_| FetchError::Transport(format!("bad method {}", op.method)))?;
        let body = if op.has_body() { input } else { None };
        let (status, value, _) = self.send_with_retries(method, &url, body, extra).await?;
        Ok((status, value))
    }

    /// Discover a mesh: fetch the well-known service description and follow
    /// its declared entry point, falling back to `base_url` itself.
    pub async fn discover(&self, base_url: &str) -> Result<Node, FetchError> {
        let well_known = format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            hyprcat_linkdata::vocab::WELL_KNOWN_PATH
        );
        match self.fetch(&well_known).await {
            Ok(description) => {
                let entry = description
                    .str_property("hydra:entrypoint")
                    .or_else(|| description.str_property("entrypoint"))
                    .map(str::to_string);
                match entry {
                    Some(entry) => self.fetch(&entry).await,
                    None => Ok(description),
                }
            }
            Err(FetchError::NotFound(_)) => self.fetch(base_url).await,
            Err(err) => Err(err),
        }
    }
}

//! Gateway configuration, collected once from the environment at startup
//! and passed explicitly thereafter. Tests inject alternate values through
//! the struct surface instead of globals.

use hyprcat_storage::Backend;
use rand::RngCore;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env_var(key).map(|v| v.parse::<T>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            warn!(%key, "unparseable value, using default");
            default
        }
        None => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_var(key).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        Some(_) => {
            warn!(%key, "unparseable boolean, using default");
            default
        }
        None => default,
    }
}

fn generated_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Gateway configuration record.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Public base URL seeded identifiers hang off.
    pub base_url: String,
    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,
    /// Fixed rate-limit window.
    pub rate_limit_window: Duration,
    /// Requests allowed per identity (or IP) per window.
    pub rate_limit_max: u32,
    pub enable_logging: bool,
    pub enable_security_headers: bool,
    pub enable_compression: bool,
    pub storage_backend: Backend,
    pub storage_dir: PathBuf,
    /// Session-token signing secret; generated when absent.
    pub jwt_secret: Vec<u8>,
    /// Invoice/bolt11 signing secret; generated when absent.
    pub payment_secret: Vec<u8>,
    /// Accept `sim:`-prefixed signatures (non-production environments).
    pub allow_simulated_signatures: bool,
}

impl Config {
    /// Collect configuration from environment variables with defaults.
    /// Unknown variables are ignored.
    pub fn from_env() -> Self {
        let host = env_var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = env_parse("PORT", 8402u16);
        let base_url = env_var("BASE_URL").unwrap_or_else(|| format!("http://{host}:{port}"));
        let cors_origins = env_var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            host,
            port,
            base_url,
            cors_origins,
            rate_limit_window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW", 60u64)),
            rate_limit_max: env_parse("RATE_LIMIT_MAX", 120u32),
            enable_logging: env_bool("ENABLE_LOGGING", true),
            enable_security_headers: env_bool("ENABLE_SECURITY_HEADERS", true),
            enable_compression: env_bool("ENABLE_COMPRESSION", false),
            storage_backend: Backend::parse(
                &env_var("STORAGE_BACKEND").unwrap_or_else(|| "memory".to_string()),
            ),
            storage_dir: PathBuf::from(env_var("STORAGE_DIR").unwrap_or_else(|| "data".to_string())),
            jwt_secret: env_var("JWT_SECRET")
                .map(String::into_bytes)
                .unwrap_or_else(generated_secret),
            payment_secret: env_var("PAYMENT_SECRET")
                .map(String::into_bytes)
                .unwrap_or_else(generated_secret),
            allow_simulated_signatures: env_var("HYPRCAT_ENV").as_deref() != Some("production"),
        }
    }

    /// In-memory configuration for tests.
    pub fn for_tests(base_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: base_url.into(),
            cors_origins: Vec::new(),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 10_000,
            enable_logging: false,
            enable_security_headers: true,
            enable_compression: false,
            storage_backend: Backend::Memory,
            storage_dir: PathBuf::from("data"),
            jwt_secret: b"test-jwt-secret".to_vec(),
            payment_secret: b"test-payment-secret".to_vec(),
            allow_simulated_signatures: true,
        }
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

//! In-memory response cache honoring `Cache-Control: max-age`.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    max_age: Duration,
}

/// GET-response cache keyed by URL.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Parse `max-age=N` out of a `Cache-Control` header value.
pub fn parse_max_age(header: &str) -> Option<Duration> {
    for directive in header.split(',') {
        let directive = directive.trim();
        if let Some(seconds) = directive.strip_prefix("max-age=") {
            if let Ok(seconds) = seconds.trim().parse::<u64>() {
                return Some(Duration::from_secs(seconds));
            }
        }
    }
    None
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh cached value for `url`, when one exists.
    pub fn get(&self, url: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(url) {
            Some(entry) if entry.stored_at.elapsed() < entry.max_age => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    /// Store a response under the server-declared lifetime.
    pub fn put(&self, url: &str, value: Value, max_age: Duration) {
        if max_age.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            url.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                max_age,
            },
        );
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

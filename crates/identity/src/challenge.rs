//! Auth challenges: single-use random nonces with a short lifetime.

use crate::now_millis;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Challenge lifetime.
pub const CHALLENGE_TTL_SECS: u64 = 300;

/// A pending auth challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    /// Random nonce, 256 bits base64url-encoded.
    pub nonce: String,
    /// Domain the response must be bound to.
    pub domain: String,
    /// Issue timestamp (unix millis).
    pub issued_at: u64,
    /// Expiry timestamp (unix millis).
    pub expires_at: u64,
}

impl Challenge {
    /// Generate a challenge with a fresh 256-bit nonce.
    pub fn generate(domain: &str) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let issued_at = now_millis();
        Self {
            nonce: URL_SAFE_NO_PAD.encode(bytes),
            domain: domain.to_string(),
            issued_at,
            expires_at: issued_at + CHALLENGE_TTL_SECS * 1_000,
        }
    }

    /// True when past expiry at `now` (unix millis).
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

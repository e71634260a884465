//! Identity and session layer.
//!
//! Challenge-response authentication: the server hands out a single-use
//! random nonce, the client returns a signature over `did:nonce:domain`, and
//! a successful verification mints a short-lived self-verifying session
//! token. Used nonces are deleted on success so replays fail.

pub mod challenge;
pub mod token;

pub use challenge::{Challenge, CHALLENGE_TTL_SECS};
pub use token::{SessionToken, TokenClaims, TOKEN_TTL_SECS};

use hmac::{Hmac, Mac};
use hyprcat_storage::JsonDir;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

/// Reserved prefix for simulation-mode signatures. Only honored when
/// `IdentityConfig::allow_simulated` is set (demo and test environments).
pub const SIMULATED_PREFIX: &str = "sim:";

/// Identity errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Nonce is unknown (never issued, already consumed, or swept).
    #[error("unknown or already used challenge nonce")]
    UnknownChallenge,
    /// Challenge exists but is past its expiry.
    #[error("challenge expired")]
    ChallengeExpired,
    /// Signature did not verify against the expected proof.
    #[error("signature verification failed")]
    SignatureMismatch,
    /// Simulated signature offered but simulation mode is disabled.
    #[error("simulated signatures are not accepted")]
    SimulationDisabled,
    /// No key material registered for the DID.
    #[error("no key material registered for {0}")]
    UnknownKey(String),
}

/// Process-scoped identity configuration. Tests inject alternate values
/// through this constructor surface instead of globals.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    /// Secret used to sign session tokens.
    pub token_secret: Vec<u8>,
    /// Domain bound into challenges.
    pub domain: String,
    /// Accept `sim:`-prefixed signatures (non-production only).
    pub allow_simulated: bool,
}

impl IdentityConfig {
    /// Config for demo and test environments.
    pub fn simulated(token_secret: impl Into<Vec<u8>>, domain: impl Into<String>) -> Self {
        Self {
            token_secret: token_secret.into(),
            domain: domain.into(),
            allow_simulated: true,
        }
    }
}

/// A registered identity: DID plus opaque key material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub did: String,
    /// Opaque bytes or multibase string supplied at registration.
    pub public_key_material: String,
    /// First-seen timestamp (unix millis).
    pub created_at: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Identity and session service.
pub struct IdentityService {
    config: IdentityConfig,
    challenges: Mutex<HashMap<String, Challenge>>,
    identities: Mutex<HashMap<String, Identity>>,
    sessions: Option<JsonDir>,
}

impl IdentityService {
    /// Create a service; `sessions` mirrors issued tokens for the file
    /// backend's `sessions/` category.
    pub fn new(config: IdentityConfig, sessions: Option<JsonDir>) -> Self {
        Self {
            config,
            challenges: Mutex::new(HashMap::new()),
            identities: Mutex::new(HashMap::new()),
            sessions,
        }
    }

    /// Issue a fresh challenge for `domain` (falls back to the configured
    /// domain) and record it in the pending set.
    pub fn issue_challenge(&self, domain: Option<&str>) -> Challenge {
        let challenge = Challenge::generate(domain.unwrap_or(&self.config.domain));
        let mut pending = self.challenges.lock().unwrap_or_else(|e| e.into_inner());
        // Opportunistic prune so the map cannot grow unbounded between sweeps.
        let now = now_millis();
        pending.retain(|_, c| c.expires_at > now);
        pending.insert(challenge.nonce.clone(), challenge.clone());
        debug!(domain = %challenge.domain, "issued auth challenge");
        challenge
    }

    /// Register (or refresh) key material for a DID.
    pub fn register_key(&self, did: &str, public_key_material: &str) {
        let mut identities = self.identities.lock().unwrap_or_else(|e| e.into_inner());
        identities.insert(
            did.to_string(),
            Identity {
                did: did.to_string(),
                public_key_material: public_key_material.to_string(),
                created_at: now_millis(),
            },
        );
    }

    /// Known identity record, when any.
    pub fn identity(&self, did: &str) -> Option<Identity> {
        let identities = self.identities.lock().unwrap_or_else(|e| e.into_inner());
        identities.get(did).cloned()
    }

    /// The proof a holder of `key_material` produces for a challenge:
    /// hex HMAC-SHA256 over `"{did}:{nonce}:{domain}"`.
    pub fn expected_signature(did: &str, nonce: &str, domain: &str, key_material: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(key_material.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(format!("{did}:{nonce}:{domain}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a challenge response and mint a session token.
    ///
    /// The nonce is consumed atomically (compare-and-delete) before the
    /// signature check, so a replayed triple fails with `UnknownChallenge`
    /// regardless of signature validity.
    pub fn verify_challenge(
        &self,
        did: &str,
        signature: &str,
        nonce: &str,
    ) -> Result<SessionToken, IdentityError> {
        let challenge = {
            let mut pending = self.challenges.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(nonce).ok_or(IdentityError::UnknownChallenge)?
        };
        if challenge.expires_at <= now_millis() {
            return Err(IdentityError::ChallengeExpired);
        }
        if let Some(rest) = signature.strip_prefix(SIMULATED_PREFIX) {
            if !self.config.allow_simulated {
                return Err(IdentityError::SimulationDisabled);
            }
            if rest.is_empty() {
                return Err(IdentityError::SignatureMismatch);
            }
        } else {
            let identity = self
                .identity(did)
                .ok_or_else(|| IdentityError::UnknownKey(did.to_string()))?;
            let expected = Self::expected_signature(
                did,
                nonce,
                &challenge.domain,
                &identity.public_key_material,
            );
            if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
                return Err(IdentityError::SignatureMismatch);
            }
        }
        info!(%did, "challenge verified, issuing session token");
        Ok(self.issue_token(did, "agent"))
    }

    /// Mint a signed session token for `did` with the given scope.
    pub fn issue_token(&self, did: &str, scope: &str) -> SessionToken {
        let token = SessionToken::issue(&self.config.token_secret, did, scope);
        if let Some(sessions) = &self.sessions {
            let doc = serde_json::json!({
                "did": token.did,
                "scope": token.scope,
                "issuedAt": token.issued_at,
                "_expiresAt": token.expires_at,
            });
            if let Err(err) = sessions.write(&token.token, &doc) {
                tracing::warn!(error = %err, "session persist failed");
            }
        }
        token
    }

    /// Verify a session token: recompute the tag (constant time) and
    /// enforce expiry. Returns the claims on success.
    pub fn verify_token(&self, token: &str) -> Option<TokenClaims> {
        SessionToken::verify(&self.config.token_secret, token)
    }

    /// Drop expired pending challenges; returns the count removed.
    pub fn sweep_expired(&self) -> usize {
        let mut pending = self.challenges.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_millis();
        let before = pending.len();
        pending.retain(|_, c| c.expires_at > now);
        before.saturating_sub(pending.len())
    }

    /// Number of pending challenges (stats surface).
    pub fn pending_challenges(&self) -> usize {
        self.challenges.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Byte-wise constant-time comparison.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> IdentityService {
        IdentityService::new(IdentityConfig::simulated(b"test-secret".to_vec(), "hyprcat.test"), None)
    }

    #[test]
    fn test_simulated_signature_accepted_in_dev_mode() {
        let svc = service();
        let challenge = svc.issue_challenge(None);
        let token = svc
            .verify_challenge("did:web:alice", "sim:placeholder", &challenge.nonce)
            .unwrap();
        assert_eq!(token.did, "did:web:alice");
        assert!(token.expires_at > token.issued_at);
    }

    #[test]
    fn test_simulated_signature_rejected_in_production() {
        let config = IdentityConfig {
            token_secret: b"s".to_vec(),
            domain: "hyprcat.test".to_string(),
            allow_simulated: false,
        };
        let svc = IdentityService::new(config, None);
        let challenge = svc.issue_challenge(None);
        let err = svc
            .verify_challenge("did:web:alice", "sim:placeholder", &challenge.nonce)
            .unwrap_err();
        assert!(matches!(err, IdentityError::SimulationDisabled));
    }

    #[test]
    fn test_nonce_replay_rejected() {
        let svc = service();
        let challenge = svc.issue_challenge(None);
        svc.verify_challenge("did:web:a", "sim:x", &challenge.nonce)
            .unwrap();
        let err = svc
            .verify_challenge("did:web:a", "sim:x", &challenge.nonce)
            .unwrap_err();
        assert!(matches!(err, IdentityError::UnknownChallenge));
    }

    #[test]
    fn test_keyed_signature_path() {
        let svc = service();
        svc.register_key("did:web:bob", "z6MkBobKey");
        let challenge = svc.issue_challenge(Some("hyprcat.test"));
        let sig = IdentityService::expected_signature(
            "did:web:bob",
            &challenge.nonce,
            "hyprcat.test",
            "z6MkBobKey",
        );
        assert!(svc.verify_challenge("did:web:bob", &sig, &challenge.nonce).is_ok());
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let svc = service();
        svc.register_key("did:web:bob", "z6MkBobKey");
        let challenge = svc.issue_challenge(None);
        let err = svc
            .verify_challenge("did:web:bob", &"0".repeat(64), &challenge.nonce)
            .unwrap_err();
        assert!(matches!(err, IdentityError::SignatureMismatch));
    }

    #[test]
    fn test_token_round_trip() {
        let svc = service();
        let token = svc.issue_token("did:web:a", "agent");
        let claims = svc.verify_token(&token.token).unwrap();
        assert_eq!(claims.did, "did:web:a");
        assert_eq!(claims.scope, "agent");
    }

    #[test]
    fn test_tampered_token_rejected() {
        let svc = service();
        let token = svc.issue_token("did:web:a", "agent");
        let mut tampered = token.token.clone();
        tampered.push('x');
        assert!(svc.verify_token(&tampered).is_none());
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let svc = service();
        let live = svc.issue_challenge(None);
        {
            let mut pending = svc.challenges.lock().unwrap();
            pending.insert(
                "stale".to_string(),
                Challenge {
                    nonce: "stale".to_string(),
                    domain: "d".to_string(),
                    issued_at: 0,
                    expires_at: 1,
                },
            );
        }
        assert_eq!(svc.sweep_expired(), 1);
        let mut pending = svc.challenges.lock().unwrap();
        assert!(pending.remove(&live.nonce).is_some());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}

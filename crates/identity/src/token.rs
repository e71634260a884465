//! Self-verifying session tokens: HMAC-signed claims, base64url on the wire.

use crate::{constant_time_eq, now_millis};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Session lifetime.
pub const TOKEN_TTL_SECS: u64 = 3_600;

/// Claims carried inside a session token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub did: String,
    pub scope: String,
    /// Issue timestamp (unix millis).
    pub issued_at: u64,
    /// Expiry timestamp (unix millis).
    pub expires_at: u64,
}

/// An issued session token plus its claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionToken {
    /// Wire form: `base64url(claims).base64url(tag)`.
    pub token: String,
    pub did: String,
    pub scope: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

fn tag(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

impl SessionToken {
    /// Sign fresh claims for `did`.
    pub fn issue(secret: &[u8], did: &str, scope: &str) -> Self {
        let issued_at = now_millis();
        let claims = TokenClaims {
            did: did.to_string(),
            scope: scope.to_string(),
            issued_at,
            expires_at: issued_at + TOKEN_TTL_SECS * 1_000,
        };
        let payload = serde_json::to_vec(&claims).expect("claims serialize");
        let encoded = URL_SAFE_NO_PAD.encode(&payload);
        let signature = URL_SAFE_NO_PAD.encode(tag(secret, encoded.as_bytes()));
        Self {
            token: format!("{encoded}.{signature}"),
            did: claims.did,
            scope: claims.scope,
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
        }
    }

    /// Verify a wire token: constant-time tag comparison, then expiry.
    pub fn verify(secret: &[u8], token: &str) -> Option<TokenClaims> {
        let (encoded, signature) = token.split_once('.')?;
        let presented = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let expected = tag(secret, encoded.as_bytes());
        if !constant_time_eq(&expected, &presented) {
            return None;
        }
        let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;
        if claims.expires_at <= now_millis() {
            return None;
        }
        Some(claims)
    }
}

//! PKCE and CSRF material for one login attempt (RFC 7636, S256 only).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::types::unix_now_secs;

/// Random bytes behind the code verifier; 32 bytes encodes to 43 chars,
/// inside the 43..=128 verifier bounds providers accept.
const VERIFIER_LEN: usize = 32;
/// Random bytes behind the CSRF state token (256-bit entropy).
const STATE_LEN: usize = 32;

/// Per-attempt PKCE material. Scoped to exactly one in-flight login and
/// never persisted.
#[derive(Debug, Clone)]
pub struct PkceSession {
    /// CSRF token binding the authorize request to the callback.
    pub state: String,
    /// Secret verifier, sent only during the final code exchange.
    pub code_verifier: String,
    /// base64url(SHA-256(verifier)), sent in the authorize request.
    pub code_challenge: String,
    pub created_at_unix: i64,
}

impl PkceSession {
    pub fn generate() -> Self {
        let code_verifier = generate_verifier();
        let code_challenge = challenge_for(&code_verifier);
        Self {
            state: generate_state(),
            code_verifier,
            code_challenge,
            created_at_unix: unix_now_secs(),
        }
    }
}

/// Random URL-safe code verifier.
pub(crate) fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge: base64url(SHA-256(verifier)), no padding.
pub(crate) fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Unguessable state token for CSRF binding.
pub(crate) fn generate_state() -> String {
    let mut bytes = [0u8; STATE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

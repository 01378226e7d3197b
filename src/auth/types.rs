//! Public auth model types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stored OAuth token pair. Immutable once created; replaced wholesale on
/// refresh or re-login and destroyed on logout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "createdAt")]
    pub created_at_unix: i64,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            created_at_unix: unix_now_secs(),
        }
    }

    /// Seconds since the pair was saved.
    pub fn age_secs(&self) -> i64 {
        unix_now_secs().saturating_sub(self.created_at_unix)
    }
}

/// Replacement tokens produced by a refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRefresh {
    pub access_token: String,
    pub refresh_token: String,
}

/// Account identity reported by the `/cli/getMe` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhoamiResponse {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "oAuthProfile")]
    pub oauth_profile: Option<WhoamiProfile>,
}

/// OAuth profile fragment carrying the role list used by the admin guard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhoamiProfile {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl WhoamiResponse {
    pub fn has_role(&self, role: &str) -> bool {
        self.oauth_profile
            .as_ref()
            .is_some_and(|profile| profile.roles.iter().any(|r| r == role))
    }
}

pub(crate) fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

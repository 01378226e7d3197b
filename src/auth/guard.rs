//! Authenticated-request guards for CLI commands.
//!
//! Commands that talk to the CodeSmooth API call [`require_user`] first;
//! admin-gated commands call [`require_admin`], which additionally checks
//! the role list reported by the remote whoami endpoint. Guard failures
//! carry user-facing messages and map to a non-zero process exit in main.

use super::error::AuthError;
use super::server::shared_http_client;
use super::store::TokenStore;
use super::types::{TokenPair, WhoamiResponse};
use crate::config::Config;

const ADMIN_ROLE: &str = "admin";

/// Require a usable saved session; returns the tokens for the request.
pub fn require_user(store: &TokenStore) -> Result<TokenPair, AuthError> {
    match store.get() {
        Some(pair) if !pair.access_token.is_empty() => Ok(pair),
        _ => Err(AuthError::NotAuthenticated),
    }
}

/// Fetch the logged-in account from the whoami endpoint.
pub async fn fetch_whoami(
    config: &Config,
    store: &TokenStore,
) -> Result<WhoamiResponse, AuthError> {
    let tokens = require_user(store)?;
    let response = shared_http_client()
        .get(config.whoami_url())
        .bearer_auth(&tokens.access_token)
        .send()
        .await?;

    match response.status().as_u16() {
        401 => Err(AuthError::NotAuthenticated),
        403 => Err(AuthError::NotAuthorized),
        status if !(200..300).contains(&status) => {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::Invalid(format!(
                "whoami request failed with status {status}: {body}"
            )))
        }
        _ => response
            .json()
            .await
            .map_err(|err| AuthError::Invalid(format!("malformed whoami response: {err}"))),
    }
}

/// Require a saved session whose remote profile carries the admin role.
pub async fn require_admin(config: &Config, store: &TokenStore) -> Result<(), AuthError> {
    let user = fetch_whoami(config, store).await?;
    if user.has_role(ADMIN_ROLE) {
        Ok(())
    } else {
        Err(AuthError::NotAuthorized)
    }
}

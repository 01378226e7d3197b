//! Login orchestration: PKCE material, callback listener, browser hand-off.

use url::Url;

use super::browser::try_open_browser;
use super::error::AuthError;
use super::pkce::PkceSession;
use super::server::CallbackServer;
use super::store::TokenStore;
use super::types::TokenPair;
use crate::config::Config;

/// Run one complete browser login and return the saved tokens.
///
/// Resolves or rejects exactly once, delegating the terminal state to the
/// callback server. When no browser can be opened the authorize URL is
/// printed for manual use.
pub async fn run_login(config: &Config, store: TokenStore) -> Result<TokenPair, AuthError> {
    run_login_with_browser(config, store, try_open_browser).await
}

/// [`run_login`] with an injectable browser opener.
pub async fn run_login_with_browser<F>(
    config: &Config,
    store: TokenStore,
    open_browser: F,
) -> Result<TokenPair, AuthError>
where
    F: FnOnce(&str) -> bool,
{
    let session = PkceSession::generate();
    let server = CallbackServer::bind(config, &session, store).await?;
    let authorize_url = build_authorize_url(config, &session, &server.redirect_uri())?;

    tracing::debug!(port = server.port(), "opening browser to authenticate");
    if open_browser(&authorize_url) {
        eprintln!("Opening browser to authenticate...");
    } else {
        eprintln!("Open this URL in your browser to log in:\n  {authorize_url}");
    }

    server.serve().await
}

/// Provider authorize URL carrying the PKCE challenge and CSRF state.
pub(crate) fn build_authorize_url(
    config: &Config,
    session: &PkceSession,
    redirect_uri: &str,
) -> Result<String, AuthError> {
    let mut url = Url::parse(&config.authorize_url())
        .map_err(|err| AuthError::Invalid(format!("invalid provider URL: {err}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("state", &session.state)
        .append_pair("code_challenge", &session.code_challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("scope", &config.scope);
    Ok(url.into())
}

//! One-shot local HTTP listener that completes the login exchange.
//!
//! The server binds the fixed callback port, waits for a single
//! `GET /callback?state=..&code=..` redirect, validates the CSRF state,
//! exchanges the authorization code at the provider token endpoint, saves
//! the resulting tokens, and redirects the browser to the success page.
//! The listener is shut down on every exit path, including exchange
//! failures and the redirect-wait timeout.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

use super::error::AuthError;
use super::pkce::PkceSession;
use super::store::TokenStore;
use super::types::TokenPair;
use crate::config::Config;

const CALLBACK_PATH: &str = "/callback";
/// Shared HTTP timeout for provider requests.
const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period for the in-flight callback response to flush before the
/// listener task is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Ephemeral single-request callback listener.
///
/// Lifecycle: `bind` (Listening) → browser redirect arrives → state check →
/// code exchange → tokens saved → `serve` resolves. At most one callback is
/// handled per login attempt.
pub struct CallbackServer {
    listener: tokio::net::TcpListener,
    port: u16,
    shared: Arc<ServerShared>,
    result_rx: oneshot::Receiver<Result<TokenPair, AuthError>>,
    timeout: Duration,
}

/// State visible to the request handler.
struct ServerShared {
    client_id: String,
    token_url: String,
    redirect_uri: String,
    success_url: String,
    expected_state: String,
    code_verifier: String,
    store: TokenStore,
    result_tx: Mutex<Option<oneshot::Sender<Result<TokenPair, AuthError>>>>,
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CallbackServer {
    /// Bind the callback port and prepare the one-shot handler.
    ///
    /// A port already held by another process is fatal
    /// ([`AuthError::PortInUse`]); a single interactive login attempt does
    /// not negotiate alternates.
    pub async fn bind(
        config: &Config,
        session: &PkceSession,
        store: TokenStore,
    ) -> Result<Self, AuthError> {
        let requested = config.callback_port;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", requested))
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AddrInUse => AuthError::PortInUse(requested),
                _ => AuthError::Io(err),
            })?;
        // Port 0 resolves to an ephemeral port; report the real one.
        let port = listener.local_addr()?.port();

        let (result_tx, result_rx) = oneshot::channel();
        let shared = Arc::new(ServerShared {
            client_id: config.client_id.clone(),
            token_url: config.token_url(),
            redirect_uri: format!("http://localhost:{port}{CALLBACK_PATH}"),
            success_url: config.success_url.clone(),
            expected_state: session.state.clone(),
            code_verifier: session.code_verifier.clone(),
            store,
            result_tx: Mutex::new(Some(result_tx)),
        });

        tracing::debug!(port, "callback listener bound");
        Ok(Self {
            listener,
            port,
            shared,
            result_rx,
            timeout: Duration::from_secs(config.login_timeout_secs),
        })
    }

    /// Actual bound port (differs from the configured one only in tests
    /// that request port 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI the provider must send the browser back to.
    pub fn redirect_uri(&self) -> String {
        self.shared.redirect_uri.clone()
    }

    /// Run until one callback reaches a terminal state or the wait times
    /// out. The listening socket is closed before this returns.
    pub async fn serve(self) -> Result<TokenPair, AuthError> {
        let Self {
            listener,
            shared,
            result_rx,
            timeout,
            ..
        } = self;

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(shared);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let mut server_task = tokio::spawn(async move { server.await });

        let outcome = tokio::select! {
            received = result_rx => match received {
                Ok(result) => result,
                Err(_) => Err(AuthError::Invalid(
                    "callback handler dropped without a result".to_string(),
                )),
            },
            _ = tokio::time::sleep(timeout) => Err(AuthError::LoginTimedOut(timeout.as_secs())),
        };

        // Close the listener on every exit path. Graceful shutdown lets the
        // in-flight browser response flush; a stuck connection is cut off.
        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server_task)
            .await
            .is_err()
        {
            server_task.abort();
        }

        outcome
    }
}

/// Query parameters the provider may send to the callback.
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn handle_callback(
    State(shared): State<Arc<ServerShared>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(result_tx) = shared.result_tx.lock().await.take() else {
        // The one allowed callback was already consumed.
        return (StatusCode::BAD_REQUEST, "Login already completed").into_response();
    };

    // CSRF check comes first; nothing provider-supplied is trusted before it.
    let state_matches = query
        .state
        .as_deref()
        .is_some_and(|received| constant_time_eq(received, &shared.expected_state));
    if !state_matches {
        tracing::warn!("callback state mismatch; rejecting login attempt");
        let _ = result_tx.send(Err(AuthError::StateMismatch));
        return (StatusCode::BAD_REQUEST, "State mismatch").into_response();
    }

    if let Some(error) = query.error.as_deref() {
        let description = query.error_description.as_deref().unwrap_or("");
        let _ = result_tx.send(Err(AuthError::TokenExchangeFailed(format!(
            "provider returned `{error}`: {description}"
        ))));
        return (StatusCode::BAD_REQUEST, "Login failed").into_response();
    }

    let Some(code) = query.code.as_deref() else {
        let _ = result_tx.send(Err(AuthError::Invalid(
            "callback is missing the `code` parameter".to_string(),
        )));
        return (StatusCode::BAD_REQUEST, "Missing authorization code").into_response();
    };

    match exchange_code(&shared, code).await {
        Ok((access_token, refresh_token)) => {
            match shared.store.save(&access_token, &refresh_token) {
                Ok(pair) => {
                    tracing::info!("login complete; tokens saved");
                    let _ = result_tx.send(Ok(pair));
                    (
                        StatusCode::FOUND,
                        [(header::LOCATION, shared.success_url.clone())],
                        (),
                    )
                        .into_response()
                }
                Err(err) => {
                    let _ = result_tx.send(Err(err));
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to save credentials",
                    )
                        .into_response()
                }
            }
        }
        Err(err) => {
            tracing::warn!(%err, "authorization code exchange failed");
            let _ = result_tx.send(Err(err));
            (StatusCode::BAD_GATEWAY, "Token exchange failed").into_response()
        }
    }
}

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// POST the authorization code and PKCE verifier to the token endpoint.
async fn exchange_code(
    shared: &ServerShared,
    code: &str,
) -> Result<(String, String), AuthError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("client_id", shared.client_id.as_str()),
        ("code", code),
        ("code_verifier", shared.code_verifier.as_str()),
        ("redirect_uri", shared.redirect_uri.as_str()),
    ];

    let response = shared_http_client()
        .post(&shared.token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&form)
        .send()
        .await
        .map_err(|err| AuthError::TokenExchangeFailed(err.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::TokenExchangeFailed(format!(
            "status {status}: {body}"
        )));
    }

    let payload: TokenEndpointResponse = response
        .json()
        .await
        .map_err(|err| AuthError::TokenExchangeFailed(format!("malformed response: {err}")))?;

    let access_token = payload.access_token.unwrap_or_default().trim().to_string();
    if access_token.is_empty() {
        return Err(AuthError::TokenExchangeFailed(
            "response did not include access_token".to_string(),
        ));
    }
    let refresh_token = payload.refresh_token.unwrap_or_default().trim().to_string();
    if refresh_token.is_empty() {
        return Err(AuthError::TokenExchangeFailed(
            "response did not include refresh_token".to_string(),
        ));
    }
    Ok((access_token, refresh_token))
}

/// Compare strings without leaking the mismatch position through timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Lazily initialized shared HTTP client for provider requests.
pub(crate) fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(PROVIDER_HTTP_TIMEOUT)
            .user_agent(concat!("codesmooth/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::secret::MemoryBackend;
    use crate::testsupport::TestTempDir;

    fn test_config(port: u16, timeout_secs: u64) -> Config {
        Config {
            callback_port: port,
            login_timeout_secs: timeout_secs,
            ..Config::default()
        }
    }

    fn test_store(dir: &TestTempDir) -> TokenStore {
        TokenStore::with_service(
            dir.child("codesmooth.json"),
            Arc::new(MemoryBackend::new()),
            "codesmooth-test",
        )
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("abc123", "abc12"));
        assert!(!constant_time_eq("", "x"));
        assert!(constant_time_eq("", ""));
    }

    #[tokio::test]
    async fn bind_reports_port_in_use() {
        // Hold a port open, then ask the server to bind the same one.
        let occupied = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let dir = TestTempDir::new("server");
        let session = PkceSession::generate();
        let err = CallbackServer::bind(&test_config(port, 60), &session, test_store(&dir))
            .await
            .expect_err("bind must fail on an occupied port");
        assert!(matches!(err, AuthError::PortInUse(p) if p == port), "got: {err}");
    }

    #[tokio::test]
    async fn state_mismatch_rejects_with_400_and_saves_nothing() {
        let dir = TestTempDir::new("server");
        let store = test_store(&dir);
        let session = PkceSession::generate();
        let server = CallbackServer::bind(&test_config(0, 60), &session, store.clone())
            .await
            .unwrap();
        let port = server.port();
        let serve_task = tokio::spawn(server.serve());

        let response = reqwest::get(format!(
            "http://127.0.0.1:{port}/callback?state=forged&code=abc123"
        ))
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        assert_eq!(response.text().await.unwrap(), "State mismatch");

        let err = serve_task.await.unwrap().expect_err("login must reject");
        assert!(matches!(err, AuthError::StateMismatch), "got: {err}");
        // The flow never reached TokenStore::save.
        assert!(store.get().is_none());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn missing_code_rejects_without_exchange() {
        let dir = TestTempDir::new("server");
        let session = PkceSession::generate();
        let server = CallbackServer::bind(&test_config(0, 60), &session, test_store(&dir))
            .await
            .unwrap();
        let port = server.port();
        let serve_task = tokio::spawn(server.serve());

        let response = reqwest::get(format!(
            "http://127.0.0.1:{port}/callback?state={}",
            session.state
        ))
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        let err = serve_task.await.unwrap().expect_err("login must reject");
        assert!(matches!(err, AuthError::Invalid(_)), "got: {err}");
    }

    #[tokio::test]
    async fn provider_error_parameter_fails_the_exchange() {
        let dir = TestTempDir::new("server");
        let session = PkceSession::generate();
        let server = CallbackServer::bind(&test_config(0, 60), &session, test_store(&dir))
            .await
            .unwrap();
        let port = server.port();
        let serve_task = tokio::spawn(server.serve());

        let response = reqwest::get(format!(
            "http://127.0.0.1:{port}/callback?state={}&error=access_denied&error_description=user+cancelled",
            session.state
        ))
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        let err = serve_task.await.unwrap().expect_err("login must reject");
        match err {
            AuthError::TokenExchangeFailed(msg) => {
                assert!(msg.contains("access_denied"), "got: {msg}")
            }
            other => panic!("expected TokenExchangeFailed, got: {other}"),
        }
    }

    #[tokio::test]
    async fn redirect_wait_times_out() {
        let dir = TestTempDir::new("server");
        let session = PkceSession::generate();
        let server = CallbackServer::bind(&test_config(0, 1), &session, test_store(&dir))
            .await
            .unwrap();
        let port = server.port();

        let err = server.serve().await.expect_err("must time out");
        assert!(matches!(err, AuthError::LoginTimedOut(1)), "got: {err}");

        // The listener is released after the timeout path.
        tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("port must be free again");
    }
}

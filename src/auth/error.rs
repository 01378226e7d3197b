//! Auth subsystem error definitions.

use std::fmt;

/// Errors surfaced by the login/auth subsystem.
#[derive(Debug)]
pub enum AuthError {
    Io(std::io::Error),
    Http(reqwest::Error),
    /// OS secret-store access failed for a reason other than a missing entry.
    Secret(String),
    /// Malformed envelope, response, or other unusable data.
    Invalid(String),
    /// Auth-tag verification or key/envelope mismatch during decryption.
    DecryptionFailed,
    /// Callback `state` did not match the in-flight login session (CSRF).
    StateMismatch,
    /// The provider token endpoint rejected or failed the code exchange.
    TokenExchangeFailed(String),
    /// The fixed local callback port is already bound by another process.
    PortInUse(u16),
    /// The browser redirect never arrived within the configured window.
    LoginTimedOut(u64),
    NotAuthenticated,
    NotAuthorized,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Http(err) => write!(f, "http: {err}"),
            Self::Secret(msg) => write!(f, "secret store: {msg}"),
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::DecryptionFailed => {
                write!(f, "failed to decrypt saved credentials; run `codesmooth login` again")
            }
            Self::StateMismatch => write!(f, "state mismatch in login callback"),
            Self::TokenExchangeFailed(msg) => write!(f, "token exchange failed: {msg}"),
            Self::PortInUse(port) => {
                write!(f, "callback port {port} is already in use; close the other process and retry")
            }
            Self::LoginTimedOut(secs) => {
                write!(f, "login timed out after {secs} seconds waiting for the browser")
            }
            Self::NotAuthenticated => {
                write!(f, "not logged in; run `codesmooth login` first")
            }
            Self::NotAuthorized => write!(f, "admin access required"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<std::io::Error> for AuthError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

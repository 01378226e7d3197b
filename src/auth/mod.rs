//! Browser login and secure token storage.
//!
//! This module implements the PKCE authorization-code flow against the
//! CodeSmooth identity provider, the one-shot local callback server that
//! completes it, and encrypted credential persistence under
//! `~/.config/codesmooth-cli/codesmooth.json`.

mod browser;
mod crypto;
mod error;
mod flow;
mod guard;
mod pkce;
mod secret;
mod server;
mod store;
mod types;

pub use browser::try_open_browser;
pub use crypto::{CryptoBox, EncryptedEnvelope};
pub use error::AuthError;
pub use flow::{run_login, run_login_with_browser};
pub use guard::{fetch_whoami, require_admin, require_user};
pub use pkce::PkceSession;
pub use secret::{KeyringBackend, MemoryBackend, SecretBackend};
pub use server::CallbackServer;
pub use store::TokenStore;
pub use types::{TokenPair, TokenRefresh, WhoamiProfile, WhoamiResponse};

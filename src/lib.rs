//! CodeSmooth CLI — browser login and encrypted credential storage.
//!
//! This crate implements the authentication core of the CodeSmooth
//! command-line tool: an OAuth2 Authorization Code + PKCE login flow that
//! opens the system browser, receives the provider redirect on a local
//! callback listener, exchanges the code for tokens, and persists them
//! encrypted under the user's config directory. Later commands read the
//! stored tokens through [`auth::TokenStore`] and gate themselves with
//! [`auth::require_user`] / [`auth::require_admin`].
//!
//! # Quick start
//!
//! ```no_run
//! use codesmooth::auth::{KeyringBackend, TokenStore, run_login};
//! use codesmooth::config::load_config;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let store = TokenStore::new(
//!     config.token_file_path().unwrap(),
//!     Arc::new(KeyringBackend),
//! );
//! let tokens = run_login(&config, store).await.unwrap();
//! println!("logged in at {}", tokens.created_at_unix);
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
#[cfg(test)]
pub mod testsupport;

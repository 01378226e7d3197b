//! CLI entry point for codesmooth.

mod cli;

use clap::Parser;
use codesmooth::auth::{
    fetch_whoami, run_login_with_browser, try_open_browser, KeyringBackend, TokenStore,
};
use codesmooth::config::{load_config, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let args = cli::Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    let Some(token_path) = config.token_file_path() else {
        eprintln!("error: unable to resolve a config directory for token storage");
        std::process::exit(1);
    };
    let store = TokenStore::new(token_path, Arc::new(KeyringBackend));

    let result = match args.command {
        cli::Command::Login => login(&config, store, args.no_browser).await,
        cli::Command::Logout => logout(&store),
        cli::Command::Status => status(&store),
        cli::Command::Whoami => whoami(&config, &store).await,
    };
    if let Err(message) = result {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("CODESMOOTH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn login(config: &Config, store: TokenStore, no_browser: bool) -> Result<(), String> {
    let opener: fn(&str) -> bool = if no_browser { |_| false } else { try_open_browser };
    run_login_with_browser(config, store, opener)
        .await
        .map_err(|err| format!("login failed: {err}"))?;
    eprintln!("Successfully logged in. You can close the browser window.");
    Ok(())
}

fn logout(store: &TokenStore) -> Result<(), String> {
    store
        .clear()
        .map_err(|err| format!("logout failed: {err}"))?;
    eprintln!("Logged out.");
    Ok(())
}

fn status(store: &TokenStore) -> Result<(), String> {
    match store.get() {
        Some(tokens) => {
            let minutes = tokens.age_secs() / 60;
            eprintln!("Logged in (session saved {minutes} minutes ago).");
            Ok(())
        }
        None => Err("Not logged in. Run `codesmooth login` to authenticate.".to_string()),
    }
}

async fn whoami(config: &Config, store: &TokenStore) -> Result<(), String> {
    let user = fetch_whoami(config, store)
        .await
        .map_err(|err| err.to_string())?;

    match (&user.name, &user.email) {
        (Some(name), Some(email)) => eprintln!("{name} <{email}>"),
        (None, Some(email)) => eprintln!("{email}"),
        (Some(name), None) => eprintln!("{name}"),
        (None, None) => eprintln!("Logged in, but the API returned no profile details."),
    }
    if let Some(profile) = &user.oauth_profile {
        if !profile.roles.is_empty() {
            eprintln!("roles: {}", profile.roles.join(", "));
        }
    }
    Ok(())
}

//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`CODESMOOTH_CLIENT_ID`, `CODESMOOTH_PROVIDER_URL`,
//!    `CODESMOOTH_APP_URL`, `CODESMOOTH_CALLBACK_PORT`, `CODESMOOTH_SUCCESS_URL`)
//! 2. TOML file specified via --config CLI flag
//! 3. $XDG_CONFIG_HOME/codesmooth-cli/codesmooth.toml
//!    (or ~/.config/codesmooth-cli/codesmooth.toml)
//! 4. Built-in defaults
//!
//! Every endpoint is configurable so the login flow can be pointed at a
//! local provider during development and tests.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Fixed service name used for the config directory and the OS secret-store
/// entry that holds the data-encryption key.
pub const SERVICE_NAME: &str = "codesmooth-cli";

/// File holding the encrypted token envelope inside the config directory.
const TOKEN_FILE_NAME: &str = "codesmooth.json";
/// Optional user configuration file inside the config directory.
const CONFIG_FILE_NAME: &str = "codesmooth.toml";

const DEFAULT_CLIENT_ID: &str = "da2b1a1e-2887-4731-af07-551abb5d3831";
const DEFAULT_PROVIDER_BASE_URL: &str = "https://codesmooth.fusionauth.io";
const DEFAULT_APP_BASE_URL: &str = "https://app.codesmooth.dev";
const DEFAULT_SUCCESS_URL: &str = "https://app.codesmooth.dev/auth/cli/success";
const DEFAULT_CALLBACK_PORT: u16 = 45110;
const DEFAULT_SCOPE: &str = "openid profile email offline_access";
/// How long the callback listener waits for the browser redirect.
const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 300;

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth public client id registered for this CLI.
    pub client_id: String,
    /// Identity provider base URL (`/oauth2/authorize`, `/oauth2/token`).
    pub provider_base_url: String,
    /// Application API base URL (`/cli/getMe`).
    pub app_base_url: String,
    /// External page the browser is redirected to after a successful login.
    pub success_url: String,
    /// Fixed local port for the one-shot callback listener.
    pub callback_port: u16,
    /// Space-separated OAuth scopes requested at authorize time.
    pub scope: String,
    /// Seconds to wait for the browser redirect before giving up.
    pub login_timeout_secs: u64,
}

impl Config {
    /// Provider authorize endpoint.
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth2/authorize", self.provider_base_url)
    }

    /// Provider token-exchange endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.provider_base_url)
    }

    /// Whoami/role endpoint used by the admin guard.
    pub fn whoami_url(&self) -> String {
        format!("{}/cli/getMe", self.app_base_url)
    }

    /// Path of the encrypted token file, when a config root is resolvable.
    pub fn token_file_path(&self) -> Option<PathBuf> {
        config_dir().map(|dir| dir.join(TOKEN_FILE_NAME))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            provider_base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            app_base_url: DEFAULT_APP_BASE_URL.to_string(),
            success_url: DEFAULT_SUCCESS_URL.to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            scope: DEFAULT_SCOPE.to_string(),
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
        }
    }
}

/// On-disk configuration shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    client_id: Option<String>,
    provider_base_url: Option<String>,
    app_base_url: Option<String>,
    success_url: Option<String>,
    callback_port: Option<u16>,
    scope: Option<String>,
    login_timeout_secs: Option<u64>,
}

/// User config root (`~/.config` on Unix, `%APPDATA%` on Windows).
pub fn config_root_dir() -> Option<PathBuf> {
    dirs::config_dir()
}

/// The CLI's own directory under the config root.
pub fn config_dir() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join(SERVICE_NAME))
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
    )
}

fn load_config_from_sources<FRead, FEnv>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
) -> Result<Config, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
{
    let file = read_file_config(path_override, &read_file)?;
    let mut config = Config::default();

    if let Some(value) = file.client_id {
        config.client_id = value;
    }
    if let Some(value) = file.provider_base_url {
        config.provider_base_url = value;
    }
    if let Some(value) = file.app_base_url {
        config.app_base_url = value;
    }
    if let Some(value) = file.success_url {
        config.success_url = value;
    }
    if let Some(value) = file.callback_port {
        config.callback_port = value;
    }
    if let Some(value) = file.scope {
        config.scope = value;
    }
    if let Some(value) = file.login_timeout_secs {
        config.login_timeout_secs = value;
    }

    if let Some(value) = env_lookup("CODESMOOTH_CLIENT_ID") {
        config.client_id = value;
    }
    if let Some(value) = env_lookup("CODESMOOTH_PROVIDER_URL") {
        config.provider_base_url = value;
    }
    if let Some(value) = env_lookup("CODESMOOTH_APP_URL") {
        config.app_base_url = value;
    }
    if let Some(value) = env_lookup("CODESMOOTH_SUCCESS_URL") {
        config.success_url = value;
    }
    if let Some(value) = env_lookup("CODESMOOTH_CALLBACK_PORT") {
        config.callback_port = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid CODESMOOTH_CALLBACK_PORT `{value}`")))?;
    }

    config.provider_base_url = normalize_base_url(&config.provider_base_url);
    config.app_base_url = normalize_base_url(&config.app_base_url);
    validate_config(&config)?;
    Ok(config)
}

fn read_file_config<FRead>(
    path_override: Option<&str>,
    read_file: &FRead,
) -> Result<FileConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
{
    // An explicitly requested file must exist; the default one may be absent.
    if let Some(path) = path_override {
        let text = read_file(Path::new(path))?;
        return parse_file_config(&text, path);
    }

    let Some(path) = config_dir().map(|dir| dir.join(CONFIG_FILE_NAME)) else {
        return Ok(FileConfig::default());
    };
    match read_file(&path) {
        Ok(text) => parse_file_config(&text, &path.display().to_string()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(ConfigError::Io(err)),
    }
}

fn parse_file_config(text: &str, path: &str) -> Result<FileConfig, ConfigError> {
    toml::from_str(text)
        .map_err(|err| ConfigError::Invalid(format!("failed to parse `{path}`: {err}")))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.client_id.trim().is_empty() {
        return Err(ConfigError::Invalid("client_id must not be empty".into()));
    }
    for (name, value) in [
        ("provider_base_url", &config.provider_base_url),
        ("app_base_url", &config.app_base_url),
        ("success_url", &config.success_url),
    ] {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "{name} must be an http(s) URL, got `{value}`"
            )));
        }
    }
    if config.login_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "login_timeout_secs must be non-zero".into(),
        ));
    }
    Ok(())
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_file(_: &Path) -> Result<String, std::io::Error> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "absent"))
    }

    #[test]
    fn defaults_apply_when_no_file_or_env() {
        let config = load_config_from_sources(None, no_file, |_| None).unwrap();
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.callback_port, 45110);
        assert_eq!(
            config.token_url(),
            "https://codesmooth.fusionauth.io/oauth2/token"
        );
        assert_eq!(config.whoami_url(), "https://app.codesmooth.dev/cli/getMe");
    }

    #[test]
    fn file_values_override_defaults() {
        let config = load_config_from_sources(
            Some("custom.toml"),
            |_| {
                Ok(concat!(
                    "provider_base_url = \"https://auth.example.com/\"\n",
                    "callback_port = 9001\n",
                )
                .to_string())
            },
            |_| None,
        )
        .unwrap();
        // Trailing slash is stripped so endpoint joins stay clean.
        assert_eq!(config.provider_base_url, "https://auth.example.com");
        assert_eq!(config.callback_port, 9001);
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
    }

    #[test]
    fn env_overrides_file() {
        let config = load_config_from_sources(
            Some("custom.toml"),
            |_| Ok("client_id = \"from-file\"\n".to_string()),
            |name| (name == "CODESMOOTH_CLIENT_ID").then(|| "from-env".to_string()),
        )
        .unwrap();
        assert_eq!(config.client_id, "from-env");
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let err = load_config_from_sources(Some("/nope/codesmooth.toml"), no_file, |_| None)
            .expect_err("missing explicit config should fail");
        assert!(err.to_string().starts_with("io:"), "got: {err}");
    }

    #[test]
    fn invalid_port_env_is_rejected() {
        let err = load_config_from_sources(None, no_file, |name| {
            (name == "CODESMOOTH_CALLBACK_PORT").then(|| "not-a-port".to_string())
        })
        .expect_err("bad port should fail");
        assert!(err.to_string().contains("CODESMOOTH_CALLBACK_PORT"));
    }

    #[test]
    fn non_http_urls_are_rejected() {
        let err = load_config_from_sources(
            Some("custom.toml"),
            |_| Ok("app_base_url = \"ftp://example.com\"\n".to_string()),
            |_| None,
        )
        .expect_err("non-http url should fail");
        assert!(err.to_string().contains("app_base_url"));
    }
}

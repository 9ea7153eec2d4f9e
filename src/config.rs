//! Configuration management for Keywarden
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The assembled [`Config`] is built once at startup and passed by value
//! into the auth subsystem; no component reads the environment directly.

use crate::error::{KeywardenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Keywarden
///
/// Holds the remote API location, the OAuth client registration, and the
/// credential storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    pub api: ApiConfig,

    /// OAuth client settings
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Credential storage and static-token settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API and authorization server, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.example.com".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// OAuth client registration and flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client identifier issued by the provider
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret issued by the provider
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Scope string requested during authorization
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Local loopback port for the authorization redirect
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,

    /// Seconds to wait for the authorization callback before giving up
    #[serde(default = "default_auth_timeout")]
    pub timeout_seconds: u64,
}

fn default_scope() -> String {
    "read write".to_string()
}

fn default_redirect_port() -> u16 {
    8484
}

fn default_auth_timeout() -> u64 {
    120
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            scope: default_scope(),
            redirect_port: default_redirect_port(),
            timeout_seconds: default_auth_timeout(),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Pre-issued static access token. When set, OAuth is bypassed entirely.
    #[serde(default)]
    pub static_token: Option<String>,

    /// Path to the persisted token file. Defaults to the platform data
    /// directory when unset.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            api: ApiConfig::default(),
            oauth: OAuthConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| KeywardenError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| KeywardenError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("KEYWARDEN_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(client_id) = std::env::var("KEYWARDEN_CLIENT_ID") {
            self.oauth.client_id = Some(client_id);
        }

        if let Ok(client_secret) = std::env::var("KEYWARDEN_CLIENT_SECRET") {
            self.oauth.client_secret = Some(client_secret);
        }

        if let Ok(scope) = std::env::var("KEYWARDEN_SCOPE") {
            self.oauth.scope = scope;
        }

        if let Ok(port) = std::env::var("KEYWARDEN_REDIRECT_PORT") {
            if let Ok(value) = port.parse() {
                self.oauth.redirect_port = value;
            } else {
                tracing::warn!("Invalid KEYWARDEN_REDIRECT_PORT: {}", port);
            }
        }

        if let Ok(timeout) = std::env::var("KEYWARDEN_AUTH_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.oauth.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid KEYWARDEN_AUTH_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(token) = std::env::var("KEYWARDEN_STATIC_TOKEN") {
            if !token.is_empty() {
                self.auth.static_token = Some(token);
            }
        }

        if let Ok(token_file) = std::env::var("KEYWARDEN_TOKEN_FILE") {
            self.auth.token_file = Some(PathBuf::from(token_file));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            self.api.base_url = base_url.clone();
        }

        if let Some(token_file) = &cli.token_file {
            self.auth.token_file = Some(token_file.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty or unparseable, or if the
    /// redirect port or timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(KeywardenError::Config("api.base_url must not be empty".to_string()).into());
        }

        url::Url::parse(&self.api.base_url)
            .map_err(|e| KeywardenError::Config(format!("Invalid api.base_url: {}", e)))?;

        if self.oauth.redirect_port == 0 {
            return Err(
                KeywardenError::Config("oauth.redirect_port must be non-zero".to_string()).into(),
            );
        }

        if self.oauth.timeout_seconds == 0 {
            return Err(KeywardenError::Config(
                "oauth.timeout_seconds must be non-zero".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    /// Provider-hosted authorization endpoint
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.base_url())
    }

    /// Provider-hosted token endpoint
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/access_token", self.base_url())
    }

    /// Resolved path of the persisted token file
    ///
    /// Falls back to `<platform data dir>/keywarden/tokens.json` when no
    /// explicit path is configured.
    pub fn token_file_path(&self) -> PathBuf {
        if let Some(path) = &self.auth.token_file {
            return path.clone();
        }

        directories::ProjectDirs::from("", "", "keywarden")
            .map(|dirs| dirs.data_dir().join("tokens.json"))
            .unwrap_or_else(|| PathBuf::from(".keywarden-tokens.json"))
    }

    /// Duration to wait for the authorization callback
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth.timeout_seconds)
    }
}

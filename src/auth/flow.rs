//! OAuth2 authorization-code flow coordinator
//!
//! Drives one authorization attempt end to end: generate the anti-CSRF
//! state nonce, build the provider's authorization URL, host the loopback
//! callback listener, optionally open the user's browser, validate the
//! returned state, and exchange the one-time code for tokens.
//!
//! The design deliberately uses a plain authorization-code exchange with a
//! confidential client secret; there is no PKCE step.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::Deserialize;
use url::Url;

use crate::auth::listener::{CallbackListener, CallbackOutcome};
use crate::auth::token_store::{FileTokenStore, TokenRecord};
use crate::auth::Clock;
use crate::config::Config;
use crate::error::{KeywardenError, Result};

/// Configuration for one authorization flow, assembled once from [`Config`]
/// and passed by value. The flow never reads ambient configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Provider-hosted authorization endpoint
    pub authorize_endpoint: String,

    /// Provider-hosted token endpoint
    pub token_endpoint: String,

    /// OAuth client identifier; required before any listener is started
    pub client_id: Option<String>,

    /// OAuth client secret; required before any listener is started
    pub client_secret: Option<String>,

    /// Scope string requested during authorization
    pub scope: String,

    /// Local loopback port for the redirect
    pub redirect_port: u16,

    /// How long to wait for the callback
    pub timeout: Duration,
}

impl FlowConfig {
    /// Assemble a flow configuration from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            authorize_endpoint: config.authorize_endpoint(),
            token_endpoint: config.token_endpoint(),
            client_id: config.oauth.client_id.clone(),
            client_secret: config.oauth.client_secret.clone(),
            scope: config.oauth.scope.clone(),
            redirect_port: config.oauth.redirect_port,
            timeout: config.auth_timeout(),
        }
    }

    /// The fixed loopback redirect URI registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }
}

/// Capability to open a URL in the user's browser.
///
/// Injected so the coordinator's logic is testable without spawning real
/// OS processes; launch failure is always best-effort for callers since
/// the URL can be opened manually.
pub trait UrlOpener: Send + Sync {
    /// Open `url` externally.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the platform's default browser command.
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    #[cfg(target_os = "macos")]
    fn open(&self, url: &str) -> std::io::Result<()> {
        Command::new("open").arg(url).spawn().map(|_| ())
    }

    #[cfg(target_os = "linux")]
    fn open(&self, url: &str) -> std::io::Result<()> {
        Command::new("xdg-open").arg(url).spawn().map(|_| ())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn open(&self, url: &str) -> std::io::Result<()> {
        let _ = url;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no browser launcher on this platform",
        ))
    }
}

/// Generate a single-use anti-CSRF state nonce: 32 random bytes,
/// hex-encoded.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(64), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Build the provider's authorization URL with the fixed query parameters.
pub fn build_authorization_url(config: &FlowConfig, client_id: &str, state: &str) -> Result<String> {
    let mut url = Url::parse(&config.authorize_endpoint)
        .map_err(|e| KeywardenError::Config(format!("Invalid authorization endpoint: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", client_id);
        query.append_pair("scope", &config.scope);
        query.append_pair("response_type", "code");
        query.append_pair("redirect_uri", &config.redirect_uri());
        query.append_pair("state", state);
    }

    Ok(url.to_string())
}

/// Raw JSON response from the provider's token endpoint.
///
/// Shared between the authorization-code exchange and the refresh path.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEndpointResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expires_in: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenEndpointResponse {
    /// Convert into a [`TokenRecord`] with an absolute expiry computed
    /// against the supplied clock reading. `fallback_scope` is used when
    /// the provider omits `scope` from the response.
    pub(crate) fn into_record(self, now_ms: u64, fallback_scope: &str) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now_ms.saturating_add(self.expires_in.saturating_mul(1000)),
            token_type: self.token_type,
            scope: self.scope.unwrap_or_else(|| fallback_scope.to_string()),
        }
    }
}

/// Coordinates one authorization attempt.
pub struct AuthFlow {
    http: Arc<reqwest::Client>,
    config: FlowConfig,
    store: FileTokenStore,
    clock: Arc<dyn Clock>,
    opener: Arc<dyn UrlOpener>,
}

impl AuthFlow {
    /// Create a flow with the system browser opener and system clock.
    pub fn new(http: Arc<reqwest::Client>, config: FlowConfig, store: FileTokenStore) -> Self {
        Self::with_parts(
            http,
            config,
            store,
            Arc::new(crate::auth::SystemClock),
            Arc::new(SystemUrlOpener),
        )
    }

    /// Create a flow with injected clock and browser opener.
    pub fn with_parts(
        http: Arc<reqwest::Client>,
        config: FlowConfig,
        store: FileTokenStore,
        clock: Arc<dyn Clock>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            http,
            config,
            store,
            clock,
            opener,
        }
    }

    /// Run the full authorization flow.
    ///
    /// # Errors
    ///
    /// Fails with [`KeywardenError::Config`] before any listener or
    /// network activity when client credentials are missing; otherwise
    /// with the typed error matching the callback or exchange failure.
    pub async fn run(&self, open_browser: bool) -> Result<TokenRecord> {
        self.require_credentials()?;
        let state = generate_state();
        self.run_with_state(open_browser, &state).await
    }

    /// Run the flow with an explicit state nonce. Test seam; `run` always
    /// generates a fresh nonce per attempt.
    pub(crate) async fn run_with_state(
        &self,
        open_browser: bool,
        expected_state: &str,
    ) -> Result<TokenRecord> {
        let (client_id, _) = self.require_credentials()?;

        let listener =
            CallbackListener::bind(self.config.redirect_port, self.config.timeout).await?;

        let auth_url = build_authorization_url(&self.config, &client_id, expected_state)?;

        println!("Open the following URL in your browser to authorize:\n\n  {}\n", auth_url);
        if open_browser {
            if let Err(e) = self.opener.open(&auth_url) {
                tracing::warn!("Failed to launch browser, open the URL manually: {}", e);
            }
        }

        tracing::info!(
            "Waiting up to {}s for the authorization callback on port {}",
            self.config.timeout.as_secs(),
            listener.local_addr().port()
        );

        match listener.wait().await {
            CallbackOutcome::CodeReceived { code, state } => {
                if state != expected_state {
                    tracing::warn!("Authorization callback state mismatch, aborting");
                    return Err(KeywardenError::StateMismatch.into());
                }
                let record = self.exchange_code(&code).await?;
                self.store.save(&record)?;
                Ok(record)
            }
            CallbackOutcome::ProviderError { error, description } => {
                Err(KeywardenError::Callback { error, description }.into())
            }
            CallbackOutcome::MalformedRequest => Err(KeywardenError::Callback {
                error: "missing authorization code".to_string(),
                description: None,
            }
            .into()),
            CallbackOutcome::TimedOut => {
                Err(KeywardenError::Timeout(self.config.timeout.as_secs()).into())
            }
        }
    }

    /// Exchange the one-time authorization code for tokens.
    pub(crate) async fn exchange_code(&self, code: &str) -> Result<TokenRecord> {
        let (client_id, client_secret) = self.require_credentials()?;
        let redirect_uri = self.config.redirect_uri();

        let params = [
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KeywardenError::ExchangeFailed { status, body }.into());
        }

        let raw: TokenEndpointResponse = response.json().await?;
        Ok(raw.into_record(self.clock.now_ms(), &self.config.scope))
    }

    fn require_credentials(&self) -> Result<(String, String)> {
        let client_id = self
            .config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| KeywardenError::Config("oauth.client_id is not set".to_string()))?;
        let client_secret = self
            .config
            .client_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| KeywardenError::Config("oauth.client_secret is not set".to_string()))?;
        Ok((client_id, client_secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_flow_config() -> FlowConfig {
        FlowConfig {
            authorize_endpoint: "https://forge.example.org/oauth/authorize".to_string(),
            token_endpoint: "https://forge.example.org/oauth/access_token".to_string(),
            client_id: Some("test-client".to_string()),
            client_secret: Some("test-secret".to_string()),
            scope: "read write".to_string(),
            redirect_port: 8484,
            timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_generate_state_is_64_hex_chars() {
        let state = generate_state();
        assert_eq!(state.len(), 64);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_state_is_unique_per_attempt() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
    }

    #[test]
    fn test_redirect_uri_uses_configured_port() {
        let config = make_flow_config();
        assert_eq!(config.redirect_uri(), "http://localhost:8484/callback");
    }

    #[test]
    fn test_authorization_url_contains_fixed_params() {
        let config = make_flow_config();
        let url = build_authorization_url(&config, "test-client", "nonce123").unwrap();

        assert!(url.starts_with("https://forge.example.org/oauth/authorize?"));
        assert!(url.contains("client_id=test-client"), "missing client_id: {url}");
        assert!(url.contains("response_type=code"), "missing response_type: {url}");
        assert!(url.contains("scope=read+write"), "missing scope: {url}");
        assert!(
            url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8484%2Fcallback"),
            "missing redirect_uri: {url}"
        );
        assert!(url.contains("state=nonce123"), "missing state: {url}");
    }

    #[test]
    fn test_authorization_url_rejects_bad_endpoint() {
        let mut config = make_flow_config();
        config.authorize_endpoint = "not a url".to_string();
        assert!(build_authorization_url(&config, "c", "s").is_err());
    }

    #[test]
    fn test_token_response_into_record_computes_expiry() {
        let raw = TokenEndpointResponse {
            access_token: "tok".to_string(),
            refresh_token: "ref".to_string(),
            expires_in: 1200,
            token_type: "Bearer".to_string(),
            scope: Some("read".to_string()),
        };

        let record = raw.into_record(1_000_000, "fallback");
        assert_eq!(record.expires_at, 1_000_000 + 1_200_000);
        assert_eq!(record.scope, "read");
    }

    #[test]
    fn test_token_response_uses_fallback_scope() {
        let raw = TokenEndpointResponse {
            access_token: "tok".to_string(),
            refresh_token: "ref".to_string(),
            expires_in: 60,
            token_type: "Bearer".to_string(),
            scope: None,
        };

        let record = raw.into_record(0, "read write");
        assert_eq!(record.scope, "read write");
    }

    #[test]
    fn test_token_response_defaults() {
        let json = r#"{"access_token":"tok","expires_in":3600}"#;
        let raw: TokenEndpointResponse = serde_json::from_str(json).unwrap();
        assert_eq!(raw.token_type, "Bearer");
        assert_eq!(raw.refresh_token, "");
        assert!(raw.scope.is_none());
    }
}

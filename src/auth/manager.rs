//! Token lifecycle facade
//!
//! [`TokenManager`] is the single entry point the rest of the application
//! depends on for credentials. It decides at construction whether the
//! process runs in static-token or OAuth mode, answers "give me a valid
//! access token now" (refreshing when expired), and exposes the login,
//! logout, and status operations.
//!
//! # Concurrency
//!
//! `get_access_token` may be called from many tasks at once. Refresh is
//! single-flight: a `tokio::sync::Mutex` guards the refresh critical
//! section, and waiters re-check the freshly swapped record before
//! issuing their own network call. Many providers rotate refresh tokens
//! on use, so two concurrent refresh calls with the same refresh token
//! can invalidate each other; the guard makes that impossible here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::auth::flow::{AuthFlow, FlowConfig, SystemUrlOpener, TokenEndpointResponse, UrlOpener};
use crate::auth::token_store::{FileTokenStore, TokenRecord, DEFAULT_EXPIRY_BUFFER};
use crate::auth::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{KeywardenError, Result};

/// Synthetic expiry for static tokens: they are permanently non-expired.
pub const STATIC_TOKEN_EXPIRES_AT: u64 = u64::MAX;

/// Credential source, fixed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pre-issued long-lived token supplied out of band; never refreshed,
    /// never persisted.
    Static,
    /// Full OAuth2 authorization-code lifecycle with refresh.
    OAuth,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Static => write!(f, "static"),
            Mode::OAuth => write!(f, "oauth"),
        }
    }
}

/// Facade over the credential lifecycle.
pub struct TokenManager {
    mode: Mode,
    static_token: Option<String>,
    flow_config: FlowConfig,
    store: FileTokenStore,
    http: Arc<reqwest::Client>,
    clock: Arc<dyn Clock>,
    opener: Arc<dyn UrlOpener>,
    /// In-memory record, OAuth mode only. Every mutation replaces the
    /// whole record; readers never observe partial-field updates.
    tokens: RwLock<Option<TokenRecord>>,
    /// Single-flight guard for the refresh critical section.
    refresh_lock: Mutex<()>,
    expiry_buffer: Duration,
}

impl TokenManager {
    /// Build a manager from the application configuration with the system
    /// clock and browser opener. A configured static token always wins
    /// over OAuth credentials, even when both are present.
    pub fn from_config(config: &Config, http: Arc<reqwest::Client>) -> Self {
        Self::with_parts(
            config.auth.static_token.clone(),
            FlowConfig::from_config(config),
            FileTokenStore::new(config.token_file_path()),
            http,
            Arc::new(SystemClock),
            Arc::new(SystemUrlOpener),
        )
    }

    /// Build a manager with injected clock and browser opener.
    pub fn with_parts(
        static_token: Option<String>,
        flow_config: FlowConfig,
        store: FileTokenStore,
        http: Arc<reqwest::Client>,
        clock: Arc<dyn Clock>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        let static_token = static_token.filter(|t| !t.is_empty());
        let mode = if static_token.is_some() {
            Mode::Static
        } else {
            Mode::OAuth
        };

        let tokens = match mode {
            Mode::Static => None,
            Mode::OAuth => store.load(),
        };

        Self {
            mode,
            static_token,
            flow_config,
            store,
            http,
            clock,
            opener,
            tokens: RwLock::new(tokens),
            refresh_lock: Mutex::new(()),
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
        }
    }

    /// The credential mode fixed at construction.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Return a valid bearer access token, refreshing first when the held
    /// token is within the expiry buffer.
    ///
    /// In static mode the configured token is returned unconditionally
    /// with no network activity.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardenError::Unauthenticated`] when no token is held,
    /// or [`KeywardenError::RefreshFailed`] when the provider rejects the
    /// refresh (stored credentials are cleared in that case).
    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let now = self.clock.now_ms();

        // Fast path: a valid token needs no coordination.
        {
            let guard = self.tokens.read().await;
            match guard.as_ref() {
                None => return Err(KeywardenError::Unauthenticated.into()),
                Some(record) if !record.is_expired(now, self.expiry_buffer) => {
                    return Ok(record.access_token.clone());
                }
                Some(_) => {}
            }
        }

        // Slow path: serialize refreshes. Whoever holds the lock first
        // performs the network call; everyone else re-checks the swapped
        // record and returns it without a second call.
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = {
            let guard = self.tokens.read().await;
            match guard.as_ref() {
                None => return Err(KeywardenError::Unauthenticated.into()),
                Some(record) if !record.is_expired(self.clock.now_ms(), self.expiry_buffer) => {
                    return Ok(record.access_token.clone());
                }
                Some(record) => record.refresh_token.clone(),
            }
        };

        let record = self.refresh(&refresh_token).await?;
        Ok(record.access_token)
    }

    /// Run the interactive authorization flow to establish OAuth
    /// credentials.
    ///
    /// A no-op success in static mode: static credentials need no flow.
    pub async fn run_authorization_flow(&self, open_browser: bool) -> Result<()> {
        if self.mode == Mode::Static {
            tracing::info!("Static token configured; authorization flow not required");
            return Ok(());
        }

        let flow = AuthFlow::with_parts(
            Arc::clone(&self.http),
            self.flow_config.clone(),
            self.store.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.opener),
        );

        let record = flow.run(open_browser).await?;

        let mut guard = self.tokens.write().await;
        *guard = Some(record);
        Ok(())
    }

    /// Whether a token is held and not within the expiry buffer.
    pub async fn has_valid_token(&self) -> bool {
        !self.is_expired(self.expiry_buffer).await
    }

    /// Whether the held token is absent, expired, or will expire within
    /// `buffer`. Static tokens are permanently non-expired.
    pub async fn is_expired(&self, buffer: Duration) -> bool {
        if self.mode == Mode::Static {
            return false;
        }
        let now = self.clock.now_ms();
        let guard = self.tokens.read().await;
        match guard.as_ref() {
            None => true,
            Some(record) => record.is_expired(now, buffer),
        }
    }

    /// A copy of the held record, for status display. No I/O.
    pub async fn token_info(&self) -> Option<TokenRecord> {
        if let Some(token) = &self.static_token {
            return Some(TokenRecord {
                access_token: token.clone(),
                refresh_token: String::new(),
                expires_at: STATIC_TOKEN_EXPIRES_AT,
                token_type: "Bearer".to_string(),
                scope: self.flow_config.scope.clone(),
            });
        }
        self.tokens.read().await.clone()
    }

    /// Wipe the in-memory record and delete the persisted file.
    /// Idempotent.
    pub async fn clear_tokens(&self) -> Result<()> {
        {
            let mut guard = self.tokens.write().await;
            *guard = None;
        }
        self.store.delete()
    }

    /// Exchange the refresh token for a new record at the token endpoint.
    ///
    /// A non-success response clears all stored state (fail closed: a
    /// dead refresh token cannot recover itself, so the next call must
    /// run the full authorization flow) before reporting
    /// [`KeywardenError::RefreshFailed`].
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        let client_id = self
            .flow_config
            .client_id
            .clone()
            .ok_or_else(|| KeywardenError::Config("oauth.client_id is not set".to_string()))?;
        let client_secret = self
            .flow_config
            .client_secret
            .clone()
            .ok_or_else(|| KeywardenError::Config("oauth.client_secret is not set".to_string()))?;

        tracing::info!("Access token expired, refreshing");

        let params = [
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&self.flow_config.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                "Refresh rejected with status {}, clearing stored credentials",
                status
            );
            self.clear_tokens().await?;
            return Err(KeywardenError::RefreshFailed { status, body }.into());
        }

        let raw: TokenEndpointResponse = response.json().await?;
        let mut record = raw.into_record(self.clock.now_ms(), &self.flow_config.scope);

        // Providers that do not rotate refresh tokens omit the field;
        // carry the old one forward so the chain is not broken.
        if record.refresh_token.is_empty() {
            record.refresh_token = refresh_token.to_string();
        }

        if let Err(e) = self.store.save(&record) {
            // A failed write is never fatal; the refreshed token still
            // serves this process.
            tracing::warn!("Failed to persist refreshed token: {}", e);
        }

        let mut guard = self.tokens.write().await;
        *guard = Some(record.clone());

        tracing::info!("Token refreshed");
        Ok(record)
    }
}

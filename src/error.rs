//! Error types for Keywarden
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Keywarden operations
///
/// This enum encompasses all failure channels of the credential lifecycle:
/// configuration problems, the authorization flow, the loopback callback
/// listener, token exchange and refresh, and persistence.
#[derive(Error, Debug)]
pub enum KeywardenError {
    /// Configuration-related errors (missing client credentials, bad file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No token is held and no static token is configured
    #[error("Not authenticated. Run 'keywarden login' first")]
    Unauthenticated,

    /// The `state` returned on the callback did not match the nonce sent
    /// with the authorization request
    #[error("State mismatch in OAuth callback (possible CSRF)")]
    StateMismatch,

    /// The provider redirected back with an error, or the callback was
    /// missing the authorization code
    #[error("Authorization callback failed: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Callback {
        /// The provider's `error` parameter (e.g. `access_denied`)
        error: String,
        /// The provider's optional `error_description` parameter
        description: Option<String>,
    },

    /// No callback arrived within the configured duration
    #[error("Timed out after {0}s waiting for the authorization callback")]
    Timeout(u64),

    /// The loopback redirect port is already bound, most likely by another
    /// in-flight authorization attempt
    #[error("Callback listener port unavailable: {0}")]
    ListenerBusy(String),

    /// The token endpoint rejected the authorization-code exchange
    #[error("Token exchange failed with status {status}: {body}")]
    ExchangeFailed {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Response body, surfaced for diagnostics
        body: String,
    },

    /// The token endpoint rejected the refresh; stored credentials are
    /// cleared and a new login is required
    #[error("Token refresh failed with status {status}: {body}")]
    RefreshFailed {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Response body, surfaced for diagnostics
        body: String,
    },

    /// Token file read/write errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Keywarden operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

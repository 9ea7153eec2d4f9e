//! Authenticated HTTP client
//!
//! Thin wrapper over `reqwest` that asks the [`TokenManager`] for a
//! valid bearer token before every request. Callers never see raw
//! credentials; expired tokens are refreshed transparently inside
//! `get_access_token`.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::auth::manager::TokenManager;
use crate::config::Config;
use crate::error::{KeywardenError, Result};

/// Outcome of an API request. The status is passed through untouched so
/// callers can surface provider errors verbatim.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, parsed as JSON when possible, otherwise wrapped as
    /// a JSON string.
    pub body: JsonValue,
}

impl ApiResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// REST client for the configured API base URL.
pub struct ApiClient {
    http: Arc<reqwest::Client>,
    manager: Arc<TokenManager>,
    base_url: String,
}

impl ApiClient {
    /// Creates a client against the configured base URL.
    pub fn new(config: &Config, http: Arc<reqwest::Client>, manager: Arc<TokenManager>) -> Self {
        Self {
            http,
            manager,
            base_url: config.base_url().to_string(),
        }
    }

    /// Sends a request with the given method and path, attaching the
    /// current access token.
    ///
    /// # Errors
    ///
    /// Fails when no valid token can be produced or the request cannot
    /// be sent. A 401 means the token the manager considered valid was
    /// rejected server-side and surfaces as
    /// [`KeywardenError::Unauthenticated`]; other non-success statuses
    /// are returned in the [`ApiResponse`], not as errors.
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<ApiResponse> {
        let token = self.manager.get_access_token().await?;
        let url = self.join(path);

        tracing::debug!("API request: {} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        if status == 401 {
            return Err(KeywardenError::Unauthenticated.into());
        }

        let text = response.text().await.unwrap_or_default();

        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));

        Ok(ApiResponse { status, body })
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(reqwest::Method::GET, path, None).await
    }

    /// POST `path` with an optional JSON body.
    pub async fn post(&self, path: &str, body: Option<&JsonValue>) -> Result<ApiResponse> {
        self.request(reqwest::Method::POST, path, body).await
    }

    /// PUT `path` with an optional JSON body.
    pub async fn put(&self, path: &str, body: Option<&JsonValue>) -> Result<ApiResponse> {
        self.request(reqwest::Method::PUT, path, body).await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(reqwest::Method::DELETE, path, None).await
    }

    fn join(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

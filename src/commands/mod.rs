/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes five top-level command modules:

- `login`  — Run the interactive authorization flow
- `logout` — Discard stored credentials
- `status` — Show the current authentication state
- `token`  — Print the current access token for scripting
- `api`    — Authenticated passthrough to the configured API

These handlers are intentionally small and use the library components:
the token manager, the authorization flow, and the API client.
*/

use std::sync::Arc;

use crate::auth::manager::TokenManager;
use crate::config::Config;
use crate::error::Result;

/// Build the shared HTTP client and token manager used by every handler.
fn build_manager(config: &Config) -> Result<(Arc<reqwest::Client>, Arc<TokenManager>)> {
    let http = Arc::new(
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?,
    );
    let manager = Arc::new(TokenManager::from_config(config, Arc::clone(&http)));
    Ok((http, manager))
}

// Login command handler
pub mod login {
    //! Interactive authorization handler.
    //!
    //! Runs the full browser-based authorization flow and persists the
    //! resulting tokens. With `--no-browser` the authorization URL is
    //! printed instead of opened. With `--force` an existing valid token
    //! is discarded first.

    use super::*;
    use crate::auth::manager::Mode;
    use colored::Colorize;

    /// Run the login flow.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `no_browser` - Print the authorization URL instead of opening it
    /// * `force` - Re-authorize even when a valid token is already held
    pub async fn run_login(config: &Config, no_browser: bool, force: bool) -> Result<()> {
        let (_http, manager) = build_manager(config)?;

        if manager.mode() == Mode::Static {
            println!(
                "{}",
                "A static token is configured; login is not required.".yellow()
            );
            return Ok(());
        }

        if !force && manager.has_valid_token().await {
            println!(
                "{}",
                "Already authenticated. Use --force to re-authorize.".green()
            );
            return Ok(());
        }

        if force {
            manager.clear_tokens().await?;
        }

        manager.run_authorization_flow(!no_browser).await?;
        println!("{}", "Authentication successful.".green());
        Ok(())
    }
}

// Logout command handler
pub mod logout {
    //! Credential removal handler.

    use super::*;
    use crate::auth::manager::Mode;
    use colored::Colorize;

    /// Discard in-memory and persisted credentials. Succeeds even when
    /// nothing is stored.
    pub async fn run_logout(config: &Config) -> Result<()> {
        let (_http, manager) = build_manager(config)?;

        if manager.mode() == Mode::Static {
            println!(
                "{}",
                "A static token is configured out of band; nothing to clear.".yellow()
            );
            return Ok(());
        }

        manager.clear_tokens().await?;
        println!("{}", "Logged out.".green());
        Ok(())
    }
}

// Status command handler
pub mod status {
    //! Authentication status display.

    use super::*;
    use crate::auth::manager::{Mode, STATIC_TOKEN_EXPIRES_AT};
    use crate::auth::{Clock, SystemClock};
    use chrono::{TimeZone, Utc};
    use colored::Colorize;

    /// Render an absolute millisecond expiry for display.
    fn format_expiry(expires_at: u64) -> String {
        if expires_at == STATIC_TOKEN_EXPIRES_AT {
            return "never (static token)".to_string();
        }
        match Utc.timestamp_millis_opt(expires_at as i64).single() {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => format!("{} ms since epoch", expires_at),
        }
    }

    /// Render the time remaining until expiry, e.g. `2h 5m` or `40s`.
    fn format_remaining(now_ms: u64, expires_at: u64) -> String {
        if now_ms >= expires_at {
            return "expired".to_string();
        }
        let secs = (expires_at - now_ms) / 1000;
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m", minutes)
        } else {
            format!("{}s", secs)
        }
    }

    /// Show the credential mode, authentication state, and token expiry.
    pub async fn run_status(config: &Config) -> Result<()> {
        let (_http, manager) = build_manager(config)?;

        println!("\nAuthentication Status\n");
        println!("Mode:        {}", manager.mode());
        println!("API:         {}", config.base_url());

        match manager.token_info().await {
            Some(record) => {
                let state = if manager.has_valid_token().await {
                    "authenticated".green()
                } else {
                    "expired".yellow()
                };
                println!("State:       {}", state);
                if record.expires_at == STATIC_TOKEN_EXPIRES_AT {
                    println!("Expires:     {}", format_expiry(record.expires_at));
                } else {
                    println!(
                        "Expires:     {} ({})",
                        format_expiry(record.expires_at),
                        format_remaining(SystemClock.now_ms(), record.expires_at)
                    );
                }
                if !record.scope.is_empty() {
                    println!("Scope:       {}", record.scope);
                }
                if manager.mode() == Mode::OAuth {
                    let refresh = if record.refresh_token.is_empty() {
                        "absent"
                    } else {
                        "present"
                    };
                    println!("Refresh:     {}", refresh);
                }
            }
            None => {
                println!("State:       {}", "not authenticated".red());
                println!("Run 'keywarden login' to authenticate.");
            }
        }
        println!();
        Ok(())
    }

}

// Token command handler
pub mod token {
    //! Raw access token output for scripting.
    //!
    //! Prints only the token on stdout so it can be captured in shell
    //! pipelines; refreshes first when expired.

    use super::*;

    /// Print a valid access token to stdout.
    pub async fn run_token(config: &Config) -> Result<()> {
        let (_http, manager) = build_manager(config)?;
        let token = manager.get_access_token().await?;
        println!("{}", token);
        Ok(())
    }
}

// API passthrough command handler
pub mod api {
    //! Authenticated request passthrough.
    //!
    //! Sends a single request to the configured API with the current
    //! access token attached and prints the JSON response.

    use super::*;
    use crate::api::ApiClient;
    use crate::error::KeywardenError;
    use colored::Colorize;

    /// Parse an HTTP method name, case-insensitively.
    fn parse_method(method: &str) -> Result<reqwest::Method> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(reqwest::Method::GET),
            "POST" => Ok(reqwest::Method::POST),
            "PUT" => Ok(reqwest::Method::PUT),
            "DELETE" => Ok(reqwest::Method::DELETE),
            other => Err(
                KeywardenError::Config(format!("unsupported HTTP method: {}", other)).into(),
            ),
        }
    }

    /// Send `method path` with an optional JSON body and print the
    /// response.
    pub async fn run_api(
        config: &Config,
        method: &str,
        path: &str,
        data: Option<&str>,
    ) -> Result<()> {
        let method = parse_method(method)?;
        let body = match data {
            Some(raw) => Some(serde_json::from_str::<serde_json::Value>(raw)?),
            None => None,
        };

        let (http, manager) = build_manager(config)?;
        let client = ApiClient::new(config, http, manager);

        let response = client.request(method, path, body.as_ref()).await?;

        if !response.is_success() {
            eprintln!("{}", format!("HTTP {}", response.status).red());
        }
        println!("{}", serde_json::to_string_pretty(&response.body)?);
        Ok(())
    }

}

//! Keywarden - OAuth2 credential manager CLI library
//!
//! This library provides the core functionality for the Keywarden credential
//! manager, including the OAuth2 authorization flow, token persistence and
//! refresh, and authenticated API access.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Token store, callback listener, authorization flow, and the
//!   token manager facade
//! - `api`: Authenticated REST client for the configured API
//! - `commands`: CLI command handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use keywarden::{Config, TokenManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let http = Arc::new(reqwest::Client::new());
//!     let manager = TokenManager::from_config(&config, http);
//!     let token = manager.get_access_token().await?;
//!     println!("{}", token);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use api::{ApiClient, ApiResponse};
pub use auth::{FileTokenStore, Mode, TokenManager, TokenRecord};
pub use config::Config;
pub use error::{KeywardenError, Result};

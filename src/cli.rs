//! Command-line interface definition for Keywarden
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for authentication and authenticated API access.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keywarden - OAuth2 credential manager CLI
///
/// Authenticate against the configured API with the browser-based
/// authorization flow and keep the resulting tokens fresh.
#[derive(Parser, Debug, Clone)]
#[command(name = "keywarden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the configured API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Override the token storage file path
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Keywarden
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Authenticate via the browser-based authorization flow
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Re-authorize even when a valid token is already stored
        #[arg(long)]
        force: bool,
    },

    /// Discard stored credentials
    Logout,

    /// Show the current authentication state
    Status,

    /// Print the current access token for use in scripts
    Token,

    /// Send an authenticated request to the configured API
    Api {
        /// HTTP method (GET, POST, PUT, DELETE)
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path, e.g. /api/v1/user
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            base_url: None,
            token_file: None,
            command: Commands::Status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert_eq!(cli.base_url, None);
        assert_eq!(cli.token_file, None);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_cli_parse_login() {
        let cli = Cli::try_parse_from(["keywarden", "login"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        if let Commands::Login { no_browser, force } = cli.command {
            assert!(!no_browser);
            assert!(!force);
        } else {
            panic!("Expected Login command");
        }
    }

    #[test]
    fn test_cli_parse_login_no_browser() {
        let cli = Cli::try_parse_from(["keywarden", "login", "--no-browser"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        if let Commands::Login { no_browser, force } = cli.command {
            assert!(no_browser);
            assert!(!force);
        } else {
            panic!("Expected Login command");
        }
    }

    #[test]
    fn test_cli_parse_login_force() {
        let cli = Cli::try_parse_from(["keywarden", "login", "--force"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        if let Commands::Login { no_browser, force } = cli.command {
            assert!(!no_browser);
            assert!(force);
        } else {
            panic!("Expected Login command");
        }
    }

    #[test]
    fn test_cli_parse_logout() {
        let cli = Cli::try_parse_from(["keywarden", "logout"]);
        assert!(cli.is_ok());
        assert!(matches!(cli.unwrap().command, Commands::Logout));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::try_parse_from(["keywarden", "status"]);
        assert!(cli.is_ok());
        assert!(matches!(cli.unwrap().command, Commands::Status));
    }

    #[test]
    fn test_cli_parse_token() {
        let cli = Cli::try_parse_from(["keywarden", "token"]);
        assert!(cli.is_ok());
        assert!(matches!(cli.unwrap().command, Commands::Token));
    }

    #[test]
    fn test_cli_parse_api_default_method() {
        let cli = Cli::try_parse_from(["keywarden", "api", "/api/v1/user"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        if let Commands::Api { method, path, data } = cli.command {
            assert_eq!(method, "GET");
            assert_eq!(path, "/api/v1/user");
            assert_eq!(data, None);
        } else {
            panic!("Expected Api command");
        }
    }

    #[test]
    fn test_cli_parse_api_post_with_data() {
        let cli = Cli::try_parse_from([
            "keywarden",
            "api",
            "--method",
            "POST",
            "/api/v1/items",
            "--data",
            r#"{"name":"x"}"#,
        ]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        if let Commands::Api { method, path, data } = cli.command {
            assert_eq!(method, "POST");
            assert_eq!(path, "/api/v1/items");
            assert_eq!(data, Some(r#"{"name":"x"}"#.to_string()));
        } else {
            panic!("Expected Api command");
        }
    }

    #[test]
    fn test_cli_parse_api_requires_path() {
        let cli = Cli::try_parse_from(["keywarden", "api"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::try_parse_from(["keywarden", "--config", "custom.yaml", "status"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        assert_eq!(cli.config, Some("custom.yaml".to_string()));
    }

    #[test]
    fn test_cli_parse_with_verbose() {
        let cli = Cli::try_parse_from(["keywarden", "-v", "status"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().verbose);
    }

    #[test]
    fn test_cli_parse_global_overrides() {
        let cli = Cli::try_parse_from([
            "keywarden",
            "status",
            "--base-url",
            "https://forge.example.org",
            "--token-file",
            "/tmp/tokens.json",
        ]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        assert_eq!(cli.base_url, Some("https://forge.example.org".to_string()));
        assert_eq!(cli.token_file, Some(PathBuf::from("/tmp/tokens.json")));
    }

    #[test]
    fn test_cli_parse_missing_command() {
        let cli = Cli::try_parse_from(["keywarden"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_invalid_command() {
        let cli = Cli::try_parse_from(["keywarden", "invalid"]);
        assert!(cli.is_err());
    }
}

//! Keywarden - OAuth2 credential manager CLI
//!
#![doc = "Keywarden - OAuth2 credential manager CLI"]
#![doc = "Main entry point for the Keywarden application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keywarden::cli::{Cli, Commands};
use keywarden::commands;
use keywarden::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Login { no_browser, force } => {
            tracing::info!("Starting login flow");
            commands::login::run_login(&config, no_browser, force).await?;
            Ok(())
        }
        Commands::Logout => {
            tracing::info!("Clearing stored credentials");
            commands::logout::run_logout(&config).await?;
            Ok(())
        }
        Commands::Status => {
            commands::status::run_status(&config).await?;
            Ok(())
        }
        Commands::Token => {
            commands::token::run_token(&config).await?;
            Ok(())
        }
        Commands::Api { method, path, data } => {
            tracing::debug!("API passthrough: {} {}", method, path);
            commands::api::run_api(&config, &method, &path, data.as_deref()).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keywarden=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

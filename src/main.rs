//! spotui CLI entry point

use std::sync::Arc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use anyhow::Result;
use spotui::auth::CredentialManager;
use spotui::config::Config;
use spotui::ui;

#[derive(Parser)]
#[command(name = "spotui")]
#[command(about = "🎵 spotui - Spotify in your terminal")]
#[command(version)]
struct Cli {
    /// Callback listener address (e.g. 127.0.0.1:8888, or port 0 for any free port)
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Seconds to wait for browser authorization
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to Spotify, reusing or refreshing a cached token when possible
    Login,

    /// Remove the cached token
    Logout,

    /// Show cached token status
    Status,

    /// Print a valid access token
    Token,

    /// Store Spotify application credentials in the config file
    Configure {
        /// Spotify application client ID
        #[arg(long)]
        client_id: String,

        /// Spotify application client secret
        #[arg(long)]
        client_secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Ctrl+C aborts a pending authorization; a second press exits
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        if on_interrupt.is_cancelled() {
            println!("\n👋 Bye!");
            std::process::exit(130);
        }
        on_interrupt.cancel();
    })
    .ok();

    let cli = Cli::parse();

    let mut config = spotui::config::load()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    match cli.command {
        Commands::Login => run_login(&config, cancel).await?,

        Commands::Logout => {
            let manager = CredentialManager::from_config(&config, cancel)?;
            manager.logout()?;
            ui::print_success("Logged out successfully");
        }

        Commands::Status => {
            let manager = CredentialManager::from_config(&config, cancel)?;
            ui::print_header("Status");
            println!("  Token file:   {:?}", manager.token_path());
            if !manager.has_cached_token() {
                ui::print_warning("No cached token (run 'spotui login')");
                return Ok(());
            }
            match manager.get_token_info() {
                Ok(info) => ui::print_token_info(&info),
                Err(e) => ui::print_error(&format!("Cached token is unreadable: {}", e)),
            }
        }

        Commands::Token => {
            config.validate()?;
            // stdout carries only the token
            let manager = CredentialManager::from_config_with_presenter(
                &config,
                cancel,
                Arc::new(ui::eprint_authorization_prompt),
            )?;
            let token = manager.get_valid_token().await?;
            println!("{}", token.access_token);
        }

        Commands::Configure { client_id, client_secret } => {
            // Start from the file itself so env and flag overrides are not persisted
            let mut stored = spotui::config::load_from(&spotui::config::config_path())?;
            stored.client_id = client_id;
            stored.client_secret = client_secret;
            stored.validate()?;
            spotui::config::save(&stored)?;
            ui::print_success(&format!("Saved credentials to {:?}", spotui::config::config_path()));
        }
    }

    Ok(())
}

async fn run_login(config: &Config, cancel: CancellationToken) -> Result<()> {
    config.validate()?;
    let manager = CredentialManager::from_config(config, cancel)?;

    match manager.get_valid_token().await {
        Ok(token) => {
            println!();
            ui::print_success("Authenticated with Spotify");
            ui::print_token_info(&token.info_at(chrono::Utc::now()));
            ui::print_step(&format!("Token cached at {:?}", manager.token_path()));
            Ok(())
        }
        Err(e) if e.is_retryable_flow_failure() => {
            tracing::warn!("Authorization attempt failed: {}", e);
            ui::print_error("Authentication failed, please retry");
            Err(e.into())
        }
        Err(e) => {
            ui::print_error(&format!("Authentication failed: {}", e));
            Err(e.into())
        }
    }
}

//! chathook - Webhook-backed chat assistant CLI
//!
//! Main entry point: parses arguments, loads configuration, and dispatches
//! to the command handlers.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chathook::cli::{Cli, Commands};
use chathook::commands;
use chathook::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Mirror a CLI store-path override into the environment so the storage
    // initializer picks it up without threading it through every caller.
    if let Some(store_path) = &cli.store_path {
        std::env::set_var("CHATHOOK_STORE_PATH", store_path);
        tracing::info!("Using store path override: {}", store_path);
    }

    // Load and validate configuration
    let config = Config::load(&cli.config)?;
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            resume,
            no_screenshot,
        } => {
            tracing::info!("Starting interactive chat session");
            if let Some(r) = &resume {
                tracing::debug!("Resuming chat: {}", r);
            }
            commands::chat::run_chat(config, resume, no_screenshot).await?;
            Ok(())
        }
        Commands::Send {
            message,
            chat,
            no_screenshot,
        } => {
            tracing::debug!("Sending one-shot message");
            commands::send::run_send(config, message, chat, no_screenshot).await?;
            Ok(())
        }
        Commands::Chats { command } => {
            commands::chats::handle_chats(&config, command)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "chathook=debug"
    } else {
        "chathook=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

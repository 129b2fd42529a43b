//! CRM Pilot entry point.
//!
//! Binary name: `cpilot`
//!
//! Parses CLI arguments, loads configuration, wires the orchestration stack,
//! then either starts the HTTP/WebSocket server or runs a connectivity check
//! against the configured CRM backend.

mod http;
mod state;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;

use crmpilot_core::adapter::CrmAdapter;
use crmpilot_core::inference::IntentProvider;
use state::AppState;

#[derive(Parser)]
#[command(name = "cpilot", version, about = "Conversational CRM assistant server")]
struct Cli {
    /// Path to config.toml (falls back to $CRMPILOT_CONFIG, then ./config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Verify CRM connectivity and database access, then exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "info,crmpilot=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let config_path = crmpilot_infra::config::resolve_config_path(cli.config.as_deref());
    let config = crmpilot_infra::config::load_config(&config_path).await;

    match cli.command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
            let state = AppState::init(config).await?;

            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, adapter = state.adapter.name(), provider = state.provider.name(), "crmpilot listening");

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            tracing::info!("server stopped");
        }

        Commands::Check => {
            let state = AppState::init(config).await?;
            let result = state.adapter.test_connection().await?;
            println!("{} ({})", result.message, state.adapter.name());
            if !result.success {
                anyhow::bail!("CRM connectivity check failed");
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::timeout;
use tracing::{error, info};

use ig_tokend::accounts::manager::{TokenManager, SHUTDOWN_TIMEOUT};
use ig_tokend::config::loader::{load_config, DEFAULT_CONFIG_PATH};
use ig_tokend::persist::ConfigStore;
use ig_tokend::refresh::client::GraphApiClient;
use ig_tokend::server;
use ig_tokend::utils::logging::{self, LogLevel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh one account's token right now and rewrite the config file.
    Refresh { account_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Parse args, set up logging
    // -------------------------------

    let args = Args::parse();
    logging::init(args.log_level);

    // -------------------------------
    // 2. Load and validate JSON config
    // -------------------------------

    let config = load_config(&args.config)
        .with_context(|| format!("loading config from {}", args.config))?;

    // -------------------------------
    // 3. Build the token manager
    // -------------------------------

    let store = ConfigStore::new(&args.config);
    let refresher = Arc::new(GraphApiClient::new());
    let manager = Arc::new(TokenManager::new(
        config.settings(),
        &config.accounts,
        refresher,
        store,
    ));

    match args.command {
        Some(Command::Refresh { account_id }) => {
            // One synchronous refresh, no retry loop; cron-style maintenance.
            manager
                .manual_refresh(&account_id)
                .await
                .with_context(|| format!("refreshing token for account {account_id}"))?;
            info!(account = %account_id, "Successfully refreshed token");
            Ok(())
        }
        None => serve(manager).await,
    }
}

/// Long-running mode: arm the refresh timers, serve the read endpoint and
/// block until a termination signal triggers graceful shutdown.
async fn serve(manager: Arc<TokenManager>) -> Result<()> {
    manager.start_scheduled_refreshes().await;

    let port = manager.settings().port.clone();
    let shutdown = manager.shutdown_token();
    let mut http_server = tokio::spawn(server::server::start(
        Arc::clone(&manager),
        port,
        shutdown,
    ));

    select! {
        _ = wait_for_termination() => {}
        result = &mut http_server => {
            // The server only returns before a signal on a startup failure
            // (e.g. the port is taken).
            return match result {
                Ok(outcome) => outcome.context("http server failed"),
                Err(e) => Err(e).context("http server task panicked"),
            };
        }
    }

    let drained = timeout(SHUTDOWN_TIMEOUT, async {
        manager.shutdown().await;
        let _ = http_server.await;
    })
    .await;

    if drained.is_err() {
        error!("shutdown deadline exceeded, terminating");
        std::process::exit(1);
    }

    info!("shutdown complete");
    Ok(())
}

async fn wait_for_termination() {
    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    select! {
        _ = sigint.recv() => {
            info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM. Initiating graceful shutdown...");
        }
    }
}

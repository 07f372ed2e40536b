//! fedipush-relay binary entry point.
//!
//! Usage:
//! ```bash
//! fedipush-relay --config bridge.toml
//! RUST_LOG=fedipush_relay=debug fedipush-relay --log-json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fedipush_relay::cleanup::spawn_cleanup_task;
use fedipush_relay::config::Config;
use fedipush_relay::http::{build_router, health::init_start_time};
use fedipush_relay::instance::MastodonClient;
use fedipush_relay::provider::{FcmProvider, ServiceAccount};
use fedipush_relay::server::PushBridge;
use fedipush_relay::storage::SqliteKv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Web Push to FCM bridge for Mastodon-compatible instances.
#[derive(Parser, Debug)]
#[command(name = "fedipush-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "bridge.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    tracing::warn!("Config file {} not found, using defaults", path.display());
    let config = Config::default();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;
    init_start_time();

    let account = ServiceAccount::load(&config.fcm)
        .context("Failed to load FCM service account")?
        .with_context(|| {
            format!(
                "No FCM service account: set {} or fcm.service_account_path",
                config.fcm.service_account_env
            )
        })?;
    tracing::info!(project_id = %account.project_id, "Loaded FCM service account");
    let provider = FcmProvider::install(FcmProvider::new(account)?)?;

    let kv = SqliteKv::new(&config.storage.database)
        .await
        .with_context(|| format!("Failed to open {}", config.storage.database.display()))?;
    let instance = MastodonClient::new()?;

    let bind_address = config.server.bind_address.clone();
    let cleanup_config = config.cleanup.clone();
    let bridge = Arc::new(PushBridge::new(
        config,
        Arc::new(kv),
        Arc::new(instance),
        provider,
    )?);

    let _cleanup = spawn_cleanup_task(Arc::clone(&bridge), cleanup_config);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!("fedipush-relay v{} listening on {}", env!("CARGO_PKG_VERSION"), bind_address);

    axum::serve(listener, build_router(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

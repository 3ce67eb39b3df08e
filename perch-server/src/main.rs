// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Perch: plugin dispatch and rate governance
//
//  HTTP surface:  axum on the tokio multi-threaded runtime
//  Backends:      streaming sessions first, unary HTTP plugins second
//  Config:        YAML file + PERCH_* environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use perch_api::{ApiState, build_router};
use perch_core::PerchConfig;
use perch_core::config::LogFormat;
use perch_dispatch::{DispatchSettings, Dispatcher, Registries};
use perch_limiter::RateLimiter;
use perch_observability::metrics::MetricsCollector;
use perch_plugin::loader::load_declared;
use perch_plugin::registry::{MemoryStreamRegistry, MemoryUiRegistry, MemoryUnaryRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "perch", version, about = "Perch plugin dispatch and rate governance")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/perch/perch.yaml")]
    config: PathBuf,

    /// Log level (overrides `logging.level`; `RUST_LOG` overrides both)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration, print it, and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ──
    // A missing file is not an error: defaults plus env overrides apply.
    let config_exists = cli.config.exists();
    let config = PerchConfig::load(&cli.config)?;

    if cli.check {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    // ── Tracing ──
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Perch starting");
    if config_exists {
        info!(path = %cli.config.display(), "Config file loaded");
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
    }

    // ── Registries ──
    let streaming = MemoryStreamRegistry::new();
    let unary = MemoryUnaryRegistry::new();
    let ui = MemoryUiRegistry::new();
    let loaded = load_declared(&config.plugins, &unary, &ui);
    info!(plugins = loaded, "Plugin registries ready");

    // ── Limiter & metrics ──
    let limiter = Arc::new(RateLimiter::with_capacity(
        config.limiter.shards,
        config.limiter.shard_capacity,
    ));
    let metrics = Arc::new(MetricsCollector::new(config.observability.metrics.enabled)?);

    // ── Dispatcher ──
    let settings = DispatchSettings::from_config(&config.dispatch)?;
    let dispatcher = Arc::new(Dispatcher::new(
        Registries::new(Arc::new(streaming), Arc::new(unary), Arc::new(ui)),
        limiter,
        metrics.clone(),
        settings,
    ));

    // ── HTTP surface ──
    let state = ApiState::new(dispatcher, metrics, config.dispatch.max_body_bytes);
    let app = build_router(state, &config.observability.metrics.path);

    info!(addr = %config.server.addr, "Perch is ready, serving traffic");
    perch_api::serve(&config.server.addr, app, shutdown_signal()).await?;

    info!("Perch stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}

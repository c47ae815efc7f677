//! zqa-ts - ZIP quality analysis task service
//!
//! Accepts ZIP uploads over HTTP, analyzes them in the background and serves
//! the resulting reports.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};
use zqa_common::config::{BlobBackend, ConfigOverrides, ServiceConfig};
use zqa_ts::api::StaticTokenAuthenticator;
use zqa_ts::db::SqliteTaskStore;
use zqa_ts::services::{BlobStore, FsBlobStore, MemoryBlobStore, StubAnalyzer, TaskService, UploadPolicy};
use zqa_ts::{build_router, AppState};

/// Command-line arguments for zqa-ts
#[derive(Parser, Debug)]
#[command(name = "zqa-ts")]
#[command(about = "ZIP quality analysis task service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "ZQA_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(long, env = "ZQA_BIND_ADDR")]
    bind_addr: Option<String>,

    /// SQLite database file
    #[arg(long, env = "ZQA_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Archive storage backend: fs or memory
    #[arg(long, env = "ZQA_BLOB_BACKEND")]
    blob_backend: Option<BlobBackend>,

    /// Directory for the fs blob backend
    #[arg(long, env = "ZQA_BLOB_ROOT")]
    blob_root: Option<PathBuf>,

    /// Upload size cap in bytes
    #[arg(long, env = "ZQA_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<u64>,

    /// Accepted bearer tokens, comma separated (empty disables auth)
    #[arg(long, env = "ZQA_AUTH_TOKENS", value_delimiter = ',')]
    auth_tokens: Option<Vec<String>>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "ZQA_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            bind_addr: self.bind_addr.clone(),
            database_path: self.database_path.clone(),
            blob_backend: self.blob_backend,
            blob_root: self.blob_root.clone(),
            max_upload_bytes: self.max_upload_bytes,
            auth_tokens: self.auth_tokens.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

/// RUST_LOG wins; otherwise the configured level
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Start with the CLI/env level; the TOML level is applied once loaded
    let (filter, filter_handle) =
        reload::Layer::new(env_filter(args.log_level.as_deref().unwrap_or("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    info!(
        "Starting zqa-ts v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = ServiceConfig::resolve(&args.overrides()).context("Invalid configuration")?;
    if let Err(e) = filter_handle.reload(env_filter(&config.log_level)) {
        warn!("Could not apply log level '{}': {}", config.log_level, e);
    }

    info!("Database path: {}", config.database_path.display());
    let pool = zqa_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let blobs: Arc<dyn BlobStore> = match config.blob_backend {
        BlobBackend::Fs => Arc::new(
            FsBlobStore::open(&config.blob_root)
                .await
                .context("Failed to open blob store")?,
        ),
        BlobBackend::Memory => {
            warn!("Using in-memory blob store - archives are lost on restart");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let service = TaskService::new(
        Arc::new(SqliteTaskStore::new(pool)),
        blobs,
        Arc::new(StubAnalyzer),
        UploadPolicy::from_config(&config),
    );

    match service.recover().await {
        Ok(report) => info!(
            failed = report.failed,
            rescheduled = report.rescheduled,
            "Startup recovery complete"
        ),
        Err(e) => error!("Startup recovery failed: {}", e),
    }

    let authenticator = StaticTokenAuthenticator::new(config.auth_tokens.clone());
    if authenticator.is_enabled() {
        info!("API authentication enabled ({} tokens)", config.auth_tokens.len());
    } else {
        info!("API authentication disabled (no tokens configured)");
    }

    let state = AppState::new(service.clone(), Arc::new(authenticator));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("zqa-ts listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.scheduler().shutdown().await;
    info!("zqa-ts stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received - draining requests");
}

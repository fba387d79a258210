//! memod: build-cache metadata server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use memo_core::config::{AppConfig, MetadataBackendConfig, StorageConfig};
use memo_metadata::{ContentSession, ObjectStoreContentSession};
use memo_server::{AppState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// memod - memoization metadata service for a distributed build cache
#[derive(Parser, Debug)]
#[command(name = "memod")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MEMO_CONFIG", default_value = "config/memod.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("memod v{}", env!("CARGO_PKG_VERSION"));

    // Defaults, then the optional file, then MEMO_ environment variables.
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::warn!(
            config_path = %args.config,
            "No config file found, using defaults and environment"
        );
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("MEMO_").ignore(&["config"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    if let MetadataBackendConfig::Blob(topology) = &config.metadata
        && topology
            .accounts
            .iter()
            .any(|a| matches!(a.storage, StorageConfig::Memory))
    {
        tracing::warn!("Metadata accounts use in-memory storage; records are lost on restart");
    }

    memo_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let store = memo_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    // Fail before accepting requests if any account is unreachable.
    store
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!(
        backend = store.backend_name(),
        namespace = store.namespace(),
        "Metadata store initialized"
    );

    let content_storage = memo_storage::from_config(&config.content)
        .await
        .context("failed to initialize content storage")?;
    content_storage
        .health_check()
        .await
        .context("content storage health check failed")?;
    let content: Arc<dyn ContentSession> =
        Arc::new(ObjectStoreContentSession::new(content_storage));
    tracing::info!("Content storage initialized");

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .context("invalid bind address")?;
    let state = AppState::new(config, store, content);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

//! Kennel server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use kennel_core::config::AppConfig;
use kennel_server::bootstrap::ensure_admin_token;
use kennel_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Kennel - storage maintenance and archive export for the dog portal
#[derive(Parser, Debug)]
#[command(name = "kenneld")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "KENNEL_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Kennel v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();
    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // KENNEL_CONFIG only names the file, it is not configuration itself
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("KENNEL_") && key != "KENNEL_CONFIG");
    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: kenneld --config /path/to/config.toml\n  \
             2. Environment variables: KENNEL_SERVER__BIND=0.0.0.0:8080 \
             KENNEL_STORAGE__TYPE=filesystem \
             KENNEL_STORAGE__PATH=/var/lib/kennel/storage kenneld\n\n\
             See config/server.example.toml for example configuration.\n\
             Set KENNEL_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("KENNEL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Warnings are logged by AppState::new
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    kennel_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = kennel_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Verify storage connectivity before accepting requests.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let metadata = kennel_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    match &config.admin {
        Some(admin) => ensure_admin_token(metadata.as_ref(), admin).await?,
        None => tracing::warn!("No admin token configured; export and prune need an existing token"),
    }

    let bind = config.server.bind.clone();
    let state = AppState::new(config, storage, metadata);
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

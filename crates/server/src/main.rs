//! Chorus creator node binary.

use anyhow::{Context, Result};
use chorus_chain::{ChainClient, MockChainClient};
use chorus_coord::{CoordStore, MemoryCoordStore};
use chorus_core::config::AppConfig;
use chorus_server::snapback::Snapback;
use chorus_server::sync::{SYNC_TASK, executor};
use chorus_server::{AppState, bootstrap, create_router, skipped};
use chorus_signer::{KeyPair, RequestSigner};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chorus - a creator node for a decentralized music-distribution network
#[derive(Parser, Debug)]
#[command(name = "chorusd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CHORUS_CONFIG", default_value = "config/node.toml")]
    config: String,
}

/// Sp id the node assigns itself on the in-memory oracle in dev mode.
const DEV_SP_ID: u64 = 1;

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

    tracing::info!("Chorus v{}", env!("CARGO_PKG_VERSION"));

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

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("CHORUS_") && key != "CHORUS_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: chorusd --config /path/to/node.toml\n  \
             2. Environment variables: CHORUS_NODE__CREATOR_NODE_ENDPOINT=https://cn1.example.com \
             chorusd\n\n\
             See config/node.example.toml for example configuration.\n\
             Set CHORUS_CONFIG to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CHORUS_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize content storage
    let storage = chorus_storage::from_config(&config.storage)
        .await
        .context("failed to initialize content storage")?;
    storage
        .health_check()
        .await
        .context("content storage health check failed")?;
    tracing::info!("Content storage initialized");

    // Initialize metadata store
    let metadata = chorus_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    // Initialize the coordination store and its expiry sweep
    let coord = Arc::new(MemoryCoordStore::new());
    let _coord_cleanup = coord.clone().spawn_cleanup_task(Duration::from_secs(60));
    let coord: Arc<dyn CoordStore> = coord;

    // Delegate key
    let keypair = match &config.node.delegate_private_key {
        Some(secret_hex) => {
            KeyPair::from_secret_hex(secret_hex).context("invalid delegate_private_key")?
        }
        None if config.node.dev_mode => {
            tracing::warn!("Generating ephemeral delegate key (dev mode only)");
            KeyPair::generate()
        }
        None => anyhow::bail!("node.delegate_private_key is required outside dev mode"),
    };
    let signer = RequestSigner::new(keypair);

    // Chain oracle. The production chain client is linked in by the
    // deployment embedding this crate; the binary itself ships the
    // in-memory oracle for locally wired dev clusters.
    let chain: Arc<dyn ChainClient> = if config.node.dev_mode {
        let mock = MockChainClient::new();
        mock.add_service_provider(
            DEV_SP_ID,
            &config.node.creator_node_endpoint,
            &signer.public_key_hex(),
        )
        .await;
        mock.set_registry_deployed(true).await;
        Arc::new(mock)
    } else {
        anyhow::bail!(
            "no chain client configured; run with node.dev_mode = true or embed a chain client"
        );
    };

    // Create application state
    let state = AppState::new(config.clone(), metadata, storage, coord, chain, signer);

    // Register the sync job processor
    let sync_state = state.clone();
    state
        .queue
        .process(SYNC_TASK, config.sync.max_concurrency, move |job| {
            let state = sync_state.clone();
            async move { executor::handle_sync_job(state, job).await }
        })
        .await;
    tracing::info!(
        concurrency = config.sync.max_concurrency,
        "Sync job processor registered"
    );

    // Identity bootstrap gates all chain-dependent surfaces
    let _bootstrap = bootstrap::spawn(state.clone());

    // Background controllers
    let _snapback = Snapback::new(state.clone()).spawn();
    tracing::info!(
        interval_ms = config.snapback.interval_ms,
        "Snapback controller spawned"
    );
    let _skipped_retry = skipped::spawn(state.clone());
    tracing::info!(
        interval_secs = config.sync.skipped_retry_interval_secs,
        "Skipped-file retry loop spawned"
    );

    // Create router
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Wallet Pass Update Server
//!
//! Serves the Apple Wallet web service endpoints for previously issued
//! passes, wakes registered devices with silent pushes when pass content
//! changes, and runs the drip-campaign scheduler.

use clap::Parser;
use passkit_core::{CredentialPool, DripScheduler, Store, UpdateNotifier};
use passkit_server::{apns, config, server, signer, tick};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "passkit-server", about = "Apple Wallet pass update server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "passkit.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(short, long)]
    listen: Option<String>,

    /// Database path override
    #[arg(short, long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        config::ServerConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        config::ServerConfig::default()
    };

    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }
    if let Some(database) = cli.database {
        cfg.database_path = database;
    }

    tracing::info!("Starting pass update server on {}", cfg.listen_addr);

    let store = Store::open(&cfg.database_path)?;
    let credentials = CredentialPool::new(store.clone());
    let gateway = Arc::new(apns::ApnsClient::new(
        &cfg.apns_production_url,
        &cfg.apns_sandbox_url,
    )?);
    let notifier = Arc::new(UpdateNotifier::new(gateway, cfg.max_concurrent_pushes));
    let serializer = Arc::new(signer::HttpPassSerializer::new(&cfg.signer_url)?);

    let scheduler = Arc::new(DripScheduler::new(
        store.clone(),
        credentials.clone(),
        notifier,
    ));
    tick::spawn_scheduler_task(scheduler, cfg.scheduler_interval_secs);

    let state = server::AppState {
        store,
        credentials,
        serializer,
        web_service_url: cfg.web_service_url.clone(),
    };
    let app = server::build_router(state, &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

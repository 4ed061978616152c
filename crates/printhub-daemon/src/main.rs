//! PrintHub Daemon
//!
//! The hub bridges a local 3D-printer fleet to the cloud control plane:
//! per-printer MQTT sessions feed a unified status model, and a single
//! WebSocket tunnel carries status upstream and commands downstream.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use printhub_core::settings::Settings;
use printhub_daemon::hub::HubContext;
use printhub_daemon::provisioning;
use printhub_daemon::storage::{ConfigStore, HubIdentity, NS_TUNNEL};
use printhub_daemon::tunnel::{TunnelClient, TunnelConfig};

/// Cadence of the fleet housekeeping tick.
const FLEET_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "printhub-daemon")]
#[command(version, about = "PrintHub daemon - 3D-printer fleet coordinator")]
struct Args {
    /// Data directory for the persistent config store
    #[arg(long, env = "PRINTHUB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Cloud base URL for provisioning (ws://, wss://, http://, or https://)
    #[arg(long, env = "PRINTHUB_CLOUD_URL")]
    cloud_url: Option<String>,

    /// Tenant id for provisioning
    #[arg(long, env = "PRINTHUB_TENANT_ID")]
    tenant_id: Option<String>,

    /// Claim token for provisioning
    #[arg(long, env = "PRINTHUB_CLAIM_TOKEN")]
    claim_token: Option<String>,

    /// Explicit hub id, overriding the derived identity
    #[arg(long, env = "PRINTHUB_HUB_ID")]
    hub_id: Option<String>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "PRINTHUB_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "PRINTHUB_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("printhub_daemon={}", args.log_level);
    printhub_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting printhub-daemon"
    );

    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let settings = Settings::load(&data_dir)?;
    let store = ConfigStore::open(&data_dir.join("hub.db")).await?;

    if let Some(hub_id) = &args.hub_id {
        store
            .namespace(NS_TUNNEL)
            .put_string("hub_id", hub_id)
            .await?;
    }

    let hub = Arc::new(HubContext::new(store.clone()));

    // Command-line provisioning: a complete tenant binding rewrites the
    // stored tuple before the tunnel starts.
    if let (Some(tenant_id), Some(claim_token)) = (&args.tenant_id, &args.claim_token) {
        let api_url = args
            .cloud_url
            .clone()
            .unwrap_or_else(|| settings.cloud_url.clone());
        let payload = serde_json::json!({
            "tenant_id": tenant_id,
            "claim_token": claim_token,
            "api_url": api_url,
        })
        .to_string();
        match provisioning::apply_cloud_config(&hub, &payload).await {
            Ok(()) => info!("Cloud binding provisioned from command line"),
            Err(e) => warn!(error = %e, "Command-line provisioning failed"),
        }
    }

    let identity = HubIdentity::load_or_derive(&store).await?;
    info!(hub_id = %identity.hub_id, mac = %identity.mac_address, "Hub identity ready");

    hub.fleet.lock().await.load_all().await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Fleet housekeeping: adapter poll plus the periodic temperature summary.
    let fleet_hub = Arc::clone(&hub);
    let mut fleet_shutdown = shutdown_tx.subscribe();
    let fleet_handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(FLEET_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    fleet_hub.fleet.lock().await.poll_all();
                }
                _ = fleet_shutdown.changed() => {
                    return;
                }
            }
        }
    });

    let tunnel_config = TunnelConfig::new(&identity, &settings);
    let tunnel_hub = Arc::clone(&hub);
    let tunnel_handle = tokio::spawn(async move {
        let client = TunnelClient::new(tunnel_config, tunnel_hub);
        client.run(shutdown_rx).await;
    });

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tunnel_handle.await;
    let _ = fleet_handle.await;

    // Drop every printer session before the runtime goes away.
    hub.fleet.lock().await.shutdown().await;

    info!("Daemon stopped");
    Ok(())
}

/// Default data directory: ~/.printhub/
fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".printhub"))
}

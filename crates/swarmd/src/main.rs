//! swarmd: swarm node daemon.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};

use swarm_core::config::SwarmConfig;
use swarm_core::crypto::make_key;
use swarm_core::node::outbound_ip;
use swarm_services::runtime::{self, NodeSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = SwarmConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = SwarmConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SwarmConfig::default()
    });

    let listen_ip: IpAddr = config
        .network
        .listen_address
        .parse()
        .with_context(|| format!("bad listen address {:?}", config.network.listen_address))?;
    let listen = SocketAddr::new(listen_ip, config.network.local_port);

    let advertise_address = if config.network.advertise_address.is_empty() {
        match outbound_ip() {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "could not find outbound address, advertising bind address");
                String::new()
            }
        }
    } else {
        config.network.advertise_address.clone()
    };

    let mut settings = NodeSettings::new(
        listen,
        make_key(&config.security.passphrase),
        config.share_dir(),
        config.parts_dir(),
    );
    settings.advertise_address = advertise_address;
    settings.bootstrap = config.bootstrap_node();

    tracing::info!(
        base = %config.base_dir().display(),
        bootstrap = ?settings.bootstrap,
        "swarmd starting"
    );

    let mut node = runtime::start(settings).await?;

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        }
        Some(task) = node.any_exited() => tracing::error!(task, "task exited unexpectedly"),
    }

    node.shutdown();
    node.join().await;
    Ok(())
}

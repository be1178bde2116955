//! # Discovery Node
//!
//! Runs a discovery v4 service on its own: binds the UDP endpoint, joins
//! through the configured bootnodes and logs every peer that proves
//! liveness.
//!
//! ## Startup Sequence
//!
//! 1. Load settings (TOML file, then command line overrides)
//! 2. Load or generate the identity key
//! 3. Bind the UDP socket
//! 4. Build the service (bootnodes, node store, penalty sink)
//! 5. Serve until Ctrl+C, then save the node table

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use disc_v4::adapters::{JsonNodeStore, NodeSettings, SystemTimeSource, TomlConfigProvider, UdpTransport};
use disc_v4::codec::generate_key;
use disc_v4::ports::ConfigProvider;
use disc_v4::{DiscoveryService, Enode, PeerPenalization, VerifiedPeer};

/// Discovery v4 node
#[derive(Parser, Debug)]
#[command(name = "disc-node")]
#[command(about = "Kademlia-style UDP peer discovery node")]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP listen address, overrides the settings file
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Advertised IP, overrides the settings file
    #[arg(long)]
    external_ip: Option<IpAddr>,

    /// Extra bootnode URL (enode://<id>@<ip>:<port>), repeatable
    #[arg(short, long = "bootnode")]
    bootnodes: Vec<String>,

    /// Node table snapshot, overrides the settings file
    #[arg(long)]
    node_db: Option<PathBuf>,
}

fn load_settings(args: Args) -> Result<TomlConfigProvider> {
    let mut settings = match &args.config {
        Some(path) => TomlConfigProvider::load(path)
            .with_context(|| format!("loading {}", path.display()))?
            .into_settings(),
        None => NodeSettings::default(),
    };
    if let Some(listen) = args.listen {
        settings.listen_addr = listen;
    }
    if let Some(ip) = args.external_ip {
        settings.external_ip = Some(ip);
    }
    if let Some(path) = args.node_db {
        settings.node_db_path = Some(path);
    }
    settings.bootnodes.extend(args.bootnodes);
    TomlConfigProvider::from_settings(settings).context("invalid bootnode")
}

async fn log_verified(mut verified: broadcast::Receiver<VerifiedPeer>) {
    loop {
        match verified.recv().await {
            Ok(peer) => info!(node_id = %peer.node_id, addr = %peer.address, "discovered peer"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "verified peer stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn log_penalties(mut penalties: mpsc::Receiver<PeerPenalization>) {
    while let Some(penalization) = penalties.recv().await {
        info!(%penalization, "peer penalized");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let provider = load_settings(Args::parse())?;
    let settings = provider.settings();
    let config = settings.discovery.clone();

    let key = match settings.signing_key().context("reading private_key")? {
        Some(key) => key,
        None => {
            warn!("no private_key configured, using a fresh identity");
            generate_key()
        }
    };

    let transport = Arc::new(
        UdpTransport::bind(settings.listen_addr, config.max_packet_size)
            .await
            .context("binding discovery socket")?,
    );

    let (penalty_tx, penalty_rx) = mpsc::channel(config.event_channel_capacity.max(1));
    let mut builder = DiscoveryService::builder(key, settings.advertised_address(), config)
        .bootnodes(provider.bootnodes())
        .penalty_sink(penalty_tx);
    if let Some(path) = &settings.node_db_path {
        builder = builder.node_store(Arc::new(JsonNodeStore::new(path.clone())));
    }
    let service = builder
        .build(transport.clone(), Arc::new(SystemTimeSource::new()))
        .context("starting discovery")?;

    let enode = Enode {
        node_id: service.local_id(),
        address: service.local_address(),
    };
    info!(%enode, "local node");

    tokio::spawn(log_verified(service.subscribe_verified()));
    tokio::spawn(log_penalties(penalty_rx));

    let server = tokio::spawn({
        let service = service.clone();
        async move { service.run(transport).await }
    });

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    service.shutdown();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(reason = %err, "discovery stopped with error"),
        Err(err) => error!(reason = %err, "discovery task panicked"),
    }
    Ok(())
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! CID Relay - Contact-ID device event server
//!
//! Accepts alarm device sessions, rewrites and validates their Contact-ID
//! frames, keeps bounded per-device and global histories and forwards every
//! accepted frame to an upstream receiver.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use cid_relay::relay::UpstreamClient;
use cid_relay::{Config, DeliveryQueue, DeviceServer, LogBuffer, QueryFacade, ServerCore, VERSION};

/// CID Relay - Contact-ID device event server
#[derive(Parser, Debug)]
#[command(name = "cid-relay")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Contact-ID device event server with upstream relay")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device listener port
    #[arg(short, long)]
    port: Option<u16>,

    /// Device listener bind address
    #[arg(long)]
    bind: Option<String>,

    /// Upstream receiver as host:port
    #[arg(long)]
    upstream: Option<String>,

    /// Acknowledge frames locally instead of relaying them
    #[arg(long)]
    no_relay: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn parse_upstream(value: &str) -> Result<(String, u16)> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("upstream must be host:port, got {:?}", value))?;
    let port = port
        .parse()
        .map_err(|_| anyhow!("invalid upstream port {:?}", port))?;
    Ok((host.to_string(), port))
}

fn apply_args(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(upstream) = &args.upstream {
        let (host, port) = parse_upstream(upstream)?;
        config.relay.host = host;
        config.relay.port = port;
        config.relay.enabled = true;
    }
    if args.no_relay {
        config.relay.enabled = false;
    }
    if args.trace {
        config.log_level = "trace".to_string();
    } else if args.debug {
        config.log_level = "debug".to_string();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    apply_args(&mut config, &args)?;
    config.validate()?;

    let logs = LogBuffer::new(config.history.log_capacity);
    cid_relay::logging::init(&config.log_level, logs.clone())?;

    info!("{} v{} - Contact-ID device event server", config.app_name, VERSION);
    info!("Configuration loaded from {:?}", config_path);

    let core = ServerCore::new(&config.history, config.admission.clone());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let relay = if config.relay.enabled {
        let (handle, queue) = DeliveryQueue::channel(config.relay.buffer_size, config.relay.reply_timeout());
        info!("Relaying to upstream {}", config.relay.address());
        let client = UpstreamClient::new(config.relay.clone(), queue);
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = client.run(shutdown).await {
                error!("Upstream client failed: {}", e);
            }
        });
        Some(handle)
    } else {
        None
    };

    let query = QueryFacade::new(core.clone(), logs, relay.clone());

    let server = DeviceServer::bind(&config.server, config.rules.clone(), core.clone(), relay).await?;
    let server_task = tokio::spawn(server.run(shutdown_tx.subscribe()));

    if config.stats_interval_secs > 0 {
        let query = query.clone();
        let mut shutdown = shutdown_tx.subscribe();
        let period = Duration::from_secs(config.stats_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => log_stats(&query),
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    if let Err(e) = server_task.await? {
        error!("Device server failed: {}", e);
    }

    log_stats(&query);
    info!("CID Relay shutdown complete");

    Ok(())
}

fn log_stats(query: &QueryFacade) {
    let stats = query.get_stats();
    info!(
        "Stats: accepted={} rejected={} reconnects={} uptime={} devices={}",
        stats.accepted,
        stats.rejected,
        stats.reconnects,
        stats.uptime,
        query.get_devices().len()
    );
    if let Some(relay) = query.get_relay_stats() {
        info!(
            "Relay: delivered={} refused={} queued={} upstream_reconnects={}",
            relay.delivered, relay.refused, relay.queued, relay.upstream_reconnects
        );
    }
}

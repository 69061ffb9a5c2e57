// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! lanshare node
//!
//! Discovers other nodes on the local network via UDP broadcast and
//! exchanges files over TCP once a transfer is confirmed.
//!
//! # Usage
//!
//! ```bash
//! # Start a node on the default ports
//! p2p-node
//!
//! # Custom name and transfer port, auto-accepting every offer
//! p2p-node --name laptop --port 12005 --auto-accept
//!
//! # Load settings from a config file
//! p2p-node --config node.json
//! ```

use clap::Parser;
use p2p_core::node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod repl;

use config::NodeConfig;

/// LAN peer discovery and file transfer node.
#[derive(Parser, Debug)]
#[command(name = "p2p-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Display name advertised in heartbeats
    #[arg(short, long)]
    name: Option<String>,

    /// TCP port to listen on for incoming transfers
    #[arg(short, long)]
    port: Option<u16>,

    /// UDP port used for discovery broadcasts
    #[arg(long)]
    broadcast_port: Option<u16>,

    /// Directory received files are written to
    #[arg(short, long)]
    download_dir: Option<String>,

    /// Accept every inbound file offer automatically
    #[arg(long, default_value = "false")]
    auto_accept: bool,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load or create config
    let mut node_config = if let Some(config_path) = &args.config {
        info!("loading config from {:?}", config_path);
        NodeConfig::from_file(config_path)?
    } else {
        NodeConfig::default()
    };

    if let Some(name) = args.name {
        node_config.name = Some(name);
    }
    if let Some(port) = args.port {
        node_config.port = Some(port);
    }
    if let Some(broadcast_port) = args.broadcast_port {
        node_config.broadcast_port = broadcast_port;
    }
    if let Some(download_dir) = args.download_dir {
        node_config.download_dir = download_dir;
    }
    node_config.auto_accept = node_config.auto_accept || args.auto_accept;
    node_config.validate()?;

    let node = Arc::new(
        Node::start(
            node_config.name.clone(),
            node_config.port,
            node_config.broadcast_port,
            PathBuf::from(&node_config.download_dir),
        )
        .await?,
    );

    info!("+----------------------------------------------------+");
    info!("|  lanshare node                                      |");
    info!("+----------------------------------------------------+");
    info!("|  Name:      {:40} |", node.identity.name);
    info!(
        "|  Address:   {:40} |",
        format!("{}:{}", node.identity.ip, node.identity.port)
    );
    info!("|  Broadcast: {:40} |", node_config.broadcast_port);
    info!("|  Downloads: {:40} |", node_config.download_dir);
    info!("+----------------------------------------------------+");

    let confirm_node = node.clone();
    let confirm_task = if node_config.auto_accept {
        tokio::spawn(repl::auto_accept_loop(confirm_node))
    } else {
        tokio::spawn(repl::prompt_loop(confirm_node))
    };

    let progress_node = node.clone();
    let progress_task = tokio::spawn(repl::progress_loop(progress_node));

    let repl_node = node.clone();
    tokio::select! {
        result = repl::run(repl_node) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
    confirm_task.abort();
    progress_task.abort();

    info!("shutting down");
    match Arc::try_unwrap(node) {
        Ok(node) => node.stop().await,
        Err(_) => tracing::warn!("node still referenced at shutdown, skipping graceful stop"),
    }

    Ok(())
}

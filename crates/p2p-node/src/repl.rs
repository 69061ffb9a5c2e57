// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal line-oriented control surface for a running node: list peers,
//! send a file, and answer (or auto-answer) inbound offers.

use p2p_core::confirmation::Verdict;
use p2p_core::error::{LookupError, TransferError};
use p2p_core::transfer::sender::send_file;
use p2p_core::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Drain confirmation prompts forever, auto-accepting every offer.
/// Spawned only when the node is started with `--auto-accept`.
pub async fn auto_accept_loop(node: Arc<Node>) {
    while let Some((id, offer)) = node.confirmations.next_prompt().await {
        tracing::info!(
            "auto-accepting {} ({} bytes) from {}",
            offer.filename,
            offer.size,
            offer.peer.name
        );
        node.confirmations.resolve(id, Verdict::Accept);
    }
}

/// Drain the progress broadcast channel forever, printing one line per
/// event so transfers are visible while they stream. A lagged receiver
/// (too many events between polls) just skips ahead; progress reporting
/// is best-effort, not an audit log.
pub async fn progress_loop(node: Arc<Node>) {
    let mut rx = node.progress_stream();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let pct = if event.total == 0 {
                    100
                } else {
                    event.bytes * 100 / event.total
                };
                println!(
                    "[progress] session {} {:?} {}/{} ({pct}%)",
                    event.session_id, event.direction, event.bytes, event.total
                );
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Print each inbound offer as it arrives and wait for an `accept <id>` /
/// `reject <id>` command from the REPL to resolve it. Spawned instead of
/// `auto_accept_loop` when prompting is enabled.
pub async fn prompt_loop(node: Arc<Node>) {
    while let Some((id, offer)) = node.confirmations.next_prompt().await {
        println!(
            "[{id}] incoming: {} ({} bytes, md5 {}) from {} -- `accept {id}` or `reject {id}`",
            offer.filename, offer.size, offer.md5, offer.peer.name
        );
    }
}

/// Read commands from stdin until `quit`/`exit` or EOF.
pub async fn run(node: Arc<Node>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("commands: peers | send <name> <path> | accept <id> | reject <id> | quit");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("quit") | Some("exit") => break,
            Some("peers") => print_peers(&node),
            Some("send") => {
                let (Some(name), Some(path)) = (parts.next(), parts.next()) else {
                    println!("usage: send <peer-name> <file-path>");
                    continue;
                };
                match dispatch_send(&node, name, path).await {
                    Ok(()) => println!("sent {path} to {name}"),
                    Err(e) => println!("send to {name} failed: {e}"),
                }
            }
            Some("accept") => resolve_prompt(&node, parts.next(), Verdict::Accept),
            Some("reject") => resolve_prompt(&node, parts.next(), Verdict::Reject),
            Some(other) => println!("unknown command: {other}"),
            None => {}
        }
    }
    Ok(())
}

fn print_peers(node: &Node) {
    let snapshot = node.peers.snapshot();
    if snapshot.is_empty() {
        println!("no peers discovered yet");
        return;
    }
    for record in snapshot {
        println!(
            "{}\t{}:{}\t{}",
            record.identity.name, record.identity.ip, record.identity.port, record.identity.os
        );
    }
}

async fn dispatch_send(node: &Node, name: &str, path: &str) -> Result<(), TransferError> {
    let peer = node.peers.lookup_by_name(name).map_err(|e| match e {
        LookupError::NotFound => TransferError::NotFound(name.to_string()),
        LookupError::Ambiguous => TransferError::Ambiguous(name.to_string()),
    })?;
    let progress_tx = node.progress.clone();
    send_file(&peer, &PathBuf::from(path), progress_tx).await
}

fn resolve_prompt(node: &Node, id: Option<&str>, verdict: Verdict) {
    let Some(id) = id.and_then(|s| s.parse::<u64>().ok()) else {
        println!("usage: accept|reject <id>");
        return;
    };
    node.confirmations.resolve(id, verdict);
}

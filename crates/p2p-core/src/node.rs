// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle (C9): starts and stops every background task that makes up
//! a running node — broadcaster, discovery listener, peer sweeper, and
//! the TCP accept loop that spawns one Transfer Acceptor per connection.
//!
//! Shuts down cooperatively: a shared `CancellationToken` plus a
//! bounded-deadline join over every spawned task, so no single slow
//! task can hang process exit indefinitely.

use crate::confirmation::ConfirmationBridge;
use crate::config::TCP_PORT_RANGE_START;
use crate::discovery::{run_broadcaster, run_listener, run_sweeper};
use crate::identity::{self, PeerIdentity};
use crate::peer_table::PeerTable;
use crate::transfer::acceptor::handle_connection;
use crate::transfer::ProgressEvent;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How many ports past `TCP_PORT_RANGE_START` to probe before giving up
/// on auto-selection.
const PORT_PROBE_RANGE: u16 = 1000;

/// Bind the TCP transfer listener. An explicit `requested_port` is bound
/// exactly and any bind failure propagates as-is (a configuration error
/// per the fail-fast policy for an explicitly chosen port). With no
/// explicit port, probe upward from `TCP_PORT_RANGE_START` for the first
/// free one, per the "default first free in 12000+" policy.
async fn bind_transfer_listener(requested_port: Option<u16>) -> std::io::Result<(TcpListener, u16)> {
    if let Some(port) = requested_port {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for offset in 0..PORT_PROBE_RANGE {
        let port = TCP_PORT_RANGE_START.saturating_add(offset);
        match TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        format!(
            "no free TCP port in {TCP_PORT_RANGE_START}..{}",
            TCP_PORT_RANGE_START.saturating_add(PORT_PROBE_RANGE)
        ),
    ))
}

/// Everything a running node needs to hand out to callers: the identity
/// it resolved, the live peer table, the confirmation bridge the UI
/// drains, and a progress event feed.
pub struct Node {
    pub identity: PeerIdentity,
    pub peers: Arc<PeerTable>,
    pub confirmations: Arc<ConfirmationBridge>,
    pub progress: broadcast::Sender<ProgressEvent>,
    download_dir: PathBuf,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind every socket and spawn every background task. Binding
    /// failures abort startup before any task is spawned — there is
    /// nothing to unwind.
    ///
    /// `requested_port` pins the TCP transfer port exactly (bind failure
    /// is fatal, per §7's configuration-error policy); `None` probes
    /// upward from `TCP_PORT_RANGE_START` for the first free port. The
    /// node's identity is resolved against whichever port is actually
    /// bound.
    pub async fn start(
        name: Option<String>,
        requested_port: Option<u16>,
        broadcast_port: u16,
        download_dir: PathBuf,
    ) -> std::io::Result<Self> {
        let (transfer_listener, bound_port) = bind_transfer_listener(requested_port).await?;
        let identity = identity::resolve(bound_port, name)?;

        let peers = Arc::new(PeerTable::new());
        let confirmations = Arc::new(ConfirmationBridge::new());
        let (progress_tx, _rx) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let mut tasks = Vec::new();

        let broadcaster_identity = identity.clone();
        let broadcaster_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_broadcaster(broadcaster_identity, broadcast_port, broadcaster_cancel).await {
                tracing::warn!("broadcaster exited with error: {e}");
            }
        }));

        let listener_identity = identity.clone();
        let listener_peers = peers.clone();
        let listener_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_listener(listener_identity, broadcast_port, listener_peers, listener_cancel).await {
                tracing::warn!("discovery listener exited with error: {e}");
            }
        }));

        let sweeper_peers = peers.clone();
        let sweeper_cancel = cancel.clone();
        tasks.push(tokio::spawn(run_sweeper(sweeper_peers, sweeper_cancel)));

        tasks.push(tokio::spawn(run_accept_loop(
            transfer_listener,
            confirmations.clone(),
            download_dir.clone(),
            progress_tx.clone(),
            cancel.clone(),
        )));

        Ok(Self {
            identity,
            peers,
            confirmations,
            progress: progress_tx,
            download_dir,
            cancel,
            tasks,
        })
    }

    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    /// Subscribe to transfer progress events.
    pub fn progress_stream(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Signal every background task to stop and wait up to
    /// `SHUTDOWN_GRACE` for them to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let joins = std::mem::take(&mut self.tasks);
        let all = join_tasks(joins);
        if tokio::time::timeout(SHUTDOWN_GRACE, all).await.is_err() {
            tracing::warn!("node shutdown exceeded {SHUTDOWN_GRACE:?}, abandoning remaining tasks");
        }
    }
}

async fn join_tasks(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                tracing::warn!("background task panicked: {e}");
            }
        }
    }
}

/// Accept inbound transfer connections and spawn one Acceptor task per
/// connection, so a slow or misbehaving sender cannot block others.
async fn run_accept_loop(
    listener: TcpListener,
    confirmations: Arc<ConfirmationBridge>,
    download_dir: PathBuf,
    progress_tx: broadcast::Sender<ProgressEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, addr) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("accept failed: {e}");
                        continue;
                    }
                };
                let confirmations = confirmations.clone();
                let download_dir = download_dir.clone();
                let progress_tx = progress_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, confirmations, download_dir, progress_tx).await {
                        tracing::warn!("transfer from {addr} failed: {e}");
                    }
                });
            }
            _ = cancel.cancelled() => {
                tracing::debug!("accept loop shutting down");
                return;
            }
        }
    }
}

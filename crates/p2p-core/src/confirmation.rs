// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Confirmation Bridge (C8): decouples the TCP receive handler (C6) from
//! the external UI. The UI never pushes into the handler — it only
//! dequeues offers and completes their promise.
//!
//! Each pending offer gets its own one-shot "promise" rather than a
//! shared broadcast channel, because exactly one verdict resolves
//! exactly one offer; arrival order is kept separately in a bounded
//! queue so the UI can drain offers fairly.

use crate::config::CONFIRM_TIMEOUT;
use crate::identity::PeerIdentity;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

/// A file offer awaiting a human yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    pub peer: PeerIdentity,
    pub filename: String,
    pub size: u64,
    pub md5: String,
}

/// The human's (or auto-timeout's) decision on a pending offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

struct Pending {
    offer: FileOffer,
    resolve: Option<oneshot::Sender<Verdict>>,
}

/// Queue-based boundary between the receive state machine and the UI.
pub struct ConfirmationBridge {
    next_id: AtomicU64,
    arrivals_tx: mpsc::Sender<u64>,
    arrivals_rx: Mutex<mpsc::Receiver<u64>>,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl ConfirmationBridge {
    pub fn new() -> Self {
        let (arrivals_tx, arrivals_rx) = mpsc::channel(64);
        Self {
            next_id: AtomicU64::new(0),
            arrivals_tx,
            arrivals_rx: Mutex::new(arrivals_rx),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Called by the C6 task. Blocks until the UI resolves the offer or
    /// `CONFIRM_TIMEOUT` elapses, in which case the verdict is `Reject`.
    pub async fn request(&self, offer: FileOffer) -> Verdict {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut guard = self.pending.lock().expect("confirmation mutex poisoned");
            guard.insert(
                id,
                Pending {
                    offer,
                    resolve: Some(tx),
                },
            );
        }

        // Backpressure on the arrivals queue is not expected to matter in
        // practice (bounded at 64 concurrent offers); a full queue would
        // mean the UI has stopped draining, which the timeout below
        // already accounts for.
        let _ = self.arrivals_tx.send(id).await;

        let verdict = match tokio::time::timeout(CONFIRM_TIMEOUT, rx).await {
            Ok(Ok(verdict)) => verdict,
            _ => Verdict::Reject,
        };

        self.pending.lock().expect("confirmation mutex poisoned").remove(&id);
        verdict
    }

    /// Read-only view the UI uses to render outstanding prompts.
    pub fn pending(&self) -> Vec<(u64, FileOffer)> {
        let guard = self.pending.lock().expect("confirmation mutex poisoned");
        guard.iter().map(|(id, p)| (*id, p.offer.clone())).collect()
    }

    /// Dequeue the next arrived offer, in arrival order. Returns `None`
    /// once the bridge is dropped and the arrivals channel closes.
    pub async fn next_prompt(&self) -> Option<(u64, FileOffer)> {
        loop {
            let id = {
                let mut rx = self.arrivals_rx.lock().expect("confirmation mutex poisoned");
                rx.recv().await?
            };
            // The offer may already have timed out and been removed
            // between arrival and the UI catching up; skip it.
            let offer = self
                .pending
                .lock()
                .expect("confirmation mutex poisoned")
                .get(&id)
                .map(|p| p.offer.clone());
            if let Some(offer) = offer {
                return Some((id, offer));
            }
        }
    }

    /// Complete the promise for a pending offer. A no-op if the offer
    /// already timed out or was resolved.
    pub fn resolve(&self, id: u64, verdict: Verdict) {
        let resolver = {
            let mut guard = self.pending.lock().expect("confirmation mutex poisoned");
            guard.get_mut(&id).and_then(|p| p.resolve.take())
        };
        if let Some(resolver) = resolver {
            let _ = resolver.send(verdict);
        }
    }
}

impl Default for ConfirmationBridge {
    fn default() -> Self {
        Self::new()
    }
}

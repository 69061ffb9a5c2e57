// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol constants — single source of truth for timing and sizing,
//! so every magic number used by more than one module lives in one
//! place.

use std::time::Duration;

/// Default UDP broadcast port for heartbeats.
pub const DEFAULT_BROADCAST_PORT: u16 = 23333;

/// First port probed when choosing a TCP transfer port.
pub const TCP_PORT_RANGE_START: u16 = 12000;

/// How often the broadcaster emits a heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// How long a peer record survives without a fresh heartbeat.
pub const PEER_TTL: Duration = Duration::from_secs(60);

/// How often the sweeper checks for expired peers.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// How long the Discovery Listener can go without receiving any datagram
/// (not even its own echoed heartbeat) before it warns that the
/// broadcast port may be firewalled. The socket itself binds
/// successfully either way; this only flags silent receive.
pub const DISCOVERY_SILENCE_WARNING: Duration = Duration::from_secs(15);

/// Bulk data chunk size, in bytes, before base64 encoding.
pub const CHUNK_BYTES: usize = 65536;

/// Deadline for establishing a TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for any single message read/write on an open connection.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the offer-to-accept round trip, both sides.
pub const OFFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline the Confirmation Bridge waits before auto-rejecting.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum encoded wire message size accepted by either peer.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default download directory for received files.
pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node identity (C1): name, local IPv4, TCP transfer port, OS tag.
//!
//! Computed once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

/// A non-routable address used only to make the kernel pick a source
/// address for us; `UdpSocket::connect` sends no packet.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Stable identity of this node, carried in every heartbeat and offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub os: String,
}

impl PeerIdentity {
    /// (ip, port) is the key used throughout the peer table and wire protocol.
    pub fn endpoint(&self) -> (Ipv4Addr, u16) {
        (self.ip, self.port)
    }
}

/// Determine the local IPv4 address by "connecting" a UDP socket to a
/// well-known external address and reading back the chosen source
/// address. No datagram is ever sent.
pub fn local_ipv4() -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    match socket.connect(ROUTE_PROBE_ADDR) {
        Ok(()) => match socket.local_addr()? {
            SocketAddr::V4(v4) => Ok(*v4.ip()),
            SocketAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
        },
        Err(e) => {
            tracing::warn!("local IP probe failed, falling back to loopback: {e}");
            Ok(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Resolve this node's identity. `name` overrides the default
/// `node_<last-octet>_<port>` naming scheme when provided.
pub fn resolve(transfer_port: u16, name: Option<String>) -> std::io::Result<PeerIdentity> {
    let ip = local_ipv4()?;
    let name = name.unwrap_or_else(|| default_name(ip, transfer_port));
    Ok(PeerIdentity {
        name,
        ip,
        port: transfer_port,
        os: std::env::consts::OS.to_string(),
    })
}

fn default_name(ip: Ipv4Addr, port: u16) -> String {
    format!("node_{}_{}", ip.octets()[3], port)
}

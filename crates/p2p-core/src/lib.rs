// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery, wire protocol, and transfer state machines for a
//! peer-to-peer LAN file-sharing node.
//!
//! Module map:
//! - [`identity`] — node identity and local IP resolution (C1)
//! - [`peer_table`] — the live peer table (C2)
//! - [`discovery`] — broadcaster, listener, and sweeper (C3/C4)
//! - [`wire`] — message taxonomy and framing shared by both planes (C5)
//! - [`transfer::acceptor`] / [`transfer::sender`] — transfer state machines (C6/C7)
//! - [`confirmation`] — the UI/handler decoupling queue (C8)
//! - [`node`] — process lifecycle: start, run, stop (C9)

pub mod config;
pub mod confirmation;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod node;
pub mod peer_table;
pub mod transfer;
pub mod wire;

pub use confirmation::{ConfirmationBridge, FileOffer, Verdict};
pub use error::{LookupError, TransferError, WireError};
pub use identity::PeerIdentity;
pub use node::Node;
pub use peer_table::{PeerRecord, PeerTable};
pub use transfer::{Direction, ProgressEvent};

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the discovery and transfer planes.
//!
//! One enum per concern, plain `Display` impls, `From<io::Error>` for
//! `?`-composition — no `anyhow` below the library boundary.

use std::fmt;

/// Errors from encoding/decoding or framing a wire message.
#[derive(Debug)]
pub enum WireError {
    Io(std::io::Error),
    MessageTooLarge { len: usize, max: usize },
    Json(serde_json::Error),
    Eof,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MessageTooLarge { len, max } => {
                write!(f, "message too large: {len} > {max}")
            }
            Self::Json(e) => write!(f, "invalid JSON: {e}"),
            Self::Eof => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Errors from a transfer session (send or receive side).
#[derive(Debug)]
pub enum TransferError {
    Wire(WireError),
    Io(std::io::Error),
    Protocol(String),
    Rejected(Option<String>),
    Timeout(&'static str),
    IntegrityMismatch { expected: String, got: String },
    NotFound(String),
    Ambiguous(String),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Protocol(s) => write!(f, "protocol error: {s}"),
            Self::Rejected(reason) => match reason {
                Some(r) => write!(f, "offer rejected: {r}"),
                None => write!(f, "offer rejected"),
            },
            Self::Timeout(stage) => write!(f, "timed out waiting for {stage}"),
            Self::IntegrityMismatch { expected, got } => {
                write!(f, "integrity mismatch: expected {expected}, got {got}")
            }
            Self::NotFound(name) => write!(f, "peer not found: {name}"),
            Self::Ambiguous(name) => write!(f, "peer name ambiguous: {name}"),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<WireError> for TransferError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

/// Result of a peer-table name lookup.
#[derive(Debug)]
pub enum LookupError {
    NotFound,
    Ambiguous,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no peer with that name"),
            Self::Ambiguous => write!(f, "more than one peer shares that name"),
        }
    }
}

impl std::error::Error for LookupError {}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transfer Acceptor (C6): the receive-side state machine, one task per
//! accepted TCP connection.
//!
//! ```text
//! S0 WAIT_OFFER -> S1 CONFIRMING -> S2 META -> S3 STREAMING -> S4 VERIFY
//! ```

use super::{resolve_collision_path, Direction, ProgressEvent};
use crate::config::{CONFIRM_TIMEOUT, MAX_MESSAGE_SIZE, MESSAGE_TIMEOUT};
use crate::confirmation::{ConfirmationBridge, FileOffer, Verdict};
use crate::error::TransferError;
use crate::identity::PeerIdentity;
use crate::wire::{read_message, write_message, WireMessage};
use md5::{Digest, Md5};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Run the receive state machine for one accepted connection to completion.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: Arc<ConfirmationBridge>,
    download_dir: PathBuf,
    progress_tx: broadcast::Sender<ProgressEvent>,
) -> Result<(), TransferError> {
    let session_id = super::next_session_id();

    // S0: WAIT_OFFER
    let (filename, size, md5_declared) = match timeout(
        std::time::Duration::from_secs(30),
        read_message(&mut stream, MAX_MESSAGE_SIZE),
    )
    .await
    {
        Ok(Ok(Some(WireMessage::FileOffer { filename, size, md5 }))) => (filename, size, md5),
        Ok(Ok(Some(_))) => return Err(TransferError::Protocol("expected FILE_OFFER".into())),
        Ok(Ok(None)) => return Err(TransferError::Wire(crate::error::WireError::Eof)),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TransferError::Timeout("FILE_OFFER")),
    };

    // S1: CONFIRMING
    let peer = peer_identity_from_addr(peer_addr);
    let offer = FileOffer {
        peer: peer.clone(),
        filename: filename.clone(),
        size,
        md5: md5_declared.clone(),
    };

    let verdict = timeout(CONFIRM_TIMEOUT + std::time::Duration::from_secs(1), bridge.request(offer))
        .await
        .unwrap_or(Verdict::Reject);

    if verdict == Verdict::Reject {
        let _ = write_message(&mut stream, &WireMessage::FileReject { reason: None }).await;
        return Err(TransferError::Rejected(None));
    }
    write_message(&mut stream, &WireMessage::FileAccept).await?;

    // S2: META
    let (chunk_count, _chunk_size) = match timeout(
        MESSAGE_TIMEOUT,
        read_message(&mut stream, MAX_MESSAGE_SIZE),
    )
    .await
    {
        Ok(Ok(Some(WireMessage::FileMeta { chunks, chunk_size }))) => (chunks, chunk_size),
        Ok(Ok(Some(_))) => return Err(TransferError::Protocol("expected FILE_META".into())),
        Ok(Ok(None)) => return Err(TransferError::Wire(crate::error::WireError::Eof)),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TransferError::Timeout("FILE_META")),
    };

    // S3: STREAMING
    crate::transfer::ensure_download_dir(&download_dir).await?;
    let output_path = resolve_collision_path(&download_dir, &filename, |p| p.exists());
    let mut output_file = tokio::fs::File::create(&output_path).await?;

    let mut hasher = Md5::new();
    let mut bytes_written: u64 = 0;
    let mut expected_seq: u64 = 0;

    for _ in 0..chunk_count {
        let chunk = match timeout(MESSAGE_TIMEOUT, read_message(&mut stream, MAX_MESSAGE_SIZE)).await {
            Ok(Ok(Some(WireMessage::FileChunk { seq, data }))) => (seq, data),
            Ok(Ok(Some(_))) => {
                cleanup_partial(&output_path).await;
                return Err(TransferError::Protocol("expected FILE_CHUNK".into()));
            }
            Ok(Ok(None)) => {
                cleanup_partial(&output_path).await;
                return Err(TransferError::Wire(crate::error::WireError::Eof));
            }
            Ok(Err(e)) => {
                cleanup_partial(&output_path).await;
                return Err(e.into());
            }
            Err(_) => {
                cleanup_partial(&output_path).await;
                return Err(TransferError::Timeout("FILE_CHUNK"));
            }
        };

        let (seq, data) = chunk;
        if seq != expected_seq {
            cleanup_partial(&output_path).await;
            return Err(TransferError::Protocol(format!(
                "out-of-order chunk: expected {expected_seq}, got {seq}"
            )));
        }
        expected_seq += 1;

        hasher.update(&data);
        output_file.write_all(&data).await?;
        bytes_written += data.len() as u64;

        let _ = progress_tx.send(ProgressEvent {
            session_id,
            direction: Direction::Recv,
            bytes: bytes_written,
            total: size,
        });
    }
    output_file.flush().await?;

    if bytes_written != size {
        cleanup_partial(&output_path).await;
        return Err(TransferError::Protocol(format!(
            "size mismatch: declared {size}, received {bytes_written}"
        )));
    }

    // S4: VERIFY
    let md5_done = match timeout(MESSAGE_TIMEOUT, read_message(&mut stream, MAX_MESSAGE_SIZE)).await {
        Ok(Ok(Some(WireMessage::FileDone { md5 }))) => md5,
        Ok(Ok(Some(_))) => {
            cleanup_partial(&output_path).await;
            return Err(TransferError::Protocol("expected FILE_DONE".into()));
        }
        Ok(Ok(None)) => {
            cleanup_partial(&output_path).await;
            return Err(TransferError::Wire(crate::error::WireError::Eof));
        }
        Ok(Err(e)) => {
            cleanup_partial(&output_path).await;
            return Err(e.into());
        }
        Err(_) => {
            cleanup_partial(&output_path).await;
            return Err(TransferError::Timeout("FILE_DONE"));
        }
    };

    let local_digest = hex::encode(hasher.finalize());
    if local_digest == md5_done && local_digest == md5_declared {
        write_message(&mut stream, &WireMessage::FileVerifyOk).await?;
        Ok(())
    } else {
        let _ = write_message(
            &mut stream,
            &WireMessage::FileVerifyFail {
                expected: md5_declared,
                got: local_digest.clone(),
            },
        )
        .await;
        cleanup_partial(&output_path).await;
        Err(TransferError::IntegrityMismatch {
            expected: md5_done,
            got: local_digest,
        })
    }
}

async fn cleanup_partial(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to remove partial file {}: {e}", path.display());
        }
    }
}

fn peer_identity_from_addr(addr: SocketAddr) -> PeerIdentity {
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };
    PeerIdentity {
        name: ip.to_string(),
        ip,
        port: addr.port(),
        os: String::new(),
    }
}

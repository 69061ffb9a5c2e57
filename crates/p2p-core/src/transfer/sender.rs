// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transfer Sender (C7): the send-side state machine, run once per
//! outbound transfer.
//!
//! ```text
//! T0 PREP -> T1 CONNECT -> T2 OFFER -> T3 META -> T4 STREAM -> T5 DONE -> T6 VERIFY
//! ```

use super::{Direction, ProgressEvent};
use crate::config::{CHUNK_BYTES, CONNECT_TIMEOUT, MAX_MESSAGE_SIZE, MESSAGE_TIMEOUT, OFFER_TIMEOUT};
use crate::error::{TransferError, WireError};
use crate::identity::PeerIdentity;
use crate::wire::{read_message, write_message, WireMessage};
use md5::{Digest, Md5};
use std::net::SocketAddrV4;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Send `file_path` to `peer`, driving the state machine to completion.
pub async fn send_file(
    peer: &PeerIdentity,
    file_path: &Path,
    progress_tx: broadcast::Sender<ProgressEvent>,
) -> Result<(), TransferError> {
    let session_id = super::next_session_id();

    // T0: PREP
    let metadata = tokio::fs::metadata(file_path).await?;
    if !metadata.is_file() {
        return Err(TransferError::Protocol(format!(
            "{} is not a regular file",
            file_path.display()
        )));
    }
    let size = metadata.len();
    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::Protocol("file path has no filename".into()))?
        .to_string();
    let md5_digest = hash_file(file_path).await?;

    // T1: CONNECT
    let addr = SocketAddrV4::new(peer.ip, peer.port);
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| TransferError::Timeout("CONNECT"))??;

    // T2: OFFER
    write_message(
        &mut stream,
        &WireMessage::FileOffer {
            filename: filename.clone(),
            size,
            md5: md5_digest.clone(),
        },
    )
    .await?;

    match timeout(OFFER_TIMEOUT, read_message(&mut stream, MAX_MESSAGE_SIZE)).await {
        Ok(Ok(Some(WireMessage::FileAccept))) => {}
        Ok(Ok(Some(WireMessage::FileReject { reason }))) => return Err(TransferError::Rejected(reason)),
        Ok(Ok(Some(_))) => return Err(TransferError::Protocol("expected FILE_ACCEPT or FILE_REJECT".into())),
        Ok(Ok(None)) => return Err(TransferError::Wire(WireError::Eof)),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(TransferError::Timeout("FILE_ACCEPT")),
    }

    // T3: META
    let chunk_count = chunk_count_for(size);
    write_message(
        &mut stream,
        &WireMessage::FileMeta {
            chunks: chunk_count,
            chunk_size: CHUNK_BYTES as u32,
        },
    )
    .await?;

    // T4: STREAM
    let mut file = tokio::fs::File::open(file_path).await?;
    let mut sent: u64 = 0;
    for seq in 0..chunk_count {
        let chunk = read_chunk(&mut file, CHUNK_BYTES).await?;
        sent += chunk.len() as u64;
        write_message(&mut stream, &WireMessage::FileChunk { seq, data: chunk }).await?;

        let _ = progress_tx.send(ProgressEvent {
            session_id,
            direction: Direction::Send,
            bytes: sent,
            total: size,
        });
    }

    // T5: DONE
    write_message(&mut stream, &WireMessage::FileDone { md5: md5_digest.clone() }).await?;

    // T6: VERIFY
    match timeout(MESSAGE_TIMEOUT, read_message(&mut stream, MAX_MESSAGE_SIZE)).await {
        Ok(Ok(Some(WireMessage::FileVerifyOk))) => Ok(()),
        Ok(Ok(Some(WireMessage::FileVerifyFail { expected, got }))) => {
            Err(TransferError::IntegrityMismatch { expected, got })
        }
        Ok(Ok(Some(_))) => Err(TransferError::Protocol("expected FILE_VERIFY_OK or FILE_VERIFY_FAIL".into())),
        Ok(Ok(None)) => Err(TransferError::Wire(WireError::Eof)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransferError::Timeout("FILE_VERIFY")),
    }
}

fn chunk_count_for(size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        (size + CHUNK_BYTES as u64 - 1) / CHUNK_BYTES as u64
    }
}

async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_BYTES];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Read up to `max_len` bytes, looping past short reads, stopping only at
/// EOF or a full buffer. Needed because `AsyncRead::read` may return
/// fewer bytes than requested without signalling end of file.
async fn read_chunk(file: &mut tokio::fs::File, max_len: usize) -> Result<Vec<u8>, std::io::Error> {
    let mut buf = vec![0u8; max_len];
    let mut filled = 0;
    while filled < max_len {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol (C5): message taxonomy, framing, and (de)serialization
//! shared by the UDP discovery plane and the TCP transfer plane.
//!
//! Wire format, identical for both transports:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use crate::error::WireError;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One wire message. Tagged on `type`; every state machine branch
/// matches this exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        name: String,
        ip: String,
        port: u16,
        os: String,
    },
    #[serde(rename = "FILE_OFFER")]
    FileOffer {
        filename: String,
        size: u64,
        md5: String,
    },
    #[serde(rename = "FILE_ACCEPT")]
    FileAccept,
    #[serde(rename = "FILE_REJECT")]
    FileReject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "FILE_META")]
    FileMeta { chunks: u64, chunk_size: u32 },
    #[serde(rename = "FILE_CHUNK")]
    FileChunk {
        seq: u64,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    #[serde(rename = "FILE_DONE")]
    FileDone { md5: String },
    #[serde(rename = "FILE_VERIFY_OK")]
    FileVerifyOk,
    #[serde(rename = "FILE_VERIFY_FAIL")]
    FileVerifyFail { expected: String, got: String },
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .map_err(serde::de::Error::custom)
    }
}

/// Encode a message as a length-prefixed JSON frame.
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, WireError> {
    let json = serde_json::to_vec(msg)?;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Decode a single length-prefixed JSON frame from a complete buffer
/// (used for UDP datagrams, where the datagram itself is one frame).
pub fn decode(buf: &[u8]) -> Result<WireMessage, WireError> {
    if buf.len() < 4 {
        return Err(WireError::Eof);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let body = buf.get(4..4 + len).ok_or(WireError::Eof)?;
    Ok(serde_json::from_slice(body)?)
}

/// Read one framed message from an async stream. Returns `Ok(None)` on a
/// graceful EOF before any bytes of the next frame arrive.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<WireMessage>, WireError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(WireError::MessageTooLarge { len, max: max_size });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Write one framed message to an async stream.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &WireMessage,
) -> Result<(), WireError> {
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

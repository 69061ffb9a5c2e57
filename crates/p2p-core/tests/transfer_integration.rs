// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end transfer integration tests: a real acceptor task, a real
//! sender call, loopback TCP, and real tempdir files.

use p2p_core::confirmation::{ConfirmationBridge, Verdict};
use p2p_core::identity::PeerIdentity;
use p2p_core::transfer::acceptor::handle_connection;
use p2p_core::transfer::sender::send_file;
use p2p_core::wire::{self, WireMessage};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

fn peer(ip: [u8; 4], port: u16) -> PeerIdentity {
    PeerIdentity {
        name: "peer".into(),
        ip: Ipv4Addr::from(ip),
        port,
        os: "linux".into(),
    }
}

#[tokio::test]
async fn send_then_receive_round_trips_file_contents() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(ConfirmationBridge::new());
    let (progress_tx, _rx) = broadcast::channel(16);

    let auto_accept_bridge = bridge.clone();
    let auto_accept = tokio::spawn(async move {
        if let Some((id, _offer)) = auto_accept_bridge.next_prompt().await {
            auto_accept_bridge.resolve(id, Verdict::Accept);
        }
    });

    let download_dir_path = download_dir.path().to_path_buf();
    let acceptor_bridge = bridge.clone();
    let acceptor_progress = progress_tx.clone();
    let acceptor = tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        handle_connection(stream, addr, acceptor_bridge, download_dir_path, acceptor_progress).await
    });

    let send_dir = tempfile::tempdir().unwrap();
    let file_path = send_dir.path().join("note.txt");
    tokio::fs::write(&file_path, b"hello from the sender")
        .await
        .unwrap();

    let target = peer([127, 0, 0, 1], local_addr.port());
    let send_result = send_file(&target, &file_path, progress_tx).await;
    assert!(send_result.is_ok(), "send failed: {:?}", send_result.err());

    let recv_result = acceptor.await.unwrap();
    assert!(recv_result.is_ok(), "receive failed: {:?}", recv_result.err());
    auto_accept.await.unwrap();

    let received = tokio::fs::read(download_dir.path().join("note.txt"))
        .await
        .unwrap();
    assert_eq!(received, b"hello from the sender");
}

#[tokio::test]
async fn receiver_rejection_surfaces_to_the_sender() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(ConfirmationBridge::new());
    let (progress_tx, _rx) = broadcast::channel(16);

    let reject_bridge = bridge.clone();
    tokio::spawn(async move {
        if let Some((id, _offer)) = reject_bridge.next_prompt().await {
            reject_bridge.resolve(id, Verdict::Reject);
        }
    });

    let download_dir_path = download_dir.path().to_path_buf();
    let acceptor_progress = progress_tx.clone();
    let acceptor = tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        handle_connection(stream, addr, bridge, download_dir_path, acceptor_progress).await
    });

    let send_dir = tempfile::tempdir().unwrap();
    let file_path = send_dir.path().join("unwanted.txt");
    tokio::fs::write(&file_path, b"nobody asked for this")
        .await
        .unwrap();

    let target = peer([127, 0, 0, 1], local_addr.port());
    let send_result = send_file(&target, &file_path, progress_tx).await;
    assert!(matches!(
        send_result,
        Err(p2p_core::TransferError::Rejected(_))
    ));

    let recv_result = acceptor.await.unwrap();
    assert!(recv_result.is_err());
    assert!(!download_dir.path().join("unwanted.txt").exists());
}

#[tokio::test]
async fn second_transfer_of_same_filename_does_not_clobber_the_first() {
    let download_dir = tempfile::tempdir().unwrap();
    let send_dir = tempfile::tempdir().unwrap();

    for payload in [b"first payload".as_slice(), b"second payload".as_slice()] {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let bridge = Arc::new(ConfirmationBridge::new());
        let (progress_tx, _rx) = broadcast::channel(16);

        let auto_accept_bridge = bridge.clone();
        tokio::spawn(async move {
            if let Some((id, _offer)) = auto_accept_bridge.next_prompt().await {
                auto_accept_bridge.resolve(id, Verdict::Accept);
            }
        });

        let download_dir_path = download_dir.path().to_path_buf();
        let acceptor_progress = progress_tx.clone();
        let acceptor = tokio::spawn(async move {
            let (stream, addr) = listener.accept().await.unwrap();
            handle_connection(stream, addr, bridge, download_dir_path, acceptor_progress).await
        });

        let file_path = send_dir.path().join("dup.txt");
        tokio::fs::write(&file_path, payload).await.unwrap();

        let target = peer([127, 0, 0, 1], local_addr.port());
        send_file(&target, &file_path, progress_tx).await.unwrap();
        acceptor.await.unwrap().unwrap();
    }

    let first = tokio::fs::read(download_dir.path().join("dup.txt"))
        .await
        .unwrap();
    let second = tokio::fs::read(download_dir.path().join("dup (1).txt"))
        .await
        .unwrap();
    assert_eq!(first, b"first payload");
    assert_eq!(second, b"second payload");
}

/// A sender that vanishes mid-stream (crash, network drop) must leave no
/// partial file behind on the receiver.
#[tokio::test]
async fn sender_disconnecting_mid_stream_leaves_no_partial_file() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let download_dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(ConfirmationBridge::new());
    let (progress_tx, _rx) = broadcast::channel(16);

    let auto_accept_bridge = bridge.clone();
    tokio::spawn(async move {
        if let Some((id, _offer)) = auto_accept_bridge.next_prompt().await {
            auto_accept_bridge.resolve(id, Verdict::Accept);
        }
    });

    let download_dir_path = download_dir.path().to_path_buf();
    let acceptor = tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        handle_connection(stream, addr, bridge, download_dir_path, progress_tx).await
    });

    let mut stream = TcpStream::connect(local_addr).await.unwrap();
    wire::write_message(
        &mut stream,
        &WireMessage::FileOffer {
            filename: "crashed.txt".into(),
            size: 3 * 65536,
            md5: "ffffffffffffffffffffffffffffffff".into(),
        },
    )
    .await
    .unwrap();
    match wire::read_message(&mut stream, 1024).await.unwrap() {
        Some(WireMessage::FileAccept) => {}
        other => panic!("expected FILE_ACCEPT, got {other:?}"),
    }

    wire::write_message(
        &mut stream,
        &WireMessage::FileMeta {
            chunks: 3,
            chunk_size: 65536,
        },
    )
    .await
    .unwrap();
    wire::write_message(
        &mut stream,
        &WireMessage::FileChunk {
            seq: 0,
            data: vec![0u8; 65536],
        },
    )
    .await
    .unwrap();

    // Simulate a crash: drop the connection instead of sending the
    // remaining two chunks.
    drop(stream);

    let recv_result = acceptor.await.unwrap();
    assert!(recv_result.is_err(), "acceptor should observe the dropped connection as a failure");
    assert!(
        !download_dir.path().join("crashed.txt").exists(),
        "partial file must not survive a mid-stream disconnect"
    );
}

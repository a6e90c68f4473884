// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use dchat_client_rs::{
    client::socks::{SOCKS_GRANTED, connect_request, connect_via_relay},
    errors::DchatError,
    models::onion::OnionId,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

#[test]
fn request_carries_the_hostname_form() {
    let onion: OnionId = "bbbbbbbbbbbbbbbb.onion".parse().expect("onion");
    let req = connect_request(&onion, 8080);

    assert_eq!(req[0], 0x04, "version");
    assert_eq!(req[1], 0x01, "connect command");
    assert_eq!(&req[2..4], &8080u16.to_be_bytes(), "destination port");
    assert_eq!(&req[4..8], &[0, 0, 0, 1], "sentinel address");
    assert_eq!(req[8], 0, "empty user id");
    assert_eq!(&req[9..31], b"bbbbbbbbbbbbbbbb.onion");
    assert_eq!(req[31], 0, "hostname terminator");
    assert_eq!(req.len(), 32);
}

/// A relay stand-in that consumes one CONNECT request and answers with the
/// given status byte.
async fn one_shot_relay(status: u8) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<Vec<u8>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut request = vec![0u8; 9];
        stream.read_exact(&mut request).await.expect("fixed part");
        // hostname runs until the null terminator
        loop {
            let b = stream.read_u8().await.expect("hostname byte");
            request.push(b);
            if b == 0 {
                break;
            }
        }
        let reply = [0u8, status, 0, 0, 0, 0, 0, 0];
        stream.write_all(&reply).await.expect("reply");
        // hold the tunnel open long enough for the caller to observe success
        let _ = stream.read_u8().await;
        request
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn granted_status_yields_a_stream() -> Result<()> {
    let (relay, handle) = one_shot_relay(SOCKS_GRANTED).await?;
    let onion: OnionId = "bbbbbbbbbbbbbbbb.onion".parse()?;

    let stream = connect_via_relay(relay, &onion, 7777).await;
    assert!(stream.is_ok());
    drop(stream);

    let request = handle.await?;
    assert_eq!(request, connect_request(&onion, 7777).to_vec());
    Ok(())
}

#[tokio::test]
async fn refused_status_is_a_contact_level_failure() -> Result<()> {
    let (relay, _handle) = one_shot_relay(0x5b).await?;
    let onion: OnionId = "bbbbbbbbbbbbbbbb.onion".parse()?;

    match connect_via_relay(relay, &onion, 7777).await {
        Err(DchatError::Peer(msg)) => {
            assert!(msg.contains("0x5b"), "got '{msg}'");
        },
        other => panic!("expected a peer failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn unreachable_relay_is_a_contact_level_failure() {
    // bind a port, then close it so nothing listens there
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let onion: OnionId = "bbbbbbbbbbbbbbbb.onion".parse().expect("onion");
    assert!(matches!(
        connect_via_relay(addr, &onion, 7777).await,
        Err(DchatError::Peer(_))
    ));
}

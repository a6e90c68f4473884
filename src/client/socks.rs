// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use crate::{
    errors::{DchatError, Result},
    models::onion::OnionId,
};

pub const SOCKS_VERSION: u8 = 0x04;
pub const SOCKS_CONNECT: u8 = 0x01;

/// Status byte of a granted request.
pub const SOCKS_GRANTED: u8 = 0x5a;

/// Sentinel destination address `0.0.0.1` that switches the relay into
/// resolve-by-hostname mode.
const SOCKS_FAKEIP: [u8; 4] = [0, 0, 0, 1];

/// Size of the fixed relay response.
const SOCKS_REPLY_LEN: usize = 8;

/// Crafts a SOCKS4a `CONNECT` request for a hostname destination:
/// version, command, destination port, the sentinel address, an empty user
/// id and the null-terminated hostname.
pub fn connect_request(onion_id: &OnionId, port: u16) -> BytesMut {
    let host = onion_id.as_bytes();
    let mut req = BytesMut::with_capacity(9 + host.len() + 1);
    req.put_u8(SOCKS_VERSION);
    req.put_u8(SOCKS_CONNECT);
    req.put_u16(port);
    req.put_slice(&SOCKS_FAKEIP);
    req.put_u8(0);
    req.put_slice(host);
    req.put_u8(0);
    req
}

/// Maps a relay status byte to its protocol message.
pub fn status_message(status: u8) -> &'static str {
    match status {
        0x5a => "request granted",
        0x5b => "request rejected or failed",
        0x5c => "request rejected: relay cannot connect to identd on the client",
        0x5d => "request rejected: client program and identd report different user ids",
        _ => "unknown status",
    }
}

/// Opens a stream to `onion_id:port` through the anonymity relay.
///
/// Any non-granted status is a contact-level failure: the caller reports it
/// and the process keeps running.
pub async fn connect_via_relay(
    relay: SocketAddr,
    onion_id: &OnionId,
    port: u16,
) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(relay).await.map_err(|e| {
        DchatError::peer(format!("could not reach relay at {relay}: {e}"))
    })?;

    stream
        .write_all(&connect_request(onion_id, port))
        .await
        .map_err(|e| DchatError::peer(format!("relay request write failed: {e}")))?;

    let mut reply = [0u8; SOCKS_REPLY_LEN];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|e| DchatError::peer(format!("relay reply read failed: {e}")))?;

    let status = reply[1];
    if status != SOCKS_GRANTED {
        return Err(DchatError::peer(format!(
            "circuit to {onion_id}:{port} refused: status 0x{status:02x} - {}",
            status_message(status)
        )));
    }

    debug!("circuit to {onion_id}:{port} established via {relay}");
    Ok(stream)
}

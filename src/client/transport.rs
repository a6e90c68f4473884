// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpListener, TcpSocket};
use tracing::info;

use crate::errors::{DchatError, Result};

/// Pending-connection queue depth of the acceptor.
pub const LISTEN_BACKLOG: u32 = 20;

/// Binds the local service socket with address reuse and starts listening.
/// Failures here are fatal to startup.
pub fn bind_listener(address: IpAddr, port: u16) -> Result<TcpListener> {
    let resource = |what: &str, e: std::io::Error| {
        DchatError::Resource(format!("{what} failed for {address}:{port}: {e}"))
    };

    let socket = match address {
        IpAddr::V4(_) => TcpSocket::new_v4(),
        IpAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(|e| resource("socket", e))?;
    socket.set_reuseaddr(true).map_err(|e| resource("setsockopt", e))?;
    socket
        .bind(SocketAddr::new(address, port))
        .map_err(|e| resource("bind", e))?;

    let listener = socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| resource("listen", e))?;
    if let Ok(addr) = listener.local_addr() {
        info!("listening on '{addr}'");
    }
    Ok(listener)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, sync::Arc};

use tokio::{net::tcp::OwnedWriteHalf, sync::Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::Identity,
    errors::{DchatError, Result},
    models::{
        onion::OnionId,
        pdu::is_valid_port,
    },
};

/// Write half of a peer socket, shared between the event loop (broadcasts)
/// and the connector (handshake transmission).
pub type PeerWriter = Arc<Mutex<OwnedWriteHalf>>;

/// A peer address as exchanged during gossip: the hidden-service hostname and
/// its listening port.
///
/// Ordering is the lexicographic pair order (onion id first, then port) that
/// both endpoints of a duplicate session apply to converge without
/// communicating. Duplicate equality uses this pair only, never the socket or
/// the nickname.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub onion_id: OnionId,
    pub port: u16,
}

impl Endpoint {
    /// Gossip-wire form: `<onion_id> <port><LF>`.
    pub fn to_wire(&self) -> String {
        format!("{} {}\n", self.onion_id, self.port)
    }

    /// Parses one gossip line; tolerant of the trailing terminator, strict
    /// about everything else.
    pub fn from_wire(line: &str) -> Result<Endpoint> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (onion, port) = line
            .split_once(' ')
            .ok_or_else(|| DchatError::protocol(format!("malformed contact line '{line}'")))?;
        let onion_id: OnionId = onion.parse()?;
        let port: u16 = port
            .parse()
            .map_err(|_| DchatError::protocol(format!("invalid contact port '{port}'")))?;
        if !is_valid_port(port) {
            return Err(DchatError::protocol(format!("invalid contact port '{port}'")));
        }
        Ok(Endpoint { onion_id, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.onion_id, self.port)
    }
}

impl From<&Identity> for Endpoint {
    fn from(me: &Identity) -> Self {
        Endpoint {
            onion_id: me.onion_id.clone(),
            port: me.listen_port,
        }
    }
}

/// Session state of a contact slot.
///
/// `Opening` transitions to `Identified` on the first valid
/// `control/discover`; any other event closes the session. Outbound sessions
/// are born identified because the local side dialed the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactState {
    Opening,
    Identified,
    Closed,
}

/// One remote participant bound to a contactlist slot.
#[derive(Debug)]
pub struct Contact {
    pub writer: PeerWriter,
    pub endpoint: Option<Endpoint>,
    pub nickname: String,
    /// True when the session originated as inbound.
    pub accepted: bool,
    pub state: ContactState,
    /// Cancelling this token tears down the per-peer reader and with it the
    /// socket.
    pub cancel: CancellationToken,
    /// Slot generation tag; events queued for an evicted occupant of the same
    /// slot index are discarded by comparing this.
    pub generation: u64,
}

impl Contact {
    /// A session received on the acceptor; identity unknown until the
    /// handshake arrives.
    pub fn inbound(writer: PeerWriter, cancel: CancellationToken) -> Self {
        Contact {
            writer,
            endpoint: None,
            nickname: String::new(),
            accepted: true,
            state: ContactState::Opening,
            cancel,
            generation: 0,
        }
    }

    /// A session the local side dialed; the endpoint is known by
    /// construction.
    pub fn outbound(writer: PeerWriter, endpoint: Endpoint, cancel: CancellationToken) -> Self {
        Contact {
            writer,
            endpoint: Some(endpoint),
            nickname: String::new(),
            accepted: false,
            state: ContactState::Identified,
            cancel,
            generation: 0,
        }
    }

    pub fn is_identified(&self) -> bool {
        self.state == ContactState::Identified
    }

    /// Short form for log lines: nickname when known, endpoint otherwise.
    pub fn label(&self) -> String {
        if !self.nickname.is_empty() {
            return self.nickname.clone();
        }
        match &self.endpoint {
            Some(ep) => ep.to_string(),
            None => "<unidentified>".to_owned(),
        }
    }
}

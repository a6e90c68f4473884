// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Error taxonomy of the client, ordered from narrowest to broadest scope.
///
/// `Protocol` and `Peer` are contact-level: the event loop evicts the
/// offending peer and keeps running. `Resource` aborts the process through the
/// bounded cleanup path, `Config` aborts before any socket is created and
/// `Programming` marks an internal contract violation that a correct build
/// never triggers.
#[derive(Debug, Error)]
pub enum DchatError {
    /// An inbound PDU violates the grammar or a field constraint.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A socket read/write or relay status failure on a single peer session.
    #[error("peer failure: {0}")]
    Peer(String),

    /// An allocation, pipe or bind failure that cannot be continued past.
    #[error("resource failure: {0}")]
    Resource(String),

    /// Invalid options or an unreadable configuration file at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Constraint-violating arguments to an internal operation.
    #[error("internal contract violated: {0}")]
    Programming(String),
}

impl DchatError {
    /// True for the contact-level kinds that evict a single peer.
    pub fn is_evicting(&self) -> bool {
        matches!(self, DchatError::Protocol(_) | DchatError::Peer(_))
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        DchatError::Protocol(msg.into())
    }

    pub(crate) fn peer(msg: impl Into<String>) -> Self {
        DchatError::Peer(msg.into())
    }
}

impl From<std::io::Error> for DchatError {
    fn from(e: std::io::Error) -> Self {
        DchatError::Peer(e.to_string())
    }
}

/// Shorthand used by every component boundary below the task layer.
pub type Result<T, E = DchatError> = std::result::Result<T, E>;

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::{
    errors::{DchatError, Result},
    models::onion::OnionId,
};

/// Upper bound on the `Content-Length` header and therefore on the content
/// section of a single PDU.
pub const MAX_CONTENT_LEN: usize = 4096;

/// Upper bound on the `Nickname` header value in bytes.
pub const MAX_NICKNAME: usize = 31;

/// Product tag carried in the optional `Server` header.
pub static SERVER_TAG: Lazy<String> =
    Lazy::new(|| format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));

/// Payload classes a DChat/1.0 PDU can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// A chat message rendered to the user.
    TextPlain,
    /// Opaque binary content.
    ApplicationOctet,
    /// The identification/gossip handshake.
    ControlDiscover,
    /// Reserved control reply.
    ControlReply,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentType::TextPlain => "text/plain",
            ContentType::ApplicationOctet => "application/octet",
            ContentType::ControlDiscover => "control/discover",
            ContentType::ControlReply => "control/reply",
        })
    }
}

impl FromStr for ContentType {
    type Err = DchatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text/plain" => Ok(ContentType::TextPlain),
            "application/octet" => Ok(ContentType::ApplicationOctet),
            "control/discover" => Ok(ContentType::ControlDiscover),
            "control/reply" => Ok(ContentType::ControlReply),
            other => Err(DchatError::protocol(format!("invalid content type '{other}'"))),
        }
    }
}

/// Checks that a listening port lies in the valid TCP range.
pub fn is_valid_port(port: u16) -> bool {
    port != 0
}

/// Checks nickname constraints: 1..=31 printable bytes.
pub fn is_valid_nickname(nickname: &str) -> bool {
    !nickname.is_empty()
        && nickname.len() <= MAX_NICKNAME
        && nickname.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// One fully formed DChat/1.0 protocol data unit.
///
/// The mandatory sender identification (`host`, `listen_port`) is typed and
/// always present on a decoded PDU; `nickname`, `date` and `server` mirror the
/// optional headers and stay `None` when the peer did not send them.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub content_type: ContentType,
    pub host: OnionId,
    pub listen_port: u16,
    pub nickname: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub server: Option<String>,
    pub content: Bytes,
}

impl Pdu {
    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    /// Re-checks every field constraint. Violations on an outbound PDU are
    /// internal contract errors, not peer faults.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_port(self.listen_port) {
            return Err(DchatError::Programming(format!(
                "invalid listen port {}",
                self.listen_port
            )));
        }
        if self.content.len() > MAX_CONTENT_LEN {
            return Err(DchatError::Programming(format!(
                "content length {} exceeds {MAX_CONTENT_LEN}",
                self.content.len()
            )));
        }
        if let Some(nick) = &self.nickname
            && !is_valid_nickname(nick)
        {
            return Err(DchatError::Programming(format!("invalid nickname '{nick}'")));
        }
        Ok(())
    }

    /// Extracts the run of content bytes from `offset` up to and including the
    /// first occurrence of `term`, plus the offset one past the terminator.
    pub fn content_part(&self, offset: usize, term: u8) -> Result<(&[u8], usize)> {
        if offset >= self.content.len() {
            return Err(DchatError::protocol(format!(
                "content offset {offset} out of range"
            )));
        }
        let rest = &self.content[offset..];
        match rest.iter().position(|&b| b == term) {
            Some(i) => Ok((&rest[..=i], offset + i + 1)),
            None => Err(DchatError::protocol(
                "terminator not found before end of content",
            )),
        }
    }
}

/// Builder for outbound PDUs.
///
/// Validates the sender identification up front, stamps `Date` and `Server`
/// at build time unless overridden, and re-validates the whole unit before
/// handing it out.
#[derive(Debug)]
pub struct PduBuilder {
    pdu: Pdu,
}

impl PduBuilder {
    pub fn new(
        content_type: ContentType,
        host: OnionId,
        listen_port: u16,
        nickname: &str,
    ) -> Result<Self> {
        if !is_valid_port(listen_port) {
            return Err(DchatError::Programming(format!(
                "invalid listen port {listen_port}"
            )));
        }
        if !is_valid_nickname(nickname) {
            return Err(DchatError::Programming(format!(
                "invalid nickname '{nickname}'"
            )));
        }
        Ok(Self {
            pdu: Pdu {
                content_type,
                host,
                listen_port,
                nickname: Some(nickname.to_owned()),
                date: None,
                server: None,
                content: Bytes::new(),
            },
        })
    }

    pub fn content(mut self, content: impl Into<Bytes>) -> Self {
        self.pdu.content = content.into();
        self
    }

    /// Overrides the `Date` stamp otherwise taken at build time.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.pdu.date = Some(date);
        self
    }

    /// Overrides the `Server` product tag.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.pdu.server = Some(server.into());
        self
    }

    pub fn build(mut self) -> Result<Pdu> {
        if self.pdu.date.is_none() {
            // wall clock truncated to seconds, the wire resolution
            self.pdu.date = DateTime::from_timestamp(Utc::now().timestamp(), 0);
        }
        if self.pdu.server.is_none() {
            self.pdu.server = Some(SERVER_TAG.clone());
        }
        self.pdu.validate()?;
        Ok(self.pdu)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{
    errors::{DchatError, Result},
    models::{
        onion::OnionId,
        pdu::{ContentType, MAX_CONTENT_LEN, Pdu, is_valid_nickname, is_valid_port},
    },
};

/// Exact value of the mandatory version header.
pub const DCHAT_VERSION: &str = "1.0";

/// RFC-1123 timestamp layout of the `Date` header.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// The DChat/1.0 header table.
///
/// `ALL` fixes the deterministic emit order; the version header is always
/// first on the wire. Any name outside this table makes a PDU illegal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderId {
    Version,
    ContentType,
    ContentLength,
    Host,
    ListenPort,
    Nickname,
    Date,
    Server,
}

impl HeaderId {
    pub const ALL: [HeaderId; 8] = [
        HeaderId::Version,
        HeaderId::ContentType,
        HeaderId::ContentLength,
        HeaderId::Host,
        HeaderId::ListenPort,
        HeaderId::Nickname,
        HeaderId::Date,
        HeaderId::Server,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HeaderId::Version => "DCHAT",
            HeaderId::ContentType => "Content-Type",
            HeaderId::ContentLength => "Content-Length",
            HeaderId::Host => "Host",
            HeaderId::ListenPort => "Listen-Port",
            HeaderId::Nickname => "Nickname",
            HeaderId::Date => "Date",
            HeaderId::Server => "Server",
        }
    }

    pub fn mandatory(self) -> bool {
        matches!(
            self,
            HeaderId::Version
                | HeaderId::ContentType
                | HeaderId::ContentLength
                | HeaderId::Host
                | HeaderId::ListenPort
        )
    }

    pub fn from_name(name: &str) -> Option<HeaderId> {
        HeaderId::ALL.into_iter().find(|id| id.name() == name)
    }
}

/// A PDU under construction on the receive path.
///
/// Fields are populated incrementally while header lines arrive; a repeated
/// header simply overwrites the earlier value. `finish` checks that every
/// mandatory header has been seen and produces the immutable [`Pdu`].
#[derive(Debug, Default)]
pub struct PduDraft {
    version_seen: bool,
    content_type: Option<ContentType>,
    content_length: Option<usize>,
    host: Option<OnionId>,
    listen_port: Option<u16>,
    nickname: Option<String>,
    date: Option<DateTime<Utc>>,
    server: Option<String>,
}

impl PduDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version_seen(&self) -> bool {
        self.version_seen
    }

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    /// Parses one header value into the draft. Fails fast on the first field
    /// constraint violation.
    pub fn apply(&mut self, id: HeaderId, value: &str) -> Result<()> {
        match id {
            HeaderId::Version => {
                if value != DCHAT_VERSION {
                    return Err(DchatError::protocol(format!(
                        "unsupported protocol version '{value}'"
                    )));
                }
                self.version_seen = true;
            },
            HeaderId::ContentType => {
                self.content_type = Some(value.parse()?);
            },
            HeaderId::ContentLength => {
                let len: usize = value.parse().map_err(|_| {
                    DchatError::protocol(format!("invalid content length '{value}'"))
                })?;
                if len > MAX_CONTENT_LEN {
                    return Err(DchatError::protocol(format!(
                        "content length {len} exceeds {MAX_CONTENT_LEN}"
                    )));
                }
                self.content_length = Some(len);
            },
            HeaderId::Host => {
                self.host = Some(value.parse()?);
            },
            HeaderId::ListenPort => {
                let port: u16 = value.parse().map_err(|_| {
                    DchatError::protocol(format!("invalid listen port '{value}'"))
                })?;
                if !is_valid_port(port) {
                    return Err(DchatError::protocol(format!(
                        "invalid listen port '{value}'"
                    )));
                }
                self.listen_port = Some(port);
            },
            HeaderId::Nickname => {
                if !is_valid_nickname(value) {
                    return Err(DchatError::protocol(format!(
                        "invalid nickname '{value}'"
                    )));
                }
                self.nickname = Some(value.to_owned());
            },
            HeaderId::Date => {
                let naive = NaiveDateTime::parse_from_str(value, DATE_FORMAT)
                    .map_err(|_| {
                        DchatError::protocol(format!("invalid date '{value}'"))
                    })?;
                self.date = Some(naive.and_utc());
            },
            HeaderId::Server => {
                self.server = Some(value.to_owned());
            },
        }
        Ok(())
    }

    /// Validates completeness and seals the draft around its content bytes.
    pub fn finish(self, content: Bytes) -> Result<Pdu> {
        let missing = |id: HeaderId| {
            DchatError::protocol(format!("mandatory header '{}' missing", id.name()))
        };

        if !self.version_seen {
            return Err(missing(HeaderId::Version));
        }
        let content_type = self.content_type.ok_or_else(|| missing(HeaderId::ContentType))?;
        let content_length =
            self.content_length.ok_or_else(|| missing(HeaderId::ContentLength))?;
        let host = self.host.ok_or_else(|| missing(HeaderId::Host))?;
        let listen_port = self.listen_port.ok_or_else(|| missing(HeaderId::ListenPort))?;

        if content.len() != content_length {
            return Err(DchatError::Programming(format!(
                "content section is {} bytes, header said {content_length}",
                content.len()
            )));
        }

        Ok(Pdu {
            content_type,
            host,
            listen_port,
            nickname: self.nickname,
            date: self.date,
            server: self.server,
            content,
        })
    }
}

/// Renders one header value for the encoder; `None` means an unset optional
/// header that is skipped on the wire.
pub fn emit_value(pdu: &Pdu, id: HeaderId) -> Option<String> {
    match id {
        HeaderId::Version => Some(DCHAT_VERSION.to_owned()),
        HeaderId::ContentType => Some(pdu.content_type.to_string()),
        HeaderId::ContentLength => Some(pdu.content_length().to_string()),
        HeaderId::Host => Some(pdu.host.to_string()),
        HeaderId::ListenPort => Some(pdu.listen_port.to_string()),
        HeaderId::Nickname => pdu.nickname.clone(),
        HeaderId::Date => pdu.date.map(|d| d.format(DATE_FORMAT).to_string()),
        HeaderId::Server => pdu.server.clone(),
    }
}

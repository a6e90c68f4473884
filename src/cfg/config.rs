// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt,
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use crate::{
    errors::{DchatError, Result},
    models::{
        onion::OnionId,
        pdu::{is_valid_nickname, is_valid_port},
    },
};

/// Listening port used when `lport` is not configured.
pub const DEFAULT_LISTEN_PORT: u16 = 7777;

/// Default SOCKS endpoint of the local anonymity relay.
pub const DEFAULT_RELAY: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9050);

/// The local participant. Write-once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub onion_id: OnionId,
    pub listen_port: u16,
    pub nickname: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.nickname, self.onion_id, self.listen_port)
    }
}

/// Transport hints for the anonymity relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// SOCKS endpoint outbound circuits are requested from.
    pub address: SocketAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig { address: DEFAULT_RELAY }
    }
}

/// Validated runtime configuration, built once at startup and passed
/// explicitly into each task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub identity: Identity,
    /// Address the acceptor binds to. The hidden service forwards to it, so
    /// it stays on the loopback by default.
    pub listen_address: IpAddr,
    pub relay: RelayConfig,
    /// Optional peer to dial right after startup (`ronion`/`rport`).
    pub bootstrap: Option<(OnionId, u16)>,
}

/// Raw option values as collected from the configuration file and the
/// command line, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub lonion: Option<String>,
    pub nickname: Option<String>,
    pub lport: Option<u16>,
    pub ronion: Option<String>,
    pub rport: Option<u16>,
    pub relay: Option<SocketAddr>,
}

/// Long option names recognized in the configuration file.
const FILE_OPTIONS: [&str; 6] = ["lonion", "nickname", "lport", "ronion", "rport", "help"];

impl Options {
    /// Reads a configuration file: one `<long-option-name> <value>` pair per
    /// line. Unknown option names are syntax errors reported with their line
    /// number. Blank lines and `#` comments are tolerated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Options> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DchatError::Config(format!("cannot read config file {path:?}: {e}"))
        })?;
        Self::parse(&text)
    }

    /// Parses configuration text; see [`Options::from_file`].
    pub fn parse(text: &str) -> Result<Options> {
        let mut opts = Options::default();

        for (lineno, raw) in text.lines().enumerate() {
            let lineno = lineno + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, value) = match line.split_once(char::is_whitespace) {
                Some((n, v)) => (n, v.trim()),
                None => (line, ""),
            };
            if !FILE_OPTIONS.contains(&name) {
                return Err(DchatError::Config(format!(
                    "line {lineno}: unknown option '{name}'"
                )));
            }

            let syntax = |what: &str| {
                DchatError::Config(format!("line {lineno}: invalid {what} '{value}'"))
            };
            match name {
                "lonion" => opts.lonion = Some(value.to_owned()),
                "nickname" => opts.nickname = Some(value.to_owned()),
                "lport" => {
                    opts.lport = Some(value.parse().map_err(|_| syntax("port"))?);
                },
                "ronion" => opts.ronion = Some(value.to_owned()),
                "rport" => {
                    opts.rport = Some(value.parse().map_err(|_| syntax("port"))?);
                },
                // meaningful on the command line only
                "help" => {
                    tracing::warn!("line {lineno}: 'help' is ignored in the config file");
                },
                _ => unreachable!("filtered against FILE_OPTIONS"),
            }
        }

        Ok(opts)
    }

    /// Lays `over` on top of `self`; values in `over` win.
    pub fn overlay(mut self, over: Options) -> Options {
        self.lonion = over.lonion.or(self.lonion);
        self.nickname = over.nickname.or(self.nickname);
        self.lport = over.lport.or(self.lport);
        self.ronion = over.ronion.or(self.ronion);
        self.rport = over.rport.or(self.rport);
        self.relay = over.relay.or(self.relay);
        self
    }

    /// Validates the collected options and produces the runtime
    /// configuration.
    pub fn into_config(self) -> Result<Config> {
        let lonion = self
            .lonion
            .ok_or_else(|| DchatError::Config("option 'lonion' is required".into()))?;
        let onion_id: OnionId = lonion
            .parse()
            .map_err(|_| DchatError::Config(format!("invalid onion id '{lonion}'")))?;

        let nickname = self
            .nickname
            .ok_or_else(|| DchatError::Config("option 'nickname' is required".into()))?;
        if !is_valid_nickname(&nickname) {
            return Err(DchatError::Config(format!(
                "invalid nickname '{nickname}' (1..=31 printable bytes)"
            )));
        }

        let listen_port = self.lport.unwrap_or(DEFAULT_LISTEN_PORT);
        if !is_valid_port(listen_port) {
            return Err(DchatError::Config(format!(
                "invalid listen port {listen_port}"
            )));
        }

        let bootstrap = match (self.ronion, self.rport) {
            (None, None) => None,
            (Some(roni), Some(rport)) => {
                let remote: OnionId = roni.parse().map_err(|_| {
                    DchatError::Config(format!("invalid onion id '{roni}'"))
                })?;
                if !is_valid_port(rport) {
                    return Err(DchatError::Config(format!(
                        "invalid remote port {rport}"
                    )));
                }
                Some((remote, rport))
            },
            _ => {
                return Err(DchatError::Config(
                    "options 'ronion' and 'rport' must be specified together".into(),
                ));
            },
        };

        Ok(Config {
            identity: Identity { onion_id, listen_port, nickname },
            listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            relay: RelayConfig {
                address: self.relay.unwrap_or(DEFAULT_RELAY),
            },
            bootstrap,
        })
    }
}

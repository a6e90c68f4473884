// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::cfg::config::Options;

/// Command-line surface. Long names match the configuration-file options;
/// values given here override the file.
#[derive(Parser, Debug)]
#[command(
    name = "dchat",
    version,
    about = "Location-hidden peer-to-peer chat over an anonymity relay"
)]
pub struct Cli {
    /// Onion id of the local hidden service
    #[arg(short = 's', long = "lonion", value_name = "ONIONID")]
    pub lonion: Option<String>,

    /// Nickname used for this chat session (1..=31 printable bytes)
    #[arg(short = 'n', long = "nickname", value_name = "NICKNAME")]
    pub nickname: Option<String>,

    /// Local port accepting peer connections (default 7777)
    #[arg(short = 'l', long = "lport", value_name = "LOCALPORT")]
    pub lport: Option<u16>,

    /// Onion id of a peer to connect to at startup
    #[arg(short = 'd', long = "ronion", value_name = "REMOTEONIONID")]
    pub ronion: Option<String>,

    /// Listening port of the startup peer
    #[arg(short = 'r', long = "rport", value_name = "REMOTEPORT")]
    pub rport: Option<u16>,

    /// Configuration file, one `<option> <value>` pair per line
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// YAML logger configuration
    #[arg(long = "logger", value_name = "FILE")]
    pub logger: Option<PathBuf>,

    /// SOCKS endpoint of the anonymity relay (default 127.0.0.1:9050)
    #[arg(long = "relay", value_name = "ADDR")]
    pub relay: Option<SocketAddr>,
}

impl Cli {
    /// The option values carried on the command line, ready to overlay the
    /// configuration file.
    pub fn options(&self) -> Options {
        Options {
            lonion: self.lonion.clone(),
            nickname: self.nickname.clone(),
            lport: self.lport,
            ronion: self.ronion.clone(),
            rport: self.rport,
            relay: self.relay,
        }
    }
}

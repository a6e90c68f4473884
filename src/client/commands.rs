// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

use anyhow::{Result, bail};

use crate::{
    contacts::{contact::Endpoint, list::ContactList},
    models::{onion::is_valid_onion, pdu::is_valid_port},
};

/// The in-chat command surface. `/exit` never reaches the dispatcher, the
/// input producer consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Connect(Endpoint),
}

impl Command {
    /// Parses a `/`-prefixed input line. Unknown commands and argument
    /// violations come back as user-facing errors; such lines are never
    /// broadcast as chat text.
    pub fn parse(line: &str) -> Result<Command> {
        if let Some(rest) = line.strip_prefix("/connect ") {
            return Self::parse_connect(rest);
        }
        match line {
            "/help" => Ok(Command::Help),
            "/list" => Ok(Command::List),
            "/connect" => bail!("Syntax: /connect <ONION-ID> <PORT>"),
            other => bail!("Unknown command '{other}'; try /help"),
        }
    }

    fn parse_connect(args: &str) -> Result<Command> {
        let mut parts = args.split_whitespace();
        let (Some(onion), Some(port)) = (parts.next(), parts.next()) else {
            bail!("Syntax: /connect <ONION-ID> <PORT>");
        };
        if parts.next().is_some() {
            bail!("Syntax: /connect <ONION-ID> <PORT>");
        }

        if !is_valid_onion(onion) {
            bail!("Invalid onion-id '{onion}'!");
        }
        let port: u16 = match port.parse() {
            Ok(p) if is_valid_port(p) => p,
            _ => bail!("Invalid port '{port}'!"),
        };

        Ok(Command::Connect(Endpoint {
            onion_id: onion.parse()?,
            port,
        }))
    }

    pub fn help_text() -> &'static str {
        "The following commands are available:\n\
         \x20   /connect <onion-id> <port>...connect to another chat client\n\
         \x20   /exit..................close the chat program\n\
         \x20   /help..................show this help page\n\
         \x20   /list..................show all connected contacts"
    }

    /// Renders every identified contact with its nickname, onion id and
    /// listening port.
    pub fn render_list(list: &ContactList) -> String {
        if list.used() == 0 {
            return "No contacts found in the contactlist".to_owned();
        }

        let mut out = String::new();
        for (_, contact) in list.iter_occupied() {
            let Some(endpoint) = &contact.endpoint else {
                continue;
            };
            if !contact.is_identified() {
                continue;
            }
            let _ = write!(
                out,
                "\n    Contact................{}\n\
                 \x20   Onion-ID...............{}\n\
                 \x20   Listening-Port.........{}\n",
                if contact.nickname.is_empty() { "<unnamed>" } else { &contact.nickname },
                endpoint.onion_id,
                endpoint.port
            );
        }
        if out.is_empty() {
            return "No identified contacts yet".to_owned();
        }
        out
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    cfg::config::Identity,
    contacts::{contact::Endpoint, list::ContactList},
    errors::Result,
    models::pdu::{ContentType, Pdu, PduBuilder},
};

/// Builds the `control/discover` PDU sent to a newly connected peer.
///
/// The content announces the local identity first, then every identified
/// contact except the recipient slot, one `<onion_id> <port>` line each. The
/// recipient merges unknown lines into its own mesh view.
pub fn discover_pdu(
    me: &Identity,
    list: &ContactList,
    recipient: Option<usize>,
) -> Result<Pdu> {
    let mut content = Endpoint::from(me).to_wire();
    for (slot, contact) in list.iter_occupied() {
        if Some(slot) == recipient || !contact.is_identified() {
            continue;
        }
        if let Some(ep) = &contact.endpoint {
            content.push_str(&ep.to_wire());
        }
    }

    PduBuilder::new(
        ContentType::ControlDiscover,
        me.onion_id.clone(),
        me.listen_port,
        &me.nickname,
    )?
    .content(Bytes::from(content))
    .build()
}

/// Parses the newline-separated endpoint list out of a `control/discover`
/// content section. Any malformed line makes the whole PDU illegal.
pub fn parse_gossip(pdu: &Pdu) -> Result<Vec<Endpoint>> {
    let mut endpoints = Vec::new();
    let mut offset = 0;
    while offset < pdu.content_length() {
        let (line, next) = pdu.content_part(offset, b'\n')?;
        let line = std::str::from_utf8(line).map_err(|_| {
            crate::errors::DchatError::protocol("gossip line is not valid ASCII")
        })?;
        let endpoint = Endpoint::from_wire(line)?;
        if !endpoints.contains(&endpoint) {
            endpoints.push(endpoint);
        }
        offset = next;
    }
    Ok(endpoints)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    errors::{DchatError, Result},
    models::{
        header::{HeaderId, emit_value},
        pdu::Pdu,
    },
};

/// Serializes a PDU into its wire form.
///
/// The version header comes first, then every other header in the
/// deterministic order of the header table (unset optionals are skipped), an
/// empty line and the content bytes. Lines are terminated with `<LF>`. Every
/// field is re-validated; an invalid mandatory field is an internal contract
/// error, never a peer fault.
pub fn encode_pdu(pdu: &Pdu) -> Result<Bytes> {
    pdu.validate()?;

    let mut out = BytesMut::with_capacity(256 + pdu.content_length());
    for id in HeaderId::ALL {
        match emit_value(pdu, id) {
            Some(value) => {
                out.put_slice(id.name().as_bytes());
                out.put_slice(b": ");
                out.put_slice(value.as_bytes());
                out.put_u8(b'\n');
            },
            None if id.mandatory() => {
                return Err(DchatError::Programming(format!(
                    "mandatory header '{}' is unset at encode time",
                    id.name()
                )));
            },
            None => {},
        }
    }
    out.put_u8(b'\n');
    out.put_slice(&pdu.content);
    Ok(out.freeze())
}

/// Encodes and writes a PDU, returning the number of bytes put on the wire.
pub async fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<usize>
where W: AsyncWrite + Unpin {
    let raw = encode_pdu(pdu)?;
    writer
        .write_all(&raw)
        .await
        .map_err(|e| DchatError::peer(format!("pdu write failed: {e}")))?;
    Ok(raw.len())
}

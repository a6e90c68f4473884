// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::{
    errors::{DchatError, Result},
    models::{
        header::{HeaderId, PduDraft},
        pdu::Pdu,
    },
};

/// Reads one raw line into `buf`, growing it until `<LF>` or end of stream.
///
/// Returns the number of bytes appended, zero on end of stream. The line is
/// returned verbatim including its terminator; interpretation is strictly a
/// second pass.
pub async fn read_line_bytes<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<usize>
where R: AsyncBufRead + Unpin {
    buf.clear();
    let n = reader
        .read_until(b'\n', buf)
        .await
        .map_err(|e| DchatError::peer(format!("line read failed: {e}")))?;
    Ok(n)
}

/// Strips the line terminator, accepting both `<LF>` and `<CR><LF>`.
/// A line without a trailing `<LF>` (stream ended mid-line) is illegal.
fn strip_termination(line: &[u8]) -> Result<&str> {
    let Some(body) = line.strip_suffix(b"\n") else {
        return Err(DchatError::peer("stream ended inside a header line"));
    };
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    let s = std::str::from_utf8(body)
        .map_err(|_| DchatError::protocol("header line is not valid ASCII"))?;
    if !s.is_ascii() {
        return Err(DchatError::protocol("header line is not valid ASCII"));
    }
    Ok(s)
}

/// Splits `Name: value` and resolves the name against the header table.
fn split_header(line: &str) -> Result<(HeaderId, &str)> {
    let (key, rest) = line
        .split_once(':')
        .ok_or_else(|| DchatError::protocol(format!("not a header line: '{line}'")))?;
    let value = rest
        .strip_prefix(' ')
        .ok_or_else(|| DchatError::protocol(format!("malformed header value in '{line}'")))?;
    let id = HeaderId::from_name(key)
        .ok_or_else(|| DchatError::protocol(format!("unknown header '{key}'")))?;
    Ok((id, value))
}

/// Reads one complete PDU from the stream.
///
/// The first line must decode as `DCHAT: 1.0`; subsequent lines are matched
/// against the header table until the empty line, then exactly
/// `Content-Length` content bytes are consumed. Returns `Ok(None)` on a clean
/// end of stream at a PDU boundary; end of stream anywhere inside a PDU is a
/// peer failure.
pub async fn read_pdu<R>(reader: &mut R) -> Result<Option<Pdu>>
where R: AsyncBufRead + Unpin {
    let mut line = Vec::with_capacity(128);
    let mut draft = PduDraft::new();

    if read_line_bytes(reader, &mut line).await? == 0 {
        return Ok(None);
    }
    let (id, value) = split_header(strip_termination(&line)?)?;
    if id != HeaderId::Version {
        return Err(DchatError::protocol(format!(
            "first header must be '{}', got '{}'",
            HeaderId::Version.name(),
            id.name()
        )));
    }
    draft.apply(id, value)?;

    loop {
        if read_line_bytes(reader, &mut line).await? == 0 {
            return Err(DchatError::peer("stream ended inside the header section"));
        }
        let stripped = strip_termination(&line)?;
        if stripped.is_empty() {
            break;
        }
        let (id, value) = split_header(stripped)?;
        draft.apply(id, value)?;
    }

    let content_length = draft
        .content_length()
        .ok_or_else(|| DchatError::protocol("mandatory header 'Content-Length' missing"))?;

    let mut content = BytesMut::zeroed(content_length);
    if content_length > 0 {
        reader
            .read_exact(&mut content[..])
            .await
            .map_err(|e| DchatError::peer(format!("content read failed: {e}")))?;
    }

    Ok(Some(draft.finish(content.freeze())?))
}

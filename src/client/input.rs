// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Line the user types to leave the chat.
pub const EXIT_COMMAND: &str = "/exit";

/// The input producer: reads user lines from the input source and frames
/// them onto the internal queue.
///
/// Empty input is a no-op and never transmitted. End of input or `/exit`
/// ends the task and begins orderly shutdown through the root token.
pub async fn run_input<R>(
    mut source: R,
    lines: mpsc::Sender<String>,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut buf = String::new();
    loop {
        buf.clear();
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = source.read_line(&mut buf) => match res {
                Ok(0) => {
                    info!("end of input; shutting down");
                    cancel.cancel();
                    break;
                },
                Ok(_) => {
                    let line = buf.trim_end_matches(['\r', '\n']);
                    if line == EXIT_COMMAND {
                        info!("exit requested; shutting down");
                        cancel.cancel();
                        break;
                    }
                    if line.is_empty() {
                        continue;
                    }
                    if lines.send(line.to_owned()).await.is_err() {
                        debug!("line queue closed; input producer stopping");
                        break;
                    }
                },
                Err(e) => {
                    error!("input read failed: {e}");
                    cancel.cancel();
                    break;
                },
            },
        }
    }
}

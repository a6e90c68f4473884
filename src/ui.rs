// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tokio::{
    io::AsyncWriteExt,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the core hands to the user-interface collaborator. The core never
/// writes chat output directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A chat message paired with the sender's nickname.
    Message { nickname: String, text: String },
    /// Informational output such as command results.
    Info(String),
}

/// Minimal console renderer: one line per message, flushed eagerly so the
/// conversation stays readable next to the prompt.
pub async fn run_console(mut events: mpsc::Receiver<UiEvent>, cancel: CancellationToken) {
    let mut out = tokio::io::stdout();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(UiEvent::Message { nickname, text }) => {
                    let line = format!("{nickname}: {text}\n");
                    if out.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = out.flush().await;
                },
                Some(UiEvent::Info(text)) => {
                    let line = format!("{text}\n");
                    if out.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = out.flush().await;
                },
                None => break,
            },
        }
    }
    debug!("console renderer stopped");
}

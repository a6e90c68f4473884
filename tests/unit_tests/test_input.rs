// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use dchat_client_rs::client::input::run_input;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn collect(source: &'static [u8]) -> (Vec<String>, bool) {
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    run_input(source, tx, cancel.clone()).await;

    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    (lines, cancel.is_cancelled())
}

#[tokio::test]
async fn lines_are_framed_in_order() {
    let (lines, cancelled) = collect(b"hello\nworld\n").await;
    assert_eq!(lines, vec!["hello".to_owned(), "world".to_owned()]);
    // end of input begins orderly shutdown
    assert!(cancelled);
}

#[tokio::test]
async fn empty_input_is_a_no_op() {
    let (lines, _) = collect(b"\n\nhello\n\n").await;
    assert_eq!(lines, vec!["hello".to_owned()]);
}

#[tokio::test]
async fn exit_terminates_the_producer() {
    let (lines, cancelled) = collect(b"one\n/exit\nnever seen\n").await;
    assert_eq!(lines, vec!["one".to_owned()]);
    assert!(cancelled);
}

#[tokio::test]
async fn carriage_returns_are_stripped() {
    let (lines, _) = collect(b"windows line\r\n").await;
    assert_eq!(lines, vec!["windows line".to_owned()]);
}

#[tokio::test]
async fn commands_pass_through_to_the_queue() {
    let (lines, _) = collect(b"/list\n").await;
    assert_eq!(lines, vec!["/list".to_owned()]);
}

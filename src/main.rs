// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use clap::Parser;
use dchat_client_rs::{
    cfg::{cli::Cli, config::Options, logger::init_logger},
    client::{core::Core, input::run_input},
    contacts::contact::Endpoint,
    ui::run_console,
};
use tokio::{
    io::BufReader,
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger_guard = init_logger(cli.logger.as_deref())?;

    // Config file first, command line on top.
    let file_opts = match &cli.config {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };
    let cfg = file_opts
        .overlay(cli.options())
        .into_config()
        .context("invalid configuration")?;
    info!("starting as {}", cfg.identity);

    let cancel = CancellationToken::new();
    let (ui_tx, ui_rx) = mpsc::channel(128);

    // Bind before spawning anything; a taken port must fail the startup.
    let core = Core::bind(&cfg, ui_tx, cancel.clone())?;
    let handles = core.handles();

    spawn_signal_handler(cancel.clone())?;
    let (loop_handle, connector_handle) = core.start();
    let console_handle = tokio::spawn(run_console(ui_rx, cancel.clone()));
    let input_handle = tokio::spawn(run_input(
        BufReader::new(tokio::io::stdin()),
        handles.lines.clone(),
        cancel.clone(),
    ));

    if let Some((onion_id, port)) = cfg.bootstrap.clone() {
        let peer = Endpoint { onion_id, port };
        info!(peer = %peer, "connecting to startup peer");
        if handles.connects.send(peer).is_err() {
            warn!("connector unavailable for the startup peer");
        }
    }

    // The initial task waits for the input producer; both EOF/'/exit' and a
    // termination signal funnel through the root token.
    let _ = input_handle.await;
    cancel.cancel();

    if let Err(e) = loop_handle.await.context("event loop panicked")? {
        warn!("event loop finished with error: {e}");
    }
    let _ = connector_handle.await;
    let _ = console_handle.await;

    println!("Good Bye!");
    Ok(())
}

/// Routes the termination signals into the root cancellation token.
fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    let mut hup = signal(SignalKind::hangup()).context("signal handler")?;
    let mut int = signal(SignalKind::interrupt()).context("signal handler")?;
    let mut quit = signal(SignalKind::quit()).context("signal handler")?;
    let mut term = signal(SignalKind::terminate()).context("signal handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = hup.recv() => {},
            _ = int.recv() => {},
            _ = quit.recv() => {},
            _ = term.recv() => {},
        }
        info!("termination signal received; shutting down");
        cancel.cancel();
    });
    Ok(())
}

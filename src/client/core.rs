// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::Config,
    client::{
        connector::Connector,
        event_loop::{EventLoop, PeerEvent, Registration},
        transport::bind_listener,
    },
    contacts::{contact::Endpoint, list::ContactBook},
    errors::Result as CoreResult,
    ui::UiEvent,
};

/// Queue depth of the user-line and peer-event channels; control channels
/// are unbounded because their writes are best-effort and must not block.
const QUEUE_DEPTH: usize = 64;

/// Producer ends handed to the outside collaborators: the input producer
/// writes user lines, the command layer and gossip write connect requests.
#[derive(Debug, Clone)]
pub struct CoreHandles {
    pub lines: mpsc::Sender<String>,
    pub connects: mpsc::UnboundedSender<Endpoint>,
}

/// The assembled concurrent core: one acceptor/event loop, one connector,
/// all sharing the single mutex-guarded contactlist.
pub struct Core {
    local_addr: SocketAddr,
    listener: TcpListener,
    event_loop: EventLoop,
    connector: Connector,
    handles: CoreHandles,
    lines_rx: mpsc::Receiver<String>,
    connects_rx: mpsc::UnboundedReceiver<Endpoint>,
    registered_rx: mpsc::UnboundedReceiver<Registration>,
    events_rx: mpsc::Receiver<PeerEvent>,
}

impl Core {
    /// Binds the service socket and wires every channel. Bind failures are
    /// fatal to startup, before any peer socket exists.
    pub fn bind(
        cfg: &Config,
        ui: mpsc::Sender<UiEvent>,
        cancel: CancellationToken,
    ) -> CoreResult<Core> {
        let listener = bind_listener(cfg.listen_address, cfg.identity.listen_port)?;
        let local_addr = listener.local_addr().map_err(|e| {
            crate::errors::DchatError::Resource(format!("local_addr failed: {e}"))
        })?;

        let book = Arc::new(ContactBook::new());
        let (lines_tx, lines_rx) = mpsc::channel(QUEUE_DEPTH);
        let (connects_tx, connects_rx) = mpsc::unbounded_channel();
        let (registered_tx, registered_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(QUEUE_DEPTH);

        let event_loop = EventLoop::new(
            cfg.identity.clone(),
            Arc::clone(&book),
            ui,
            events_tx.clone(),
            connects_tx.clone(),
            cancel.clone(),
        );
        let connector = Connector::new(
            cfg.identity.clone(),
            Arc::clone(&book),
            cfg.relay.address,
            events_tx,
            registered_tx,
            cancel,
        );

        Ok(Core {
            local_addr,
            listener,
            event_loop,
            connector,
            handles: CoreHandles { lines: lines_tx, connects: connects_tx },
            lines_rx,
            connects_rx,
            registered_rx,
            events_rx,
        })
    }

    /// Where the acceptor actually listens; useful when the configured port
    /// was 0 in tests.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handles(&self) -> CoreHandles {
        self.handles.clone()
    }

    /// Spawns the connector and the event loop.
    pub fn start(self) -> (JoinHandle<Result<()>>, JoinHandle<()>) {
        let Core {
            listener,
            event_loop,
            connector,
            lines_rx,
            connects_rx,
            registered_rx,
            events_rx,
            ..
        } = self;

        let loop_handle = tokio::spawn(event_loop.run(
            listener,
            lines_rx,
            registered_rx,
            events_rx,
        ));
        let connector_handle = tokio::spawn(connector.run(connects_rx));
        (loop_handle, connector_handle)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedReadHalf},
    sync::{Mutex, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cfg::config::Identity,
    client::commands::Command,
    codec::{decoder::read_pdu, encoder::encode_pdu},
    contacts::{
        contact::{Contact, ContactState, Endpoint, PeerWriter},
        gossip::{discover_pdu, parse_gossip},
        list::{ContactBook, Resolution},
    },
    errors::DchatError,
    models::pdu::{ContentType, Pdu, PduBuilder},
    ui::UiEvent,
};

/// Notice from the connector that a new outbound contact occupies a slot;
/// consuming it refreshes the loop's view of the watch set.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub slot: usize,
    pub generation: u64,
}

/// What a per-peer reader feeds into the central loop. Events are tagged with
/// the slot generation so anything queued for an evicted occupant is dropped.
#[derive(Debug)]
pub enum PeerEvent {
    Pdu {
        slot: usize,
        generation: u64,
        pdu: Pdu,
    },
    /// End of stream at a PDU boundary: a clean disconnect.
    Closed { slot: usize, generation: u64 },
    /// Decode or transport failure.
    Failed {
        slot: usize,
        generation: u64,
        error: DchatError,
    },
}

/// Spawns the reader task of one peer socket. PDUs are forwarded in transport
/// order; the task ends on contact cancellation, end of stream or the first
/// failure.
pub(crate) fn spawn_reader(
    slot: usize,
    generation: u64,
    read_half: OwnedReadHalf,
    cancel: CancellationToken,
    events: mpsc::Sender<PeerEvent>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = read_pdu(&mut reader) => match res {
                    Ok(Some(pdu)) => {
                        if events.send(PeerEvent::Pdu { slot, generation, pdu }).await.is_err() {
                            break;
                        }
                    },
                    Ok(None) => {
                        let _ = events.send(PeerEvent::Closed { slot, generation }).await;
                        break;
                    },
                    Err(error) => {
                        let _ = events
                            .send(PeerEvent::Failed { slot, generation, error })
                            .await;
                        break;
                    },
                },
            }
        }
    });
}

/// The central multiplexing loop.
///
/// One `select!` iteration waits on the cancellation token, the user-line
/// queue, the acceptor, the connector's registration channel and the merged
/// peer-event channel, then dispatches. The contactlist mutex is only ever
/// taken inside a dispatch and released before the next suspension point.
pub struct EventLoop {
    identity: Identity,
    book: Arc<ContactBook>,
    ui: mpsc::Sender<UiEvent>,
    events_tx: mpsc::Sender<PeerEvent>,
    connects: mpsc::UnboundedSender<Endpoint>,
    cancel: CancellationToken,
}

impl EventLoop {
    pub fn new(
        identity: Identity,
        book: Arc<ContactBook>,
        ui: mpsc::Sender<UiEvent>,
        events_tx: mpsc::Sender<PeerEvent>,
        connects: mpsc::UnboundedSender<Endpoint>,
        cancel: CancellationToken,
    ) -> Self {
        Self { identity, book, ui, events_tx, connects, cancel }
    }

    pub async fn run(
        mut self,
        listener: TcpListener,
        mut lines: mpsc::Receiver<String>,
        mut registered: mpsc::UnboundedReceiver<Registration>,
        mut events: mpsc::Receiver<PeerEvent>,
    ) -> Result<()> {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.recv() => match line {
                    Some(line) => self.handle_local_line(line).await?,
                    None => {
                        debug!("input producer finished; shutting down");
                        cancel.cancel();
                        break;
                    },
                },
                res = listener.accept() => {
                    let (stream, addr) = res.map_err(|e| {
                        DchatError::Resource(format!("accept failed: {e}"))
                    })?;
                    self.handle_accept(stream, addr).await;
                },
                Some(reg) = registered.recv() => {
                    debug!(slot = reg.slot, "outbound contact registered");
                },
                Some(event) = events.recv() => self.handle_peer_event(event).await?,
            }
        }
        self.shutdown();
        Ok(())
    }

    /// A line from the input producer: either an in-chat command or a chat
    /// message broadcast to every peer socket in slot order.
    async fn handle_local_line(&mut self, line: String) -> Result<()> {
        if line.starts_with('/') {
            return self.handle_command(&line).await;
        }
        if line.is_empty() {
            return Ok(());
        }

        let pdu = PduBuilder::new(
            ContentType::TextPlain,
            self.identity.onion_id.clone(),
            self.identity.listen_port,
            &self.identity.nickname,
        )?
        .content(line.clone().into_bytes())
        .build()?;
        let raw = encode_pdu(&pdu)?;

        let targets: Vec<(usize, u64, PeerWriter)> = {
            let list = self.book.lock();
            list.iter_occupied()
                .map(|(slot, c)| (slot, c.generation, c.writer.clone()))
                .collect()
        };

        let mut failed = Vec::new();
        for (slot, generation, writer) in targets {
            if let Err(e) = writer.lock().await.write_all(&raw).await {
                warn!(slot, "message write failed: {e}");
                failed.push((slot, generation));
            }
        }
        for (slot, generation) in failed {
            self.evict(slot, generation, "write failure");
        }

        // local echo through the same UI surface the peers render on
        let _ = self
            .ui
            .send(UiEvent::Message {
                nickname: self.identity.nickname.clone(),
                text: line,
            })
            .await;
        Ok(())
    }

    async fn handle_command(&mut self, line: &str) -> Result<()> {
        match Command::parse(line) {
            Ok(Command::Help) => {
                let _ = self.ui.send(UiEvent::Info(Command::help_text().into())).await;
            },
            Ok(Command::List) => {
                let listing = {
                    let list = self.book.lock();
                    Command::render_list(&list)
                };
                let _ = self.ui.send(UiEvent::Info(listing)).await;
            },
            Ok(Command::Connect(endpoint)) => {
                info!(peer = %endpoint, "connection requested");
                if self.connects.send(endpoint).is_err() {
                    warn!("connector is gone; request dropped");
                }
            },
            Err(e) => {
                warn!("{e}");
                let _ = self.ui.send(UiEvent::Info(e.to_string())).await;
            },
        }
        Ok(())
    }

    /// A new inbound session: install the contact as accepted and transmit
    /// the local contactlist as the identification handshake.
    async fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let child = self.cancel.child_token();
        let writer: PeerWriter = Arc::new(Mutex::new(write_half));
        let contact = Contact::inbound(writer.clone(), child.clone());

        let (slot, generation, handshake) = {
            let mut list = self.book.lock();
            let (slot, generation) = list.add(contact);
            let handshake = discover_pdu(&self.identity, &list, Some(slot))
                .and_then(|pdu| encode_pdu(&pdu));
            (slot, generation, handshake)
        };
        info!(slot, %addr, "contact accepted");

        let handshake = match handshake {
            Ok(raw) => raw,
            Err(e) => {
                error!(slot, "could not craft handshake: {e}");
                self.evict(slot, generation, "handshake build failure");
                return;
            },
        };
        if let Err(e) = writer.lock().await.write_all(&handshake).await {
            warn!(slot, "handshake write failed: {e}");
            self.evict(slot, generation, "handshake write failure");
            return;
        }

        spawn_reader(slot, generation, read_half, child, self.events_tx.clone());
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) -> Result<()> {
        match event {
            PeerEvent::Closed { slot, generation } => {
                let mut list = self.book.lock();
                if list.check_generation(slot, generation) {
                    let label = list.get(slot).map(Contact::label).unwrap_or_default();
                    info!(slot, "contact '{label}' disconnected");
                    list.delete(slot)?;
                }
                Ok(())
            },
            PeerEvent::Failed { slot, generation, error } => {
                self.evict(slot, generation, &error.to_string());
                Ok(())
            },
            PeerEvent::Pdu { slot, generation, pdu } => {
                self.handle_pdu(slot, generation, pdu).await
            },
        }
    }

    /// Per-contact protocol handling under the contactlist mutex. UI and
    /// connector submissions are collected inside the critical section and
    /// performed after it.
    async fn handle_pdu(&mut self, slot: usize, generation: u64, pdu: Pdu) -> Result<()> {
        let mut ui_events: Vec<UiEvent> = Vec::new();
        let mut connect_requests: Vec<Endpoint> = Vec::new();

        {
            let mut list = self.book.lock();
            if !list.check_generation(slot, generation) {
                debug!(slot, "event for recycled slot dropped");
                return Ok(());
            }
            let Some(contact) = list.get_mut(slot) else {
                return Ok(());
            };

            match contact.state {
                ContactState::Closed => return Ok(()),
                ContactState::Opening => {
                    // the very first PDU must identify the peer
                    if pdu.content_type != ContentType::ControlDiscover {
                        warn!(slot, "contact has not identified itself");
                        list.delete(slot)?;
                        return Ok(());
                    }
                    contact.endpoint = Some(Endpoint {
                        onion_id: pdu.host.clone(),
                        port: pdu.listen_port,
                    });
                    contact.nickname = pdu.nickname.clone().unwrap_or_default();
                    contact.state = ContactState::Identified;
                    info!(slot, "contact identified as '{}'", contact.label());
                },
                ContactState::Identified => {
                    let Some(known) = contact.endpoint.as_ref() else {
                        return Err(DchatError::Programming(format!(
                            "identified slot {slot} has no endpoint"
                        ))
                        .into());
                    };
                    if known.onion_id != pdu.host || known.port != pdu.listen_port {
                        warn!(
                            slot,
                            "identity mutated from {known} to {}:{}",
                            pdu.host,
                            pdu.listen_port
                        );
                        list.delete(slot)?;
                        return Ok(());
                    }
                    if let Some(nick) = &pdu.nickname
                        && *nick != contact.nickname
                    {
                        info!(
                            slot,
                            "nickname changed from '{}' to '{nick}'", contact.nickname
                        );
                        contact.nickname = nick.clone();
                    }
                },
            }

            match pdu.content_type {
                ContentType::TextPlain => {
                    let nickname = list
                        .get(slot)
                        .map(Contact::label)
                        .unwrap_or_default();
                    ui_events.push(UiEvent::Message {
                        nickname,
                        text: String::from_utf8_lossy(&pdu.content).into_owned(),
                    });
                },
                ContentType::ControlDiscover => {
                    match list.duplicate_of(slot, &self.identity) {
                        Ok(Resolution::Unique) => {},
                        Ok(Resolution::Evict(dup)) => {
                            info!(slot = dup, "duplicate session resolved; removing it");
                            list.delete(dup)?;
                            if dup == slot {
                                return Ok(());
                            }
                        },
                        Err(e) => warn!(slot, "duplicate resolution failed: {e}"),
                    }

                    match parse_gossip(&pdu) {
                        Ok(endpoints) => {
                            for endpoint in endpoints {
                                if list.find(&endpoint, 0, &self.identity).is_none() {
                                    connect_requests.push(endpoint);
                                }
                            }
                        },
                        Err(e) => {
                            warn!(slot, "illegal gossip content: {e}");
                            list.delete(slot)?;
                            return Ok(());
                        },
                    }
                },
                ContentType::ApplicationOctet | ContentType::ControlReply => {
                    debug!(slot, content_type = %pdu.content_type, "content type not handled");
                },
            }
        }

        for event in ui_events {
            let _ = self.ui.send(event).await;
        }
        for endpoint in connect_requests {
            debug!(peer = %endpoint, "gossip names an unknown peer; dialing");
            if self.connects.send(endpoint).is_err() {
                warn!("connector is gone; gossip peer dropped");
            }
        }
        Ok(())
    }

    fn evict(&self, slot: usize, generation: u64, reason: &str) {
        let mut list = self.book.lock();
        if !list.check_generation(slot, generation) {
            return;
        }
        let label = list.get(slot).map(Contact::label).unwrap_or_default();
        warn!(slot, "evicting contact '{label}': {reason}");
        if let Err(e) = list.delete(slot) {
            error!(slot, "eviction failed: {e}");
        }
    }

    /// Closes every peer session. The listener is dropped by the caller once
    /// the loop returns.
    fn shutdown(&mut self) {
        let mut list = self.book.lock();
        let occupied: Vec<usize> = list.iter_occupied().map(|(i, _)| i).collect();
        for slot in occupied {
            if let Err(e) = list.delete(slot) {
                error!(slot, "cleanup failed: {e}");
            }
        }
        info!("event core stopped");
    }
}

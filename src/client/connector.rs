// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cfg::config::Identity,
    client::{
        event_loop::{PeerEvent, Registration, spawn_reader},
        socks,
    },
    codec::encoder::encode_pdu,
    contacts::{
        contact::{Contact, Endpoint, PeerWriter},
        gossip::discover_pdu,
        list::ContactBook,
    },
    errors::{DchatError, Result},
};

/// Consumes the outbound-request queue: dials each requested endpoint through
/// the relay, installs the contact and announces it to the event loop.
///
/// Dialing happens outside the contactlist mutex; the lock is only taken for
/// the brief install-and-encode step. Failures are logged and discarded, they
/// never stop the task.
pub struct Connector {
    identity: Identity,
    book: Arc<ContactBook>,
    relay: SocketAddr,
    events: mpsc::Sender<PeerEvent>,
    registered: mpsc::UnboundedSender<Registration>,
    cancel: CancellationToken,
}

impl Connector {
    pub fn new(
        identity: Identity,
        book: Arc<ContactBook>,
        relay: SocketAddr,
        events: mpsc::Sender<PeerEvent>,
        registered: mpsc::UnboundedSender<Registration>,
        cancel: CancellationToken,
    ) -> Self {
        Self { identity, book, relay, events, registered, cancel }
    }

    pub async fn run(self, mut requests: mpsc::UnboundedReceiver<Endpoint>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                req = requests.recv() => match req {
                    Some(endpoint) => {
                        if let Err(e) = self.connect_one(endpoint.clone()).await {
                            warn!(peer = %endpoint, "connection request failed: {e}");
                        }
                    },
                    None => break,
                },
            }
        }
        info!("connector stopped");
    }

    async fn connect_one(&self, endpoint: Endpoint) -> Result<()> {
        let stream =
            socks::connect_via_relay(self.relay, &endpoint.onion_id, endpoint.port)
                .await?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let child = self.cancel.child_token();
        let writer: PeerWriter = Arc::new(Mutex::new(write_half));
        let contact = Contact::outbound(writer.clone(), endpoint.clone(), child.clone());

        let (slot, generation, handshake) = {
            let mut list = self.book.lock();
            let (slot, generation) = list.add(contact);
            let handshake = discover_pdu(&self.identity, &list, Some(slot))
                .and_then(|pdu| encode_pdu(&pdu));
            (slot, generation, handshake)
        };

        let undo = |reason: String| -> DchatError {
            let mut list = self.book.lock();
            if list.check_generation(slot, generation) {
                let _ = list.delete(slot);
            }
            DchatError::peer(reason)
        };

        let handshake = match handshake {
            Ok(raw) => raw,
            Err(e) => return Err(undo(format!("could not craft handshake: {e}"))),
        };
        if let Err(e) = writer.lock().await.write_all(&handshake).await {
            return Err(undo(format!("handshake write to {endpoint} failed: {e}")));
        }

        spawn_reader(slot, generation, read_half, child, self.events.clone());
        let _ = self.registered.send(Registration { slot, generation });
        info!(slot, peer = %endpoint, "outbound contact installed");
        Ok(())
    }
}

//! In-process transport.
//!
//! Every node registers an inbound channel with a shared [`LocalHub`]; sends
//! are `try_send`s into the receivers' channels. Links can be cut to
//! exercise partitions in tests and the devnet.

use super::{InboundMessage, Transport, TransportError};
use bytes::Bytes;
use gambit_types::PeerId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Message switch shared by all in-process nodes.
#[derive(Debug, Default)]
pub struct LocalHub {
    inboxes: RwLock<BTreeMap<PeerId, mpsc::Sender<InboundMessage>>>,
    /// Directed links that drop everything (from, to).
    cut: RwLock<HashSet<(PeerId, PeerId)>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a node. Returns its transport and the receiving end of its
    /// inbound queue.
    ///
    /// Registering the same peer again replaces its inbox.
    pub fn connect(
        self: &Arc<Self>,
        peer: PeerId,
        capacity: usize,
    ) -> (LocalTransport, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        self.inboxes.write().insert(peer, tx);
        debug!(?peer, capacity, "Peer connected to local hub");
        (
            LocalTransport {
                hub: Arc::clone(self),
                local: peer,
            },
            rx,
        )
    }

    /// Remove a node; frames addressed to it fail with `UnknownPeer`.
    pub fn disconnect(&self, peer: &PeerId) {
        self.inboxes.write().remove(peer);
    }

    /// Drop all frames between two nodes, both directions.
    pub fn partition(&self, a: PeerId, b: PeerId) {
        let mut cut = self.cut.write();
        cut.insert((a, b));
        cut.insert((b, a));
    }

    /// Cut a node off from every other node.
    pub fn isolate(&self, peer: PeerId) {
        let others: Vec<PeerId> = self.peers().into_iter().filter(|p| *p != peer).collect();
        for other in others {
            self.partition(peer, other);
        }
    }

    /// Restore every link.
    pub fn heal(&self) {
        self.cut.write().clear();
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.inboxes.read().keys().copied().collect()
    }

    fn deliver(
        &self,
        from: PeerId,
        to: PeerId,
        topic: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        if self.cut.read().contains(&(from, to)) {
            trace!(?from, ?to, topic, "Link cut, frame dropped");
            return Ok(());
        }
        let inbox = self
            .inboxes
            .read()
            .get(&to)
            .cloned()
            .ok_or(TransportError::UnknownPeer(to))?;
        let message = InboundMessage {
            from,
            topic: topic.to_string(),
            payload,
        };
        inbox.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure(to),
            mpsc::error::TrySendError::Closed(_) => TransportError::Disconnected(to),
        })
    }
}

/// One node's handle on a [`LocalHub`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    hub: Arc<LocalHub>,
    local: PeerId,
}

impl LocalTransport {
    pub fn hub(&self) -> &Arc<LocalHub> {
        &self.hub
    }
}

impl Transport for LocalTransport {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    fn broadcast(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        for peer in self.hub.peers() {
            if peer == self.local {
                continue;
            }
            // One slow peer must not stop the rest
            if let Err(err) = self.hub.deliver(self.local, peer, topic, payload.clone()) {
                debug!(?peer, topic, error = %err, "Broadcast frame not delivered");
            }
        }
        Ok(())
    }

    fn unicast(&self, peer: PeerId, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.hub.deliver(self.local, peer, topic, payload)
    }
}

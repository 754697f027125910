//! Topology trait and static implementation.
//!
//! The peer set is fixed at startup. Its order is the leader rotation order.

use crate::{PeerId, PublicKey, View};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of the configured peer set.
pub trait Topology: Send + Sync {
    /// Get the local peer's ID.
    fn local_peer_id(&self) -> PeerId;

    /// Get the ordered peer list.
    fn peers(&self) -> &[PeerId];

    /// Get the public key for a peer.
    fn public_key(&self, peer: &PeerId) -> Option<PublicKey>;

    // Derived methods

    /// Number of configured peers (N).
    fn num_peers(&self) -> usize {
        self.peers().len()
    }

    /// Position of a peer in the rotation order.
    fn peer_index(&self, peer: &PeerId) -> Option<usize> {
        self.peers().iter().position(|p| p == peer)
    }

    /// Check if a peer is part of the configured set.
    fn is_peer(&self, peer: &PeerId) -> bool {
        self.peer_index(peer).is_some()
    }

    /// Maximum number of Byzantine peers tolerated (f, with N >= 3f+1).
    fn max_faulty(&self) -> usize {
        self.num_peers().saturating_sub(1) / 3
    }

    /// Minimum number of distinct signers for a quorum (2f+1 when N = 3f+1).
    fn quorum_threshold(&self) -> usize {
        (self.num_peers() * 2 / 3) + 1
    }

    /// Check if a signer count meets quorum.
    fn has_quorum(&self, count: usize) -> bool {
        count >= self.quorum_threshold()
    }

    /// Leader for a view: `peers[view mod N]`.
    fn leader_for(&self, view: View) -> PeerId {
        let peers = self.peers();
        peers[(view.0 % peers.len() as u64) as usize]
    }

    /// Check if the local peer leads this view.
    fn is_leader(&self, view: View) -> bool {
        self.leader_for(view) == self.local_peer_id()
    }

    /// The local peer's role in a view.
    fn role_for(&self, view: View) -> Role {
        Role::for_view(self, view)
    }
}

/// What the local peer does in a given view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Proposes, aggregates votes and broadcasts certificates.
    Leader,
    /// Validates proposals and votes.
    Voter,
    /// Not in the peer set: follows commits but never signs.
    Observer,
}

impl Role {
    /// Resolve the local peer's role for a view.
    pub fn for_view<T: Topology + ?Sized>(topology: &T, view: View) -> Role {
        let local = topology.local_peer_id();
        if !topology.is_peer(&local) {
            Role::Observer
        } else if topology.leader_for(view) == local {
            Role::Leader
        } else {
            Role::Voter
        }
    }

    /// Whether this role signs votes.
    pub fn votes(&self) -> bool {
        !matches!(self, Role::Observer)
    }
}

/// Errors that can occur when building a topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// No peers were configured.
    #[error("peer list is empty")]
    Empty,

    /// The same key appears twice.
    #[error("peer {0:?} is listed more than once")]
    DuplicatePeer(PeerId),
}

/// A static topology implementation.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    local_peer_id: PeerId,
    peers: Vec<PeerId>,
    public_keys: HashMap<PeerId, PublicKey>,
}

impl StaticTopology {
    /// Create a topology from the ordered peer keys.
    ///
    /// The local peer does not have to be in the list; such a node observes.
    pub fn new(local_peer_id: PeerId, keys: Vec<PublicKey>) -> Result<Self, TopologyError> {
        if keys.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut peers = Vec::with_capacity(keys.len());
        let mut public_keys = HashMap::with_capacity(keys.len());
        for key in keys {
            let peer = PeerId::from_public_key(&key);
            if public_keys.insert(peer, key).is_some() {
                return Err(TopologyError::DuplicatePeer(peer));
            }
            peers.push(peer);
        }

        Ok(Self {
            local_peer_id,
            peers,
            public_keys,
        })
    }

    /// Same peer set seen from another local peer.
    pub fn with_local(&self, local_peer_id: PeerId) -> Self {
        Self {
            local_peer_id,
            ..self.clone()
        }
    }

    /// Create a topology as an Arc.
    pub fn into_arc(self) -> Arc<dyn Topology> {
        Arc::new(self)
    }
}

impl Topology for StaticTopology {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    fn public_key(&self, peer: &PeerId) -> Option<PublicKey> {
        self.public_keys.get(peer).cloned()
    }
}

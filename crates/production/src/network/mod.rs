//! Peer messaging.
//!
//! The consensus core only needs two fire-and-forget operations: send to
//! every configured peer, and send to one. Inbound frames arrive on an mpsc
//! channel per node, ordered per sender but not across senders.

mod codec;
mod local;
mod rate_limiter;
mod wire;

pub use codec::{decode_message, encode_message, CodecError};
pub use local::{LocalHub, LocalTransport};
pub use rate_limiter::{InboundRateLimiter, RateLimitConfig};
pub use wire::{WireError, MAX_MESSAGE_SIZE};

use bytes::Bytes;
use gambit_types::PeerId;
use thiserror::Error;

/// A frame received from a peer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: PeerId,
    pub topic: String,
    pub payload: Bytes,
}

/// Errors from the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer {0:?} is not connected")]
    UnknownPeer(PeerId),

    #[error("Inbound queue of peer {0:?} is full")]
    Backpressure(PeerId),

    #[error("Peer {0:?} stopped receiving")]
    Disconnected(PeerId),
}

/// Outbound side of the peer network.
///
/// Both operations are fire-and-forget: success means the frame was handed
/// to the network, not that it arrived.
pub trait Transport: Send + Sync {
    /// This node's identity on the network.
    fn local_peer_id(&self) -> PeerId;

    /// Send to every other connected peer.
    fn broadcast(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Send to one peer.
    fn unicast(&self, peer: PeerId, topic: &str, payload: Bytes) -> Result<(), TransportError>;
}

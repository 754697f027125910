//! Domain-specific identifier types.

use crate::{Hash, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain tag for peer identifiers.
const DOMAIN_PEER_ID: &[u8] = b"gambit:peer:";

/// Domain tag for session identifiers.
const DOMAIN_SESSION_ID: &[u8] = b"gambit:session:";

/// Peer identifier, derived from the peer's public key.
///
/// The first 20 bytes of `blake3("gambit:peer:" || public_key)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Derive the identifier for a public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let hash = Hash::from_parts(&[DOMAIN_PEER_ID, public_key.as_bytes()]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    /// Get the bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Consensus view (round) counter for one game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct View(pub u64);

impl View {
    /// The view a fresh session starts in.
    pub const GENESIS: Self = View(0);

    /// Get the next view.
    pub fn next(self) -> Self {
        View(self.0 + 1)
    }

    /// Get the previous view (returns None at genesis).
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(View)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View({})", self.0)
    }
}

/// Identifier of a game session, keyed by the ordered player pair.
///
/// `(A, B)` and `(B, A)` are different sessions: the first key plays white.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Hash);

impl SessionId {
    /// Derive the session identifier for a white/black player pair.
    pub fn for_players(white: &PublicKey, black: &PublicKey) -> Self {
        let white_len = (white.as_bytes().len() as u32).to_le_bytes();
        let black_len = (black.as_bytes().len() as u32).to_le_bytes();
        Self(Hash::from_parts(&[
            DOMAIN_SESSION_ID,
            &white_len,
            white.as_bytes(),
            &black_len,
            black.as_bytes(),
        ]))
    }

    /// Get the underlying hash.
    pub fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", &self.0.to_hex()[..8])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_hex()[..16])
    }
}

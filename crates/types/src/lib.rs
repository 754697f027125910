//! Core types for the gambit chess consensus node.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - Primitives: [`Hash`], secp256k1 [`KeyPair`] / [`PublicKey`] / [`Signature`]
//! - Identifiers: [`PeerId`], [`View`], [`SessionId`]
//! - Chess model: [`Board`], [`GameState`], [`MoveError`]
//! - Protocol messages: [`Transaction`], [`Proposal`], [`Vote`],
//!   [`QuorumCertificate`], [`ViewChange`]
//! - Peer set: [`Topology`] and [`StaticTopology`]

mod chess;
mod crypto;
mod hash;
mod identifiers;
mod network;
mod proposal;
pub mod signing;
mod topology;
mod transaction;
mod view_change;
mod vote;

pub use chess::{
    current_game_for, Board, Color, GameState, GameStatus, MoveError, Piece, PieceKind, Position,
    SpecialMove,
};
pub use crypto::{CryptoError, KeyPair, PublicKey, Signature, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
pub use hash::Hash;
pub use identifiers::{PeerId, SessionId, View};
pub use network::NetworkMessage;
pub use proposal::Proposal;
pub use topology::{Role, StaticTopology, Topology, TopologyError};
pub use transaction::{MoveAction, Transaction};
pub use view_change::{LockedProposal, ViewChange};
pub use vote::{QcError, QuorumCertificate, Vote, VoteKind};

//! BFT consensus state machine.
//!
//! This crate provides a synchronous HotStuff-style consensus engine that
//! orders the moves of each chess game. It is used unchanged by both the
//! deterministic simulation and the production runner.
//!
//! # Architecture
//!
//! [`ConsensusEngine`] is a driver with no protocol state of its own; every
//! call mutates one [`GameSession`]:
//!
//! - `Event::ProposalReceived` → Validate, prepare-vote to the leader
//! - `Event::VoteReceived` → Collect votes, form a QC when quorum reached
//! - `Event::PreparedReceived` → Lock, commit-vote to the leader
//! - `Event::CommitReceived` → Apply the move, enter the next view
//! - `Event::ViewTimeout` → Broadcast a view change if no progress
//!
//! All I/O is performed by the runner via returned `Action`s.

mod commit;
mod config;
mod engine;
mod error;
mod session;
mod view_change;
mod vote_set;
mod voting;

pub use config::{BftConfig, BftConfigError};
pub use engine::ConsensusEngine;
pub use error::{ConsensusError, LivenessTimeout, ProtocolError, ValidationError};
pub use session::{
    CommittedMove, ConsensusPhase, EquivocationEvidence, EvidenceKind, GameSession, SessionStats,
};
pub use view_change::ViewChangeTracker;
pub use vote_set::{AddVoteResult, VoteSet};

#[cfg(test)]
mod tests;

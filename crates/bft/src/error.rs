//! Consensus error taxonomy.
//!
//! Nothing here is fatal: handlers return these so the caller can log and
//! drop the offending input.

use gambit_mempool::PoolError;
use gambit_types::{Hash, PeerId, QcError, SessionId, View};

/// Input that is malformed or invalid on its own terms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("bad signature from {0:?}")]
    BadSignature(PeerId),

    #[error("transaction rejected: {0}")]
    Transaction(#[from] PoolError),

    #[error("message names session {found:?}, expected {expected:?}")]
    WrongSession {
        expected: SessionId,
        found: SessionId,
    },

    #[error("certificate does not match the proposal it carries")]
    MismatchedCertificate,
}

/// Valid-looking input that breaks the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown peer {0:?}")]
    UnknownPeer(PeerId),

    #[error("{peer:?} equivocated in {view}")]
    Equivocation { peer: PeerId, view: View },

    #[error("message for {got} while at {current}")]
    StaleView { got: View, current: View },

    #[error("message for {got} is too far ahead of {current}")]
    FutureView { got: View, current: View },

    #[error("message for height {got} while committed height is {committed}")]
    StaleHeight { got: u64, committed: u64 },

    #[error("{proposer:?} is not the leader of {view}")]
    WrongLeader { proposer: PeerId, view: View },

    #[error("bad quorum certificate: {0}")]
    BadQc(#[from] QcError),

    #[error("parent certificate does not extend the committed state")]
    BadParentQc,

    #[error("proposal conflicts with the locked transaction")]
    LockConflict,

    #[error("{view} already committed {existing:?}, got {conflicting:?}")]
    ConflictingCommit {
        view: View,
        existing: Hash,
        conflicting: Hash,
    },

    #[error("vote sent to a peer that does not lead {view}")]
    NotLeader { view: View },
}

/// No quorum formed within the view timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no quorum in {view} within the view timeout")]
pub struct LivenessTimeout {
    pub view: View,
}

/// Any error a consensus handler can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Timeout(#[from] LivenessTimeout),
}

impl From<PoolError> for ConsensusError {
    fn from(err: PoolError) -> Self {
        ConsensusError::Validation(ValidationError::Transaction(err))
    }
}

impl From<QcError> for ConsensusError {
    fn from(err: QcError) -> Self {
        ConsensusError::Protocol(ProtocolError::BadQc(err))
    }
}

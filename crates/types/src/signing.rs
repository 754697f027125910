//! Domain-separated signing messages.
//!
//! Every signed message in the protocol starts with a unique domain tag so a
//! signature from one context can never be replayed in another. Fields follow
//! in a fixed order with little-endian integers and length-prefixed keys, so
//! any client can reproduce the bytes without this crate.
//!
//! # Domain Tags
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `gambit:tx:` | Player move transactions |
//! | `gambit:proposal:` | Leader proposals |
//! | `gambit:vote:` | Prepare and commit votes, QC verification |
//! | `gambit:view_change:` | Timeout view change signals |

use crate::{Hash, PeerId, Position, PublicKey, QuorumCertificate, SessionId, View, VoteKind};

/// Domain tag for move transactions.
///
/// Format: `gambit:tx:` || len(white) || white || len(black) || black ||
/// has_prior || [prior_state_hash] || from.row || from.col || to.row || to.col
pub const DOMAIN_TRANSACTION: &[u8] = b"gambit:tx:";

/// Domain tag for proposals.
///
/// Format: `gambit:proposal:` || session || view || height || qc(parent_qc) ||
/// has_justify || [qc(justify)] || tx_hash || proposer
///
/// where qc(c) = c.session || c.view || c.height || c.kind || c.proposal_hash ||
/// signer_count || (signer || len(signature) || signature)* in signer order.
pub const DOMAIN_PROPOSAL: &[u8] = b"gambit:proposal:";

/// Domain tag for votes.
///
/// Format: `gambit:vote:` || session || view || height || kind || proposal_hash
pub const DOMAIN_VOTE: &[u8] = b"gambit:vote:";

/// Domain tag for view change signals.
///
/// Format: `gambit:view_change:` || session || new_view || highest_qc_view ||
/// has_lock || [locked_proposal_hash] || sender
pub const DOMAIN_VIEW_CHANGE: &[u8] = b"gambit:view_change:";

fn put_key(message: &mut Vec<u8>, key: &PublicKey) {
    message.extend_from_slice(&(key.as_bytes().len() as u32).to_le_bytes());
    message.extend_from_slice(key.as_bytes());
}

fn put_optional_hash(message: &mut Vec<u8>, hash: Option<&Hash>) {
    match hash {
        Some(hash) => {
            message.push(1);
            message.extend_from_slice(hash.as_bytes());
        }
        None => message.push(0),
    }
}

fn put_qc(message: &mut Vec<u8>, qc: &QuorumCertificate) {
    message.extend_from_slice(qc.session.as_hash().as_bytes());
    message.extend_from_slice(&qc.view.0.to_le_bytes());
    message.extend_from_slice(&qc.height.to_le_bytes());
    message.push(qc.kind.tag());
    message.extend_from_slice(qc.proposal_hash.as_bytes());
    message.extend_from_slice(&(qc.signatures.len() as u32).to_le_bytes());
    for (signer, signature) in &qc.signatures {
        message.extend_from_slice(signer.as_bytes());
        message.extend_from_slice(&(signature.as_bytes().len() as u32).to_le_bytes());
        message.extend_from_slice(signature.as_bytes());
    }
}

/// Build the signing message for a move transaction.
pub fn transaction_message(
    white: &PublicKey,
    black: &PublicKey,
    prior_state_hash: Option<&Hash>,
    from: Position,
    to: Position,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(128);
    message.extend_from_slice(DOMAIN_TRANSACTION);
    put_key(&mut message, white);
    put_key(&mut message, black);
    put_optional_hash(&mut message, prior_state_hash);
    message.extend_from_slice(&[from.row, from.col, to.row, to.col]);
    message
}

/// Build the signing message for a proposal.
///
/// The proposal hash is the blake3 hash of these bytes. Both certificates
/// are encoded in full, so two proposals from one leader in one view share
/// a hash exactly when every field other than the signature matches.
pub fn proposal_message(
    session: &SessionId,
    view: View,
    height: u64,
    parent_qc: &QuorumCertificate,
    justify: Option<&QuorumCertificate>,
    tx_hash: &Hash,
    proposer: &PeerId,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(512);
    message.extend_from_slice(DOMAIN_PROPOSAL);
    message.extend_from_slice(session.as_hash().as_bytes());
    message.extend_from_slice(&view.0.to_le_bytes());
    message.extend_from_slice(&height.to_le_bytes());
    put_qc(&mut message, parent_qc);
    match justify {
        Some(justify) => {
            message.push(1);
            put_qc(&mut message, justify);
        }
        None => message.push(0),
    }
    message.extend_from_slice(tx_hash.as_bytes());
    message.extend_from_slice(proposer.as_bytes());
    message
}

/// Build the signing message for a vote.
///
/// This is used for:
/// - Individual prepare and commit vote signatures
/// - QC signature verification
pub fn vote_message(
    session: &SessionId,
    view: View,
    height: u64,
    kind: VoteKind,
    proposal_hash: &Hash,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(96);
    message.extend_from_slice(DOMAIN_VOTE);
    message.extend_from_slice(session.as_hash().as_bytes());
    message.extend_from_slice(&view.0.to_le_bytes());
    message.extend_from_slice(&height.to_le_bytes());
    message.push(kind.tag());
    message.extend_from_slice(proposal_hash.as_bytes());
    message
}

/// Build the signing message for a view change signal.
pub fn view_change_message(
    session: &SessionId,
    new_view: View,
    highest_qc_view: View,
    locked_proposal_hash: Option<&Hash>,
    sender: &PeerId,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(128);
    message.extend_from_slice(DOMAIN_VIEW_CHANGE);
    message.extend_from_slice(session.as_hash().as_bytes());
    message.extend_from_slice(&new_view.0.to_le_bytes());
    message.extend_from_slice(&highest_qc_view.0.to_le_bytes());
    put_optional_hash(&mut message, locked_proposal_hash);
    message.extend_from_slice(sender.as_bytes());
    message
}

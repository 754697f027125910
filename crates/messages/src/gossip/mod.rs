//! Messages broadcast to every peer (and votes, sent to one leader).

mod certified;
mod proposal;
mod start;
mod transaction;
mod view_change;
mod vote;

pub use certified::{CommitGossip, PreparedGossip};
pub use proposal::ProposalGossip;
pub use start::GameStartGossip;
pub use transaction::TransactionGossip;
pub use view_change::ViewChangeGossip;
pub use vote::VoteGossip;

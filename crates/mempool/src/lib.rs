//! Transaction pool.
//!
//! One pool per game session buffers signed moves that have not been
//! committed yet, in arrival order. The leader takes the oldest pending
//! entry for its proposal; the entry stays in the pool (marked in flight)
//! until a commit removes it, so a failed view hands it to the next leader.

mod pool;

pub use pool::{check_transaction, EntryStatus, PoolError, TransactionPool};

//! Client request correlation.

/// Ties a `SubmitTransaction` event to its `EmitTransactionResult` action.
///
/// The state machine only echoes the id back. Runners keep the map from id
/// to whoever is waiting: the production session task holds a oneshot
/// sender per id, the simulation records results for tests to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

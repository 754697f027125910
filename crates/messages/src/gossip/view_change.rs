//! ViewChange gossip message.

use gambit_types::{NetworkMessage, ViewChange};
use serde::{Deserialize, Serialize};

/// Timeout signal: the sender gave up on its view and moved on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChangeGossip {
    pub view_change: ViewChange,
}

impl ViewChangeGossip {
    /// Create a new view change gossip message.
    pub fn new(view_change: ViewChange) -> Self {
        Self { view_change }
    }

    /// Get the inner signal.
    pub fn view_change(&self) -> &ViewChange {
        &self.view_change
    }

    /// Consume and return the inner signal.
    pub fn into_view_change(self) -> ViewChange {
        self.view_change
    }
}

impl NetworkMessage for ViewChangeGossip {
    fn message_type_id() -> &'static str {
        "consensus.view_change"
    }
}

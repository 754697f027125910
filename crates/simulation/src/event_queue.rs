//! Deterministic event ordering.

use crate::NodeIndex;
use gambit_core::{Event, EventPriority};
use std::time::Duration;

/// Key of a scheduled event.
///
/// Field order is the ordering: time, then priority, then node, then the
/// sequence number assigned at scheduling. Two runs that schedule the same
/// events in the same order process them identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node_index: NodeIndex,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, node_index: NodeIndex, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node_index,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_core::RequestId;
    use gambit_test_helpers::{signed_move, test_players};
    use gambit_types::SessionId;
    use std::collections::BTreeMap;

    #[test]
    fn test_ordering() {
        let (white, black) = test_players();
        let tx = signed_move(&white, &black, &white, None, "e2", "e4");
        let session: SessionId = tx.session_id();

        let timer = Event::ViewTimeout { session };
        let gossip = Event::TransactionGossipReceived { tx: tx.clone() };
        let submit = Event::SubmitTransaction {
            tx,
            request_id: RequestId(1),
        };

        let at = Duration::from_millis(10);
        let mut queue = BTreeMap::new();
        queue.insert(EventKey::new(at, &submit, 0, 1), "submit");
        queue.insert(EventKey::new(at, &gossip, 1, 2), "gossip node 1");
        queue.insert(EventKey::new(at, &gossip, 0, 3), "gossip node 0");
        queue.insert(EventKey::new(at, &timer, 3, 4), "timer");
        queue.insert(EventKey::new(Duration::ZERO, &submit, 2, 5), "earlier");

        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(
            order,
            vec!["earlier", "timer", "gossip node 0", "gossip node 1", "submit"]
        );
    }
}

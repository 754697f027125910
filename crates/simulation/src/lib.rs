//! Deterministic simulation of a gambit peer set.
//!
//! Every peer is a [`gambit_node::NodeStateMachine`] driven from one event
//! queue on simulated time. Latency, loss and partitions are sampled from a
//! seeded ChaCha8 stream, so a seed fully determines a run: which votes
//! arrive, which views time out and which moves commit.
//!
//! ```text
//!   submit_transaction / start_game / inject_event
//!                     │
//!                     ▼
//!   ┌─────────────────────────────────────────────┐
//!   │ event queue: (time, priority, node, seq)    │◄──────────┐
//!   └──────────────────────┬──────────────────────┘           │
//!                          ▼                                  │
//!   crashed? drop    byzantine? capture for the test          │
//!                          ▼                                  │
//!   NodeStateMachine::handle ──► Vec<Action>                  │
//!                          │                                  │
//!          Broadcast/SendTo│ SetTimer        Emit*            │
//!                          ▼                   └──► results   │
//!   SimulatedNetwork::route ── After(latency) ────────────────┘
//! ```

mod event_queue;
mod network;
mod runner;

pub use event_queue::EventKey;
pub use gambit_node::NodeIndex;
pub use network::{Delivery, NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationRunner, SimulationStats};

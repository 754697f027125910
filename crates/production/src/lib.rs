//! Production runner with async I/O.
//!
//! This crate wraps the synchronous consensus engine with tokio:
//!
//! - Peer messages via a [`Transport`] (broadcast and unicast)
//! - Timers via tokio sleep tasks
//! - Client requests via [`NodeHandle`]
//!
//! # Architecture
//!
//! A dispatcher task decodes inbound frames and routes them by session.
//! Each game session is owned by its own task, so one session's events are
//! applied strictly in order while different games run in parallel.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          Production Node                             │
//! │                                                                      │
//! │   Transport ──► ProductionRunner (dispatcher)  ◄── NodeHandle        │
//! │                  - rate limit, decode                                │
//! │                  - create sessions, route                            │
//! │                        │                                             │
//! │         ┌──────────────┼──────────────┐                              │
//! │         ▼              ▼              ▼                              │
//! │   Session task    Session task    Session task                       │
//! │   GameSession     GameSession     GameSession                        │
//! │   TimerManager    TimerManager    TimerManager                       │
//! │         │              │              │                              │
//! │         └──────────────┴──────► Transport (broadcast / unicast)      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod handle;
pub mod network;
mod runner;
mod session;
pub mod telemetry;
mod timers;

pub use config::{
    ConfigError, ConsensusConfig, IdentityConfig, NetworkConfig, NodeConfig, PeerEntry,
};
pub use handle::{NodeError, NodeHandle, TransactResponse};
pub use network::{
    InboundMessage, InboundRateLimiter, LocalHub, LocalTransport, RateLimitConfig, Transport,
    TransportError,
};
pub use runner::{ProductionRunner, ProductionRunnerBuilder, RunnerError, ShutdownHandle};
pub use session::SessionSnapshot;
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
pub use timers::{TimerFired, TimerManager};

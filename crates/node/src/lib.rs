//! Combined node state machine.
//!
//! This crate owns the session registry and routes every event to the
//! consensus instance of the game it names.

mod registry;
mod state;

pub use registry::RegistryState;
pub use state::NodeIndex;
pub use state::NodeStateMachine;

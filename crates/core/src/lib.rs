//! Core types for the gambit node.
//!
//! Every consensus component is a synchronous state machine: it consumes an
//! [`Event`], mutates its own state and returns [`Action`]s. Runners
//! (simulation or production) own all I/O: they deliver events, perform the
//! actions and feed timers back in.

mod action;
mod event;
mod message;
mod request;
mod traits;

pub use action::{Action, TimerId};
pub use event::{Event, EventPriority};
pub use message::OutboundMessage;
pub use request::RequestId;
pub use traits::StateMachine;

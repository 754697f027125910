//! The state machine seam between protocol logic and its runners.

use crate::{Action, Event};
use std::time::Duration;

/// A node's protocol logic, driven one event at a time.
///
/// Implementations never block, await or touch the network: every effect is
/// returned as an [`Action`] for the runner to perform. Replaying the same
/// events at the same times yields the same actions, which is what lets the
/// deterministic simulation and the tokio runner share one implementation.
///
/// ```ignore
/// node.set_time(now);
/// for action in node.handle(Event::ViewTimeout { session }) {
///     runner.perform(action);
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Advance the clock seen by the next `handle` call.
    ///
    /// Simulated time in the simulation, time since start in production.
    fn set_time(&mut self, now: Duration);

    /// Time last passed to [`set_time`](Self::set_time).
    fn now(&self) -> Duration;
}

//! Timer management for session tasks.
//!
//! Each timer is a tokio task that sleeps and then reports back to the
//! owning session. A report carries the generation it was armed with, so a
//! fire that was already queued when the timer got replaced or cancelled is
//! discarded instead of reaching the engine.

use gambit_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A timer expiry as reported by its sleep task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    generation: u64,
}

struct ArmedTimer {
    generation: u64,
    task: JoinHandle<()>,
}

/// Manages the timers of one session task.
pub struct TimerManager {
    armed: HashMap<TimerId, ArmedTimer>,
    next_generation: u64,
    fired_tx: mpsc::Sender<TimerFired>,
}

impl TimerManager {
    pub fn new(fired_tx: mpsc::Sender<TimerFired>) -> Self {
        Self {
            armed: HashMap::new(),
            next_generation: 0,
            fired_tx,
        }
    }

    /// Arm `id` to fire after `duration`, replacing any earlier arming.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        self.next_generation += 1;
        let fired = TimerFired {
            id,
            generation: self.next_generation,
        };
        let fired_tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Receiver gone means the session shut down
            let _ = fired_tx.send(fired).await;
        });

        self.armed.insert(
            id,
            ArmedTimer {
                generation: fired.generation,
                task,
            },
        );
        debug!(timer_id = ?id, ?duration, "Timer set");
    }

    /// No-op if the timer is not armed.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(timer) = self.armed.remove(&id) {
            timer.task.abort();
            debug!(timer_id = ?id, "Timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (id, timer) in self.armed.drain() {
            timer.task.abort();
            trace!(timer_id = ?id, "Timer cancelled (shutdown)");
        }
    }

    /// Turn a fire report into the engine event, if the arming it belongs
    /// to is still current. The timer is disarmed either way.
    pub fn take_fired(&mut self, fired: TimerFired) -> Option<Event> {
        match self.armed.get(&fired.id) {
            Some(timer) if timer.generation == fired.generation => {
                self.armed.remove(&fired.id);
                trace!(timer_id = ?fired.id, "Timer fired");
                Some(match fired.id {
                    TimerId::ViewTimeout(session) => Event::ViewTimeout { session },
                })
            }
            _ => {
                trace!(timer_id = ?fired.id, "Stale timer fire discarded");
                None
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

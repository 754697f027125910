//! View change tracking for liveness.
//!
//! Every peer that times out broadcasts a signed [`ViewChange`] naming the
//! view it moved to. Peers that did not time out themselves follow once f+1
//! distinct peers (at least one of them honest) are ahead.
//!
//! [`ViewChange`]: gambit_types::ViewChange

use gambit_types::{PeerId, View};
use std::collections::BTreeMap;
use tracing::debug;

/// Highest view each peer announced, plus our own broadcast state.
#[derive(Debug, Clone, Default)]
pub struct ViewChangeTracker {
    /// Highest `new_view` announced per sender.
    announced: BTreeMap<PeerId, View>,

    /// Highest view we broadcast a signal for.
    broadcast_view: Option<View>,
}

impl ViewChangeTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verified signal. Returns false if the sender had already
    /// announced this view or a higher one.
    pub fn record(&mut self, sender: PeerId, new_view: View) -> bool {
        match self.announced.get(&sender) {
            Some(existing) if *existing >= new_view => false,
            _ => {
                debug!(sender = ?sender, new_view = new_view.0, "View change signal recorded");
                self.announced.insert(sender, new_view);
                true
            }
        }
    }

    /// Highest view above `current` that at least `threshold` peers have
    /// announced.
    pub fn supported_view(&self, current: View, threshold: usize) -> Option<View> {
        if threshold == 0 {
            return None;
        }
        let mut views: Vec<View> = self
            .announced
            .values()
            .copied()
            .filter(|view| *view > current)
            .collect();
        if views.len() < threshold {
            return None;
        }
        views.sort_unstable_by(|a, b| b.cmp(a));
        Some(views[threshold - 1])
    }

    /// Whether we still need to broadcast a signal for `view`.
    pub fn should_broadcast(&self, view: View) -> bool {
        !matches!(self.broadcast_view, Some(sent) if sent >= view)
    }

    /// Note that we broadcast a signal for `view`.
    pub fn mark_broadcast(&mut self, view: View) {
        self.broadcast_view = Some(view);
    }

    /// Highest view announced by `peer`.
    pub fn announced_by(&self, peer: &PeerId) -> Option<View> {
        self.announced.get(peer).copied()
    }
}

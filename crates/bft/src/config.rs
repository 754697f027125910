//! BFT configuration.

use std::time::Duration;

/// Configuration for the consensus engine.
#[derive(Debug, Clone)]
pub struct BftConfig {
    /// How long a view may run without committing before peers move on.
    pub view_timeout: Duration,

    /// Override for the number of votes a QC needs.
    ///
    /// `None` uses `floor(2N/3) + 1`. An override may raise the threshold
    /// but never lower it below that safe value.
    pub quorum_threshold: Option<usize>,

    /// How many views ahead of the local view a proposal may be buffered.
    pub max_future_views: u64,

    /// Maximum number of commits replayed in answer to one sync request.
    pub max_sync_batch: usize,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self {
            view_timeout: Duration::from_secs(3),
            quorum_threshold: None,
            max_future_views: 8,
            max_sync_batch: 64,
        }
    }
}

impl BftConfig {
    /// Set the view timeout.
    pub fn with_view_timeout(mut self, timeout: Duration) -> Self {
        self.view_timeout = timeout;
        self
    }

    /// Set an explicit quorum threshold.
    pub fn with_quorum_threshold(mut self, threshold: usize) -> Self {
        self.quorum_threshold = Some(threshold);
        self
    }

    /// Set how far ahead proposals are buffered.
    pub fn with_max_future_views(mut self, views: u64) -> Self {
        self.max_future_views = views;
        self
    }

    /// Threshold to use for a peer set of `num_peers`.
    pub fn effective_quorum(&self, num_peers: usize) -> usize {
        let minimum = num_peers * 2 / 3 + 1;
        self.quorum_threshold.map_or(minimum, |q| q.max(minimum))
    }

    /// Check the tunables against the size of the peer set.
    pub fn validate(&self, num_peers: usize) -> Result<(), BftConfigError> {
        if self.view_timeout.is_zero() {
            return Err(BftConfigError::ZeroTimeout);
        }
        if num_peers == 0 {
            return Err(BftConfigError::NoPeers);
        }
        if let Some(configured) = self.quorum_threshold {
            let minimum = num_peers * 2 / 3 + 1;
            if configured < minimum {
                return Err(BftConfigError::QuorumTooLow {
                    configured,
                    minimum,
                });
            }
            if configured > num_peers {
                return Err(BftConfigError::QuorumTooHigh {
                    configured,
                    peers: num_peers,
                });
            }
        }
        Ok(())
    }
}

/// Invalid consensus tunables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BftConfigError {
    #[error("view timeout must be non-zero")]
    ZeroTimeout,

    #[error("peer set is empty")]
    NoPeers,

    #[error("quorum threshold {configured} is below the safe minimum {minimum}")]
    QuorumTooLow { configured: usize, minimum: usize },

    #[error("quorum threshold {configured} exceeds the {peers} configured peers")]
    QuorumTooHigh { configured: usize, peers: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_quorum() {
        let config = BftConfig::default();
        assert_eq!(config.effective_quorum(4), 3);
        assert_eq!(config.effective_quorum(7), 5);
        assert_eq!(config.effective_quorum(1), 1);

        let raised = BftConfig::default().with_quorum_threshold(4);
        assert_eq!(raised.effective_quorum(4), 4);
    }

    #[test]
    fn test_validate() {
        assert!(BftConfig::default().validate(4).is_ok());
        assert_eq!(
            BftConfig::default().with_quorum_threshold(2).validate(4),
            Err(BftConfigError::QuorumTooLow {
                configured: 2,
                minimum: 3
            })
        );
        assert_eq!(
            BftConfig::default().with_quorum_threshold(5).validate(4),
            Err(BftConfigError::QuorumTooHigh {
                configured: 5,
                peers: 4
            })
        );
        assert_eq!(
            BftConfig::default()
                .with_view_timeout(Duration::ZERO)
                .validate(4),
            Err(BftConfigError::ZeroTimeout)
        );
    }
}

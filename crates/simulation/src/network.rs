//! Simulated links between peers: latency with jitter, loss, partitions and
//! slow peers. All randomness comes from the runner's seeded RNG.

use crate::NodeIndex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Configuration for simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of consensus peers (N = 3f+1).
    pub num_peers: u32,
    /// Base one-way latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Probability that any single message is lost (0.0 - 1.0).
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            num_peers: 4,
            latency: Duration::from_millis(50),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// What happens to one message on one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Arrives after this delay.
    After(Duration),
    /// Blocked by a partition.
    Partitioned,
    /// Lost in transit.
    Lost,
}

/// Simulated network for deterministic message delivery.
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    /// Directed links that drop everything. `(a, b)` blocks a → b only.
    cut: HashSet<(NodeIndex, NodeIndex)>,
    /// Extra delay on every message a peer sends.
    slow: HashMap<NodeIndex, Duration>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            cut: HashSet::new(),
            slow: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn peers(&self) -> impl Iterator<Item = NodeIndex> {
        0..self.config.num_peers
    }

    // ─── Partitions ───

    pub fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.cut.contains(&(from, to))
    }

    /// Block messages from `from` to `to`, leaving the reverse direction up.
    pub fn cut_link(&mut self, from: NodeIndex, to: NodeIndex) {
        self.cut.insert((from, to));
    }

    /// Drop all messages between two groups of peers, both directions.
    pub fn partition_groups(&mut self, group_a: &[NodeIndex], group_b: &[NodeIndex]) {
        for &a in group_a {
            for &b in group_b {
                self.cut.insert((a, b));
                self.cut.insert((b, a));
            }
        }
    }

    /// Cut a peer off from everyone else.
    pub fn isolate_node(&mut self, node: NodeIndex) {
        let others: Vec<NodeIndex> = self.peers().filter(|&other| other != node).collect();
        self.partition_groups(&[node], &others);
    }

    /// Restore every link. Slow peers stay slow.
    pub fn heal_all(&mut self) {
        self.cut.clear();
    }

    pub fn partition_count(&self) -> usize {
        self.cut.len()
    }

    // ─── Link Quality ───

    /// Delay everything `node` sends by `extra` on top of the sampled latency.
    pub fn slow_node(&mut self, node: NodeIndex, extra: Duration) {
        self.slow.insert(node, extra);
    }

    pub fn set_packet_loss_rate(&mut self, rate: f64) {
        self.config.packet_loss_rate = rate.clamp(0.0, 1.0);
    }

    // ─── Delivery ───

    /// Decide the fate of a message from `from` to `to`.
    ///
    /// A partitioned link consumes no randomness, so cutting links does not
    /// shift the random stream seen by the rest of the network.
    pub fn route(&self, from: NodeIndex, to: NodeIndex, rng: &mut ChaCha8Rng) -> Delivery {
        if self.is_partitioned(from, to) {
            return Delivery::Partitioned;
        }
        if self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate {
            return Delivery::Lost;
        }
        let extra = self.slow.get(&from).copied().unwrap_or_default();
        Delivery::After(self.sample_latency(rng) + extra)
    }

    fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let spread = base * self.config.jitter_fraction;
        let jitter = if spread > 0.0 {
            rng.gen_range(-spread..spread)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn latency(delivery: Delivery) -> Duration {
        match delivery {
            Delivery::After(latency) => latency,
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn test_latency_is_deterministic_and_bounded() {
        let network = SimulatedNetwork::new(NetworkConfig::default());
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);

        let first = latency(network.route(0, 1, &mut rng1));
        assert_eq!(first, latency(network.route(0, 1, &mut rng2)));

        let base = NetworkConfig::default().latency;
        assert!(first >= base.mul_f64(0.9) && first <= base.mul_f64(1.1));
    }

    #[test]
    fn test_cut_link_is_directional() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        network.cut_link(0, 1);
        assert_eq!(network.route(0, 1, &mut rng), Delivery::Partitioned);
        assert!(matches!(network.route(1, 0, &mut rng), Delivery::After(_)));
    }

    #[test]
    fn test_group_partition_and_heal() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default());

        network.partition_groups(&[0, 1], &[2, 3]);
        assert!(network.is_partitioned(0, 2));
        assert!(network.is_partitioned(3, 1));
        assert!(!network.is_partitioned(0, 1));
        assert!(!network.is_partitioned(2, 3));
        assert_eq!(network.partition_count(), 8);

        network.heal_all();
        assert_eq!(network.partition_count(), 0);
    }

    #[test]
    fn test_isolate_node() {
        let mut network = SimulatedNetwork::new(NetworkConfig::default());

        network.isolate_node(0);

        for other in 1..4 {
            assert!(network.is_partitioned(0, other));
            assert!(network.is_partitioned(other, 0));
        }
        assert!(!network.is_partitioned(1, 2));
        assert_eq!(network.partition_count(), 6);
    }

    #[test]
    fn test_packet_loss_rate() {
        let mut network = SimulatedNetwork::new(NetworkConfig {
            packet_loss_rate: 0.5,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let iterations = 10_000;
        let lost = (0..iterations)
            .filter(|_| network.route(0, 1, &mut rng) == Delivery::Lost)
            .count();
        let rate = lost as f64 / iterations as f64;
        assert!((0.45..0.55).contains(&rate), "loss rate {rate:.2}");

        network.set_packet_loss_rate(1.5);
        assert_eq!(network.config().packet_loss_rate, 1.0);
        network.set_packet_loss_rate(-0.5);
        assert_eq!(network.config().packet_loss_rate, 0.0);
    }

    #[test]
    fn test_slow_node_adds_delay_to_outbound_only() {
        let mut network = SimulatedNetwork::new(NetworkConfig {
            jitter_fraction: 0.0,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let base = NetworkConfig::default().latency;

        network.slow_node(2, Duration::from_secs(1));
        assert_eq!(
            latency(network.route(2, 0, &mut rng)),
            base + Duration::from_secs(1)
        );
        assert_eq!(latency(network.route(0, 2, &mut rng)), base);

        // Healing partitions leaves link quality alone
        network.heal_all();
        assert_eq!(
            latency(network.route(2, 1, &mut rng)),
            base + Duration::from_secs(1)
        );
    }
}

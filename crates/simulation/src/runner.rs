//! Deterministic simulation runner.

use crate::event_queue::EventKey;
use crate::network::{Delivery, NetworkConfig, SimulatedNetwork};
use crate::NodeIndex;
use gambit_bft::BftConfig;
use gambit_core::{Action, Event, OutboundMessage, RequestId, StateMachine, TimerId};
use gambit_mempool::PoolError;
use gambit_node::NodeStateMachine;
use gambit_types::{Hash, KeyPair, PeerId, PublicKey, StaticTopology, Transaction};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Deterministic simulation runner.
///
/// Processes events in deterministic order and executes actions.
/// Given the same seed, produces identical results every run.
///
/// Two fault hooks sit on top of the network model: a crashed node drops
/// everything delivered to it, and a Byzantine node's inbound events are
/// captured for the test to inspect instead of reaching its state machine.
/// Tests speak for a Byzantine node with [`SimulationRunner::inject_event`]
/// and its key from [`SimulationRunner::peer_keypair`].
pub struct SimulationRunner {
    /// All nodes in the simulation, indexed by NodeIndex.
    nodes: Vec<NodeStateMachine>,

    /// Signing key of each node.
    keys: Vec<KeyPair>,

    /// Reverse lookup for unicast routing.
    peer_index: HashMap<PeerId, NodeIndex>,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    /// Network simulator.
    network: SimulatedNetwork,

    /// RNG for network conditions (seeded for determinism).
    rng: ChaCha8Rng,

    /// Timer registry for cancellation support.
    /// Maps (node, timer_id) -> event_key for removal.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    crashed: HashSet<NodeIndex>,

    byzantine: HashSet<NodeIndex>,

    /// Events delivered to Byzantine nodes.
    captured: BTreeMap<NodeIndex, Vec<Event>>,

    next_request_id: u64,

    /// Answers to client submissions.
    transaction_results: HashMap<RequestId, Result<Hash, PoolError>>,

    /// Statistics.
    stats: SimulationStats,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority.
    pub events_by_priority: [u64; 3],
    /// Total actions generated.
    pub actions_generated: u64,
    /// Messages sent (successfully scheduled for delivery).
    pub messages_sent: u64,
    /// Messages dropped due to network partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Events addressed to crashed nodes.
    pub events_dropped_crashed: u64,
    /// Events captured at Byzantine nodes.
    pub events_captured: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
    /// Committed moves, summed over nodes.
    pub moves_committed: u64,
}

impl SimulationStats {
    /// Total messages dropped (partition + packet loss).
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition + self.messages_dropped_loss
    }
}

impl SimulationRunner {
    /// Create a new simulation runner with the given configuration.
    pub fn new(network_config: NetworkConfig, seed: u64) -> Self {
        Self::with_bft_config(network_config, BftConfig::default(), seed)
    }

    /// Create a runner whose nodes share `bft_config`.
    pub fn with_bft_config(network_config: NetworkConfig, bft_config: BftConfig, seed: u64) -> Self {
        let network = SimulatedNetwork::new(network_config.clone());
        let rng = ChaCha8Rng::seed_from_u64(seed);

        let keys: Vec<KeyPair> = (0..network_config.num_peers)
            .map(|i| {
                let mut seed_bytes = [0u8; 32];
                let key_seed = seed.wrapping_add(i as u64).wrapping_mul(0x517cc1b727220a95);
                seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
                seed_bytes[8..16].copy_from_slice(&(i as u64).to_le_bytes());
                KeyPair::from_seed(&seed_bytes)
            })
            .collect();
        let public_keys: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();

        let mut nodes = Vec::with_capacity(keys.len());
        let mut peer_index = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let node_index = i as NodeIndex;
            peer_index.insert(key.peer_id(), node_index);
            let topology = StaticTopology::new(key.peer_id(), public_keys.clone())
                .unwrap_or_else(|err| panic!("simulation topology: {err}"))
                .into_arc();
            nodes.push(NodeStateMachine::new(
                node_index,
                topology,
                key.clone(),
                bft_config.clone(),
            ));
        }

        info!(
            num_nodes = nodes.len(),
            view_timeout = ?bft_config.view_timeout,
            seed,
            "Created simulation runner"
        );

        Self {
            nodes,
            keys,
            peer_index,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network,
            rng,
            timers: HashMap::new(),
            crashed: HashSet::new(),
            byzantine: HashSet::new(),
            captured: BTreeMap::new(),
            next_request_id: 0,
            transaction_results: HashMap::new(),
            stats: SimulationStats::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get simulation statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Get current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Get a reference to a node by index.
    pub fn node(&self, index: NodeIndex) -> Option<&NodeStateMachine> {
        self.nodes.get(index as usize)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Signing key of a node, for forging its messages in tests.
    pub fn peer_keypair(&self, index: NodeIndex) -> &KeyPair {
        &self.keys[index as usize]
    }

    pub fn peer_id(&self, index: NodeIndex) -> PeerId {
        self.keys[index as usize].peer_id()
    }

    /// Get a reference to the network.
    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    /// Get a mutable reference to the network for partition/loss configuration.
    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Answer to a submission, once the node processed it.
    pub fn transaction_result(&self, request_id: RequestId) -> Option<&Result<Hash, PoolError>> {
        self.transaction_results.get(&request_id)
    }

    /// Events delivered to a Byzantine node so far.
    pub fn captured(&self, node: NodeIndex) -> &[Event] {
        self.captured.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Fault Injection
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stop a node: everything delivered to it from now on is dropped.
    pub fn crash_node(&mut self, node: NodeIndex) {
        info!(node, time = ?self.now, "Crashing node");
        self.crashed.insert(node);
    }

    /// Hand a node to the test: its inbound events are captured, not handled.
    pub fn set_byzantine(&mut self, node: NodeIndex) {
        info!(node, "Node is Byzantine");
        self.byzantine.insert(node);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Client Input
    // ═══════════════════════════════════════════════════════════════════════════

    /// Schedule an event at a node, `delay` from now, bypassing the network.
    pub fn inject_event(&mut self, node: NodeIndex, delay: Duration, event: Event) {
        let time = self.now + delay;
        self.schedule_event(node, time, event);
    }

    /// Start the game between two players at a node.
    pub fn start_game(&mut self, node: NodeIndex, white: PublicKey, black: PublicKey) {
        self.inject_event(node, Duration::ZERO, Event::StartGame { white, black });
    }

    /// Submit a signed move at a node.
    pub fn submit_transaction(&mut self, node: NodeIndex, tx: Transaction) -> RequestId {
        self.next_request_id += 1;
        let request_id = RequestId(self.next_request_id);
        self.inject_event(
            node,
            Duration::ZERO,
            Event::SubmitTransaction { tx, request_id },
        );
        request_id
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Event Loop
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run simulation until no more events or time limit reached.
    pub fn run_until(&mut self, end_time: Duration) {
        trace!(
            end_time_secs = end_time.as_secs_f64(),
            "Running simulation step"
        );

        while let Some((&key, _)) = self.event_queue.first_key_value() {
            if key.time > end_time {
                debug!(
                    remaining_events = self.event_queue.len(),
                    "Time limit reached"
                );
                break;
            }
            let Some((key, event)) = self.event_queue.pop_first() else {
                break;
            };
            self.now = key.time;
            let node_index = key.node_index;

            if let Event::ViewTimeout { session } = &event {
                self.timers.remove(&(node_index, TimerId::ViewTimeout(*session)));
            }

            if self.crashed.contains(&node_index) {
                self.stats.events_dropped_crashed += 1;
                continue;
            }
            if self.byzantine.contains(&node_index) {
                self.stats.events_captured += 1;
                self.captured.entry(node_index).or_default().push(event);
                continue;
            }

            trace!(
                time = ?self.now,
                node = node_index,
                event = event.type_name(),
                "Processing event"
            );

            self.stats.events_processed += 1;
            self.stats.events_by_priority[event.priority() as usize] += 1;

            let node = &mut self.nodes[node_index as usize];
            node.set_time(self.now);
            let actions = node.handle(event);
            self.stats.actions_generated += actions.len() as u64;

            for action in actions {
                self.process_action(node_index, action);
            }
        }

        // Time passes even when the queue runs dry
        self.now = self.now.max(end_time);
    }

    /// Process an action from a node.
    fn process_action(&mut self, from: NodeIndex, action: Action) {
        match action {
            Action::Broadcast { message } => {
                let peers: Vec<NodeIndex> = self.network.peers().filter(|&to| to != from).collect();
                for to in peers {
                    self.try_deliver_message(from, to, message.clone());
                }
            }
            Action::SendTo { peer, message } => match self.peer_index.get(&peer) {
                Some(&to) if to == from => {
                    warn!(node = from, "Node sent a message to itself");
                }
                Some(&to) => self.try_deliver_message(from, to, message),
                None => warn!(node = from, peer = ?peer, "Unicast to unknown peer"),
            },
            Action::SetTimer { id, duration } => {
                if let Some(old) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&old);
                }
                let fire_time = self.now + duration;
                let key = self.schedule_event(from, fire_time, Self::timer_to_event(id));
                self.timers.insert((from, id), key);
                self.stats.timers_set += 1;
            }
            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }
            }
            Action::EmitTransactionResult { request_id, result } => {
                debug!(node = from, %request_id, ?result, "Transaction result");
                self.transaction_results.insert(request_id, result);
            }
            Action::EmitCommittedState {
                session,
                view,
                state,
            } => {
                debug!(
                    node = from,
                    session = ?session,
                    view = view.0,
                    moves = state.move_count(),
                    "Move committed"
                );
                self.stats.moves_committed += 1;
            }
        }
    }

    /// Schedule an event.
    fn schedule_event(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, node, self.sequence);
        self.event_queue.insert(key, event);
        key
    }

    /// Try to deliver a message, accounting for partitions and packet loss.
    fn try_deliver_message(&mut self, from: NodeIndex, to: NodeIndex, message: OutboundMessage) {
        match self.network.route(from, to, &mut self.rng) {
            Delivery::After(latency) => {
                self.schedule_event(to, self.now + latency, message.into_event());
                self.stats.messages_sent += 1;
            }
            Delivery::Partitioned => {
                self.stats.messages_dropped_partition += 1;
                trace!(from, to, message = message.type_name(), "Dropped by partition");
            }
            Delivery::Lost => {
                self.stats.messages_dropped_loss += 1;
                trace!(from, to, message = message.type_name(), "Dropped by packet loss");
            }
        }
    }

    fn timer_to_event(id: TimerId) -> Event {
        match id {
            TimerId::ViewTimeout(session) => Event::ViewTimeout { session },
        }
    }
}

impl std::fmt::Debug for SimulationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRunner")
            .field("nodes", &self.nodes.len())
            .field("now", &self.now)
            .field("queued", &self.event_queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}

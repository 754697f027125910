//! Node state machine.

use crate::RegistryState;
use gambit_bft::{BftConfig, ConsensusEngine, GameSession};
use gambit_core::{Action, Event, OutboundMessage, StateMachine};
use gambit_mempool::PoolError;
use gambit_messages::GameStartGossip;
use gambit_types::{GameState, KeyPair, PublicKey, SessionId, Topology};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Index type for simulation-only node routing.
/// Production addresses peers by PeerId.
pub type NodeIndex = u32;

/// Combined node state machine.
///
/// Owns the session registry and one consensus engine shared by every
/// session. Events are routed by the session they name; sessions are created
/// by `StartGame`, by a peer's start announcement, or implicitly by the first
/// authenticated transaction, proposal or certificate naming a new player
/// pair.
pub struct NodeStateMachine {
    /// This node's index (simulation-only, for routing).
    node_index: NodeIndex,

    engine: ConsensusEngine,

    registry: RegistryState,

    /// Current time.
    now: Duration,
}

impl std::fmt::Debug for NodeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateMachine")
            .field("node_index", &self.node_index)
            .field("engine", &self.engine)
            .field("sessions", &self.registry.len())
            .field("now", &self.now)
            .finish()
    }
}

impl NodeStateMachine {
    /// Create a new node state machine.
    ///
    /// # Arguments
    ///
    /// * `node_index` - Deterministic node index for ordering
    /// * `topology` - Network topology (single source of truth)
    /// * `signing_key` - Key for signing proposals, votes and view changes
    /// * `bft_config` - BFT configuration
    pub fn new(
        node_index: NodeIndex,
        topology: Arc<dyn Topology>,
        signing_key: KeyPair,
        bft_config: BftConfig,
    ) -> Self {
        Self {
            node_index,
            engine: ConsensusEngine::new(signing_key, topology, bft_config),
            registry: RegistryState::new(),
            now: Duration::ZERO,
        }
    }

    /// Get this node's index.
    pub fn node_index(&self) -> NodeIndex {
        self.node_index
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    pub fn registry(&self) -> &RegistryState {
        &self.registry
    }

    pub fn session(&self, id: &SessionId) -> Option<&GameSession> {
        self.registry.get(id)
    }

    /// Last committed state of a game, if it was started here.
    pub fn state(&self, white: &PublicKey, black: &PublicKey) -> Option<&GameState> {
        self.registry.state(white, black)
    }

    /// A game `player` takes part in, newest in-progress game first.
    pub fn is_in_game(&self, player: &PublicKey) -> Option<&GameState> {
        self.registry.is_in_game(player).map(GameSession::state)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Session Lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_start_game(&mut self, white: PublicKey, black: PublicKey) -> Vec<Action> {
        let id = SessionId::for_players(&white, &black);
        if self.registry.contains(&id) {
            return vec![];
        }
        let (_, mut actions) =
            self.registry
                .start(&self.engine, white.clone(), black.clone(), self.now);
        info!(node = self.node_index, session = ?id, "Game started");
        actions.push(Action::Broadcast {
            message: OutboundMessage::GameStart(GameStartGossip::new(white, black)),
        });
        actions
    }

    fn on_game_start_received(&mut self, white: PublicKey, black: PublicKey) -> Vec<Action> {
        let (_, actions) = self.registry.start(&self.engine, white, black, self.now);
        actions
    }

    /// Route an event to its session, creating the session when the event
    /// proves the game was started elsewhere.
    fn route(&mut self, event: Event) -> Vec<Action> {
        let id = event.session_id();
        let mut actions = vec![];

        if !self.registry.contains(&id) {
            let Some((white, black)) = event
                .implied_players()
                .map(|(w, b)| (w.clone(), b.clone()))
            else {
                debug!(
                    node = self.node_index,
                    session = ?id,
                    event = event.type_name(),
                    "Event for unknown session"
                );
                return vec![];
            };
            if !self.engine.may_create_session(&event) {
                debug!(
                    node = self.node_index,
                    session = ?id,
                    event = event.type_name(),
                    "Unauthenticated message for unknown session"
                );
                return vec![];
            }
            debug!(
                node = self.node_index,
                session = ?id,
                event = event.type_name(),
                "Session created from peer message"
            );
            let (_, created) = self.registry.start(&self.engine, white, black, self.now);
            actions.extend(created);
        }

        if let Some(session) = self.registry.get_mut(&id) {
            actions.extend(self.engine.handle(session, event, self.now));
        }
        actions
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::StartGame { white, black } => self.on_start_game(white, black),
            Event::GameStartReceived { white, black } => {
                self.on_game_start_received(white, black)
            }
            Event::SubmitTransaction { tx, request_id }
                if !self.registry.contains(&tx.session_id()) =>
            {
                debug!(
                    node = self.node_index,
                    request_id = %request_id,
                    "Transaction for a game not started here"
                );
                vec![Action::EmitTransactionResult {
                    request_id,
                    result: Err(PoolError::NoSuchGame),
                }]
            }
            event => self.route(event),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_core::RequestId;
    use gambit_test_helpers::{signed_move, test_peers, test_players, test_topology};
    use gambit_types::{Color, Hash, Proposal, QuorumCertificate, View, Vote, VoteKind};
    use tracing_test::traced_test;

    fn node(index: usize) -> NodeStateMachine {
        let keys = test_peers(4);
        NodeStateMachine::new(
            index as NodeIndex,
            test_topology(&keys, index),
            keys[index].clone(),
            BftConfig::default(),
        )
    }

    #[traced_test]
    #[test]
    fn test_start_game_announces_once() {
        let mut node = node(0);
        let (white, black) = test_players();

        let actions = node.handle(Event::StartGame {
            white: white.public_key(),
            black: black.public_key(),
        });
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { .. })));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Broadcast {
                message: OutboundMessage::GameStart(_)
            }
        )));

        let again = node.handle(Event::StartGame {
            white: white.public_key(),
            black: black.public_key(),
        });
        assert!(again.is_empty());

        let state = node
            .state(&white.public_key(), &black.public_key())
            .expect("started");
        assert_eq!(state.turn, Color::White);
        assert!(node.is_in_game(&black.public_key()).is_some());
        assert!(logs_contain("Game started"));
    }

    #[test]
    fn test_transaction_for_unknown_game_rejected() {
        let mut node = node(0);
        let (white, black) = test_players();
        let tx = signed_move(&white, &black, &white, None, "e2", "e4");

        let actions = node.handle(Event::SubmitTransaction {
            tx,
            request_id: RequestId(7),
        });
        assert!(matches!(
            actions.as_slice(),
            [Action::EmitTransactionResult {
                request_id: RequestId(7),
                result: Err(PoolError::NoSuchGame)
            }]
        ));
        assert!(node.registry().is_empty());
    }

    #[test]
    fn test_gossip_creates_session() {
        let mut node = node(0);
        let (white, black) = test_players();
        let tx = signed_move(&white, &black, &white, None, "e2", "e4");
        let tx_hash = tx.hash();

        node.handle(Event::TransactionGossipReceived { tx: tx.clone() });

        let session = node.session(&tx.session_id()).expect("created");
        assert!(session.pool().contains(&tx_hash));

        // Client moves are accepted once the session exists
        let actions = node.handle(Event::SubmitTransaction {
            tx,
            request_id: RequestId(1),
        });
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitTransactionResult {
                result: Err(PoolError::Duplicate),
                ..
            }
        )));
    }

    #[traced_test]
    #[test]
    fn test_vote_for_unknown_session_dropped() {
        let mut node = node(1);
        let keys = test_peers(4);
        let (white, black) = test_players();
        let session = SessionId::for_players(&white.public_key(), &black.public_key());
        let vote = Vote::new_signed(
            session,
            View(1),
            1,
            VoteKind::Prepare,
            Hash::from_bytes(b"proposal"),
            &keys[2],
        );

        assert!(node.handle(Event::VoteReceived { vote }).is_empty());
        assert!(node.registry().is_empty());
        assert!(logs_contain("Event for unknown session"));
    }

    #[test]
    fn test_peer_announcement_creates_session_silently() {
        let mut node = node(2);
        let (white, black) = test_players();

        let actions = node.handle(Event::GameStartReceived {
            white: white.public_key(),
            black: black.public_key(),
        });
        assert!(matches!(actions.as_slice(), [Action::SetTimer { .. }]));
        assert_eq!(node.registry().len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_forged_messages_do_not_create_sessions() {
        let mut node = node(0);
        let (white, black) = test_players();
        let genuine = signed_move(&white, &black, &white, None, "e2", "e4");

        for seed in 100..150u8 {
            let mut forged = genuine.clone();
            forged.black_player = KeyPair::from_seed(&[seed; 32]).public_key();
            assert!(node
                .handle(Event::TransactionGossipReceived { tx: forged })
                .is_empty());
        }

        let outsider = KeyPair::from_seed(&[150u8; 32]);
        let proposal = Proposal::new_signed(
            View(1),
            1,
            QuorumCertificate::genesis(genuine.session_id()),
            None,
            genuine.clone(),
            &outsider,
        );
        assert!(node
            .handle(Event::ProposalReceived { proposal })
            .is_empty());

        assert!(node.registry().is_empty());
        assert!(logs_contain("Unauthenticated message for unknown session"));

        node.handle(Event::TransactionGossipReceived { tx: genuine });
        assert_eq!(node.registry().len(), 1);
    }
}

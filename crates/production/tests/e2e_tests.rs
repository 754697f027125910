//! Multi-peer games over the in-process hub with real tokio timers.
//!
//! Four peers (f = 1) with a 500ms view timeout. Peer 1 leads the first view.

use gambit_bft::BftConfig;
use gambit_mempool::PoolError;
use gambit_production::{LocalHub, NodeHandle, ProductionRunner, ShutdownHandle, Transport};
use gambit_test_helpers::{
    signed_move, square, test_keypair, test_peers, test_players, test_topology,
};
use gambit_types::{Color, GameState, KeyPair, PieceKind, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const VIEW_TIMEOUT: Duration = Duration::from_millis(500);
const PATIENCE: Duration = Duration::from_secs(10);

struct Cluster {
    hub: Arc<LocalHub>,
    keys: Vec<KeyPair>,
    nodes: Vec<NodeHandle>,
    shutdowns: Vec<ShutdownHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Cluster {
    fn spawn(n: usize) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("gambit_bft=info,gambit_production=debug")
            .with_test_writer()
            .try_init();

        let keys = test_peers(n);
        let hub = LocalHub::new();
        let mut cluster = Cluster {
            hub: Arc::clone(&hub),
            keys: keys.clone(),
            nodes: vec![],
            shutdowns: vec![],
            tasks: vec![],
        };

        for (index, key) in keys.iter().enumerate() {
            let (transport, inbound) = hub.connect(key.peer_id(), 1024);
            let mut runner = ProductionRunner::builder()
                .topology(test_topology(&keys, index))
                .signing_key(key.clone())
                .bft_config(BftConfig::default().with_view_timeout(VIEW_TIMEOUT))
                .transport(Arc::new(transport), inbound)
                .channel_capacity(1024)
                .build()
                .expect("valid node");
            cluster.nodes.push(runner.handle());
            cluster
                .shutdowns
                .push(runner.shutdown_handle().expect("first take"));
            cluster.tasks.push(tokio::spawn(runner.run()));
        }
        cluster
    }

    async fn stop(self) {
        drop(self.shutdowns);
        for task in self.tasks {
            task.await.expect("runner panicked");
        }
    }
}

struct Game {
    white: KeyPair,
    black: KeyPair,
}

impl Game {
    fn new() -> Self {
        let (white, black) = test_players();
        Self { white, black }
    }

    /// Start at `node` and wait until every peer has the session.
    async fn start(&self, cluster: &Cluster, node: usize) -> GameState {
        let state = cluster.nodes[node]
            .start(&self.white.public_key(), &self.black.public_key())
            .await
            .unwrap();
        for index in 0..cluster.nodes.len() {
            self.wait_for(cluster, index, |s| s.move_count() == 0).await;
        }
        state
    }

    async fn state(&self, cluster: &Cluster, node: usize) -> Option<GameState> {
        cluster.nodes[node]
            .state(&self.white.public_key(), &self.black.public_key())
            .await
            .unwrap()
    }

    async fn wait_for(
        &self,
        cluster: &Cluster,
        node: usize,
        done: impl Fn(&GameState) -> bool,
    ) -> GameState {
        let deadline = tokio::time::Instant::now() + PATIENCE;
        loop {
            if let Some(state) = self.state(cluster, node).await {
                if done(&state) {
                    return state;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "node {node} did not reach the expected state"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn wait_all(&self, cluster: &Cluster, moves: u64) -> Vec<GameState> {
        let mut states = vec![];
        for index in 0..cluster.nodes.len() {
            states.push(self.wait_for(cluster, index, |s| s.move_count() >= moves).await);
        }
        states
    }

    fn next_move(&self, state: &GameState, from: &str, to: &str) -> Transaction {
        let signer = match state.turn {
            Color::White => &self.white,
            Color::Black => &self.black,
        };
        signed_move(
            &self.white,
            &self.black,
            signer,
            Some(state.hash()),
            from,
            to,
        )
    }
}

#[tokio::test]
async fn test_move_commits_on_every_peer() {
    let cluster = Cluster::spawn(4);
    let game = Game::new();
    let opening = game.start(&cluster, 0).await;
    assert_eq!(opening.turn, Color::White);

    // Submitted to a non-leader; gossip carries it to peer 1
    let tx = game.next_move(&opening, "e2", "e4");
    let response = cluster.nodes[2].transact(tx.clone()).await.unwrap();
    assert!(response.ok);
    assert_eq!(response.tx_hash, Some(tx.hash()));

    let states = game.wait_all(&cluster, 1).await;
    for state in &states {
        assert_eq!(state, &states[0]);
    }
    let state = &states[0];
    assert_eq!(state.turn, Color::Black);
    assert!(state.board.get(square("e2")).is_none());
    let pawn = state.board.get(square("e4")).expect("pawn moved");
    assert_eq!((pawn.color, pawn.kind), (Color::White, PieceKind::Pawn));

    cluster.stop().await;
}

#[tokio::test]
async fn test_game_progresses_through_several_moves() {
    let cluster = Cluster::spawn(4);
    let game = Game::new();
    game.start(&cluster, 3).await;

    let script = [("e2", "e4"), ("e7", "e5"), ("g1", "f3"), ("b8", "c6")];
    for (ply, (from, to)) in script.iter().enumerate() {
        let entry = ply % cluster.nodes.len();
        let state = game
            .wait_for(&cluster, entry, |s| s.move_count() == ply as u64)
            .await;
        let response = cluster.nodes[entry]
            .transact(game.next_move(&state, from, to))
            .await
            .unwrap();
        assert!(response.ok, "move {from}{to}: {:?}", response.rejection);
        game.wait_all(&cluster, ply as u64 + 1).await;
    }

    let state = game.state(&cluster, 0).await.unwrap();
    assert_eq!(state.history.len(), 4);
    assert_eq!(state.turn, Color::White);

    // Commits happen in increasing views, one height per commit
    let snapshot = cluster.nodes[0]
        .watch(&game.white.public_key(), &game.black.public_key())
        .await
        .unwrap()
        .expect("session exists");
    let stats = snapshot.borrow().stats;
    assert_eq!(stats.committed_height, 4);
    assert!(stats.view >= 4);

    cluster.stop().await;
}

#[tokio::test]
async fn test_transact_rejections() {
    let cluster = Cluster::spawn(4);
    let game = Game::new();

    // Never started here
    let opening = GameState::new(game.white.public_key(), game.black.public_key());
    let early = game.next_move(&opening, "e2", "e4");
    let response = cluster.nodes[0].transact(early).await.unwrap();
    assert_eq!(response.rejection, Some(PoolError::NoSuchGame));

    let opening = game.start(&cluster, 0).await;

    let wrong_player = signed_move(
        &game.white,
        &game.black,
        &game.black,
        Some(opening.hash()),
        "e2",
        "e4",
    );
    let response = cluster.nodes[0].transact(wrong_player).await.unwrap();
    assert_eq!(response.rejection, Some(PoolError::WrongPlayer));

    let illegal = game.next_move(&opening, "e2", "e5");
    let response = cluster.nodes[0].transact(illegal).await.unwrap();
    assert!(matches!(response.rejection, Some(PoolError::IllegalMove(_))));

    // Nothing was accepted, so nothing commits
    tokio::time::sleep(VIEW_TIMEOUT * 2).await;
    assert_eq!(game.state(&cluster, 1).await.unwrap().move_count(), 0);

    let tx = game.next_move(&opening, "e2", "e4");
    assert!(cluster.nodes[0].transact(tx.clone()).await.unwrap().ok);
    game.wait_all(&cluster, 1).await;

    // Built on a state that is no longer current
    let response = cluster.nodes[3].transact(tx).await.unwrap();
    assert_eq!(response.rejection, Some(PoolError::StaleProposal));

    cluster.stop().await;
}

#[tokio::test]
async fn test_start_is_idempotent_and_discoverable() {
    let cluster = Cluster::spawn(4);
    let game = Game::new();
    let first = game.start(&cluster, 0).await;

    let tx = game.next_move(&first, "d2", "d4");
    assert!(cluster.nodes[1].transact(tx).await.unwrap().ok);
    game.wait_all(&cluster, 1).await;

    // A second start, from any peer, returns the current state
    let again = cluster.nodes[2]
        .start(&game.white.public_key(), &game.black.public_key())
        .await
        .unwrap();
    assert_eq!(again.move_count(), 1);

    let found = cluster.nodes[3]
        .is_in_game(&game.black.public_key())
        .await
        .unwrap()
        .expect("black is playing");
    assert_eq!(found.session_id(), first.session_id());

    let stranger = test_keypair(99).public_key();
    assert!(cluster.nodes[3]
        .is_in_game(&stranger)
        .await
        .unwrap()
        .is_none());

    cluster.stop().await;
}

#[tokio::test]
async fn test_isolated_peer_catches_up() {
    let cluster = Cluster::spawn(4);
    let game = Game::new();
    let opening = game.start(&cluster, 0).await;

    let lagging = cluster.keys[3].peer_id();
    cluster.hub.isolate(lagging);

    // Three peers are a quorum on their own
    let tx = game.next_move(&opening, "e2", "e4");
    assert!(cluster.nodes[0].transact(tx).await.unwrap().ok);
    for index in 0..3 {
        game.wait_for(&cluster, index, |s| s.move_count() == 1).await;
    }
    assert_eq!(game.state(&cluster, 3).await.unwrap().move_count(), 0);

    cluster.hub.heal();
    let state = game.state(&cluster, 1).await.unwrap();
    let tx = game.next_move(&state, "e7", "e5");
    assert!(cluster.nodes[1].transact(tx).await.unwrap().ok);

    let states = game.wait_all(&cluster, 2).await;
    assert_eq!(states[3], states[0]);

    cluster.stop().await;
}

#[tokio::test]
async fn test_garbage_from_stranger_is_ignored() {
    let cluster = Cluster::spawn(4);
    let game = Game::new();
    let opening = game.start(&cluster, 0).await;

    let (stranger, _inbox) = cluster.hub.connect(test_keypair(77).peer_id(), 16);
    for _ in 0..100 {
        stranger
            .broadcast("consensus.vote", bytes::Bytes::from_static(b"not a vote"))
            .unwrap();
    }

    let tx = game.next_move(&opening, "g1", "f3");
    assert!(cluster.nodes[2].transact(tx).await.unwrap().ok);
    let states = game.wait_all(&cluster, 1).await;
    assert_eq!(states[0].history.len(), 1);

    cluster.stop().await;
}

//! Production runner implementation.

use crate::handle::{NodeCommand, NodeHandle};
use crate::network::{
    decode_message, encode_message, InboundMessage, InboundRateLimiter, RateLimitConfig,
    Transport,
};
use crate::session::{SessionHandle, SessionInput};
use gambit_bft::{BftConfig, BftConfigError, ConsensusEngine};
use gambit_core::{Event, OutboundMessage};
use gambit_mempool::PoolError;
use gambit_messages::GameStartGossip;
use gambit_types::{
    current_game_for, GameState, KeyPair, PeerId, PublicKey, SessionId, Topology,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Client commands queued before the dispatcher applies backpressure.
const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Errors from building the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Missing required builder field: {0}")]
    MissingField(&'static str),

    #[error("Invalid consensus settings: {0}")]
    Config(#[from] BftConfigError),

    #[error("Signing key {key:?} is not the topology's local peer {local:?}")]
    KeyMismatch { key: PeerId, local: PeerId },

    #[error("Transport speaks for {transport:?}, expected {local:?}")]
    TransportMismatch { transport: PeerId, local: PeerId },
}

/// Handle for shutting down a running ProductionRunner.
///
/// When dropped, signals the runner to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Builder for constructing a [`ProductionRunner`].
///
/// Required fields:
/// - `topology` - Ordered peer set, as seen from this node
/// - `signing_key` - secp256k1 key for proposals, votes and view changes
/// - `transport` - Outbound network plus the node's inbound queue
///
/// Optional fields:
/// - `bft_config` - Consensus parameters (defaults to `BftConfig::default()`)
/// - `channel_capacity` - Per-session inbox capacity (defaults to 10,000)
/// - `rate_limit` - Inbound per-peer limits (defaults to `RateLimitConfig::default()`)
///
/// # Example
///
/// ```no_run
/// use gambit_production::{LocalHub, ProductionRunner};
/// use gambit_types::{KeyPair, StaticTopology};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
/// let hub = LocalHub::new();
/// let (transport, inbound) = hub.connect(keys[0].peer_id(), 10_000);
/// let topology = StaticTopology::new(
///     keys[0].peer_id(),
///     keys.iter().map(|k| k.public_key()).collect(),
/// )?;
///
/// let mut runner = ProductionRunner::builder()
///     .topology(topology.into_arc())
///     .signing_key(keys[0].clone())
///     .transport(Arc::new(transport), inbound)
///     .build()?;
/// let node = runner.handle();
/// let shutdown = runner.shutdown_handle();
/// tokio::spawn(runner.run());
/// # Ok(())
/// # }
/// ```
pub struct ProductionRunnerBuilder {
    topology: Option<Arc<dyn Topology>>,
    signing_key: Option<KeyPair>,
    bft_config: BftConfig,
    transport: Option<(Arc<dyn Transport>, mpsc::Receiver<InboundMessage>)>,
    channel_capacity: usize,
    rate_limit: RateLimitConfig,
}

impl Default for ProductionRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionRunnerBuilder {
    pub fn new() -> Self {
        Self {
            topology: None,
            signing_key: None,
            bft_config: BftConfig::default(),
            transport: None,
            channel_capacity: 10_000,
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn signing_key(mut self, key: KeyPair) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn bft_config(mut self, config: BftConfig) -> Self {
        self.bft_config = config;
        self
    }

    /// Set the transport and the queue its inbound frames arrive on.
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
        inbound: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        self.transport = Some((transport, inbound));
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Build the runner. Checks that the key, topology and transport agree
    /// on the local identity and that the consensus settings are safe.
    pub fn build(self) -> Result<ProductionRunner, RunnerError> {
        let topology = self.topology.ok_or(RunnerError::MissingField("topology"))?;
        let signing_key = self
            .signing_key
            .ok_or(RunnerError::MissingField("signing_key"))?;
        let (transport, inbound_rx) = self
            .transport
            .ok_or(RunnerError::MissingField("transport"))?;

        let local = topology.local_peer_id();
        if signing_key.peer_id() != local {
            return Err(RunnerError::KeyMismatch {
                key: signing_key.peer_id(),
                local,
            });
        }
        if transport.local_peer_id() != local {
            return Err(RunnerError::TransportMismatch {
                transport: transport.local_peer_id(),
                local,
            });
        }
        self.bft_config.validate(topology.num_peers())?;

        let engine = Arc::new(ConsensusEngine::new(
            signing_key,
            Arc::clone(&topology),
            self.bft_config,
        ));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Ok(ProductionRunner {
            engine,
            topology,
            transport,
            inbound_rx,
            command_tx,
            command_rx,
            rate_limiter: InboundRateLimiter::new(self.rate_limit),
            sessions: HashMap::new(),
            started: Vec::new(),
            start_time: Instant::now(),
            channel_capacity: self.channel_capacity,
            shutdown_rx,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Production node: a dispatcher task plus one task per game session.
///
/// The dispatcher rate-limits and decodes inbound frames, creates sessions
/// and forwards each event to its session's inbox. It never touches
/// consensus state itself.
pub struct ProductionRunner {
    engine: Arc<ConsensusEngine>,
    topology: Arc<dyn Topology>,
    transport: Arc<dyn Transport>,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    command_tx: mpsc::Sender<NodeCommand>,
    command_rx: mpsc::Receiver<NodeCommand>,
    rate_limiter: InboundRateLimiter,
    sessions: HashMap<SessionId, SessionHandle>,
    /// Session ids in creation order.
    started: Vec<SessionId>,
    start_time: Instant,
    channel_capacity: usize,
    shutdown_rx: oneshot::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProductionRunner {
    pub fn builder() -> ProductionRunnerBuilder {
        ProductionRunnerBuilder::new()
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.topology.local_peer_id()
    }

    /// Client handle. Can be cloned freely; requests fail once the runner stops.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle::new(self.command_tx.clone())
    }

    /// Take the shutdown handle.
    ///
    /// Returns a handle that when dropped triggers graceful shutdown.
    /// Can only be called once; subsequent calls return None.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx
            .take()
            .map(|tx| ShutdownHandle { tx: Some(tx) })
    }

    /// Run the dispatcher until shutdown or until the inbound queue closes.
    ///
    /// On exit every session task drains its inbox and stops.
    pub async fn run(mut self) {
        info!(
            local = ?self.local_peer_id(),
            peers = self.topology.num_peers(),
            quorum = self.engine.config().effective_quorum(self.topology.num_peers()),
            "Starting production runner"
        );

        loop {
            // Shutdown first, then peer traffic, then client commands
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                message = self.inbound_rx.recv() => match message {
                    Some(message) => self.on_inbound(message),
                    None => {
                        info!("Inbound queue closed");
                        break;
                    }
                },

                Some(command) = self.command_rx.recv() => self.on_command(command),
            }
        }

        let sessions = self.sessions.len();
        for (_, session) in self.sessions.drain() {
            session.stop().await;
        }
        info!(sessions, "Production runner stopped");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peer traffic
    // ═══════════════════════════════════════════════════════════════════════

    fn on_inbound(&mut self, message: InboundMessage) {
        let is_peer = self.topology.is_peer(&message.from);
        if !self.rate_limiter.check(&message.from, is_peer) {
            debug!(from = ?message.from, topic = %message.topic, "Rate limited, message dropped");
            return;
        }

        match decode_message(&message.topic, &message.payload) {
            Ok(event) => self.route(event),
            Err(err) => warn!(
                from = ?message.from,
                topic = %message.topic,
                error = %err,
                "Failed to decode message"
            ),
        }
    }

    /// Forward an event to its session, creating the session when the event
    /// proves the game was started elsewhere.
    fn route(&mut self, event: Event) {
        let id = event.session_id();

        if !self.sessions.contains_key(&id) {
            let Some((white, black)) = event
                .implied_players()
                .map(|(w, b)| (w.clone(), b.clone()))
            else {
                debug!(session = ?id, event = event.type_name(), "Event for unknown session");
                return;
            };
            if !self.engine.may_create_session(&event) {
                debug!(
                    session = ?id,
                    event = event.type_name(),
                    "Unauthenticated message for unknown session"
                );
                return;
            }
            debug!(session = ?id, event = event.type_name(), "Session created from peer message");
            self.create_session(white, black);
        }

        // Creation was the whole point of a start announcement
        if matches!(event, Event::GameStartReceived { .. }) {
            return;
        }
        if let Some(session) = self.sessions.get(&id) {
            session.deliver(SessionInput::Event(event));
        }
    }

    fn create_session(&mut self, white: PublicKey, black: PublicKey) -> &SessionHandle {
        let session = SessionHandle::spawn(
            Arc::clone(&self.engine),
            Arc::clone(&self.transport),
            white,
            black,
            self.start_time,
            self.channel_capacity,
        );
        let id = session.id();
        self.started.push(id);
        self.sessions.entry(id).or_insert(session)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Client commands
    // ═══════════════════════════════════════════════════════════════════════

    fn on_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::State {
                white,
                black,
                reply,
            } => {
                let id = SessionId::for_players(&white, &black);
                let state = self.sessions.get(&id).map(|s| s.snapshot().state);
                let _ = reply.send(state);
            }
            NodeCommand::Start {
                white,
                black,
                reply,
            } => {
                let _ = reply.send(self.start_game(white, black));
            }
            NodeCommand::Transact { tx, reply } => match self.sessions.get(&tx.session_id()) {
                Some(session) => session.deliver(SessionInput::Submit { tx, reply }),
                None => {
                    debug!(session = ?tx.session_id(), "Transaction for a game not started here");
                    let _ = reply.send(Err(PoolError::NoSuchGame));
                }
            },
            NodeCommand::IsInGame { player, reply } => {
                let _ = reply.send(self.is_in_game(&player));
            }
            NodeCommand::Watch {
                white,
                black,
                reply,
            } => {
                let id = SessionId::for_players(&white, &black);
                let _ = reply.send(self.sessions.get(&id).map(SessionHandle::subscribe));
            }
        }
    }

    /// Create the session and announce it, or return the existing state.
    fn start_game(&mut self, white: PublicKey, black: PublicKey) -> GameState {
        let id = SessionId::for_players(&white, &black);
        if let Some(session) = self.sessions.get(&id) {
            return session.snapshot().state;
        }

        let state = self
            .create_session(white.clone(), black.clone())
            .snapshot()
            .state;
        info!(session = ?id, "Game started");

        let announcement = OutboundMessage::GameStart(GameStartGossip::new(white, black));
        match encode_message(&announcement) {
            Ok(payload) => {
                if let Err(err) = self.transport.broadcast(announcement.topic(), payload) {
                    warn!(session = ?id, error = %err, "Failed to announce game");
                }
            }
            Err(err) => warn!(session = ?id, error = %err, "Failed to encode game start"),
        }
        state
    }

    /// Newest game involving `player`, preferring one still in progress.
    fn is_in_game(&self, player: &PublicKey) -> Option<GameState> {
        let newest_first = self
            .started
            .iter()
            .rev()
            .filter_map(|id| self.sessions.get(id))
            .map(|session| session.snapshot().state);
        current_game_for(newest_first, player, |state| state)
    }
}

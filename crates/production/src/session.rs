//! Single-owner task for one game session.
//!
//! Every input for a session is applied by its task, one at a time. This
//! includes network messages, client submissions and the session's own timers.
//! Sessions share nothing but the engine (immutable) and the transport, so
//! separate games progress in parallel.

use crate::network::{encode_message, Transport};
use crate::timers::{TimerFired, TimerManager};
use gambit_bft::{ConsensusEngine, GameSession, SessionStats};
use gambit_core::{Action, Event, OutboundMessage, RequestId};
use gambit_mempool::PoolError;
use gambit_types::{GameState, Hash, PeerId, PublicKey, SessionId, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Timer events in flight per session. Only the view timer exists.
const TIMER_CHANNEL_CAPACITY: usize = 4;

pub(crate) type TransactReply = oneshot::Sender<Result<Hash, PoolError>>;

/// Input for a session task.
pub(crate) enum SessionInput {
    /// A decoded peer message.
    Event(Event),
    /// A client move, answered on `reply` once the pool has judged it.
    Submit { tx: Transaction, reply: TransactReply },
}

/// What a session last published: committed state plus counters.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: GameState,
    pub stats: SessionStats,
}

/// The dispatcher's side of a running session task.
pub(crate) struct SessionHandle {
    id: SessionId,
    inbox: mpsc::Sender<SessionInput>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Create the session at the standard opening and start its task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        engine: Arc<ConsensusEngine>,
        transport: Arc<dyn Transport>,
        white: PublicKey,
        black: PublicKey,
        start: Instant,
        capacity: usize,
    ) -> Self {
        let (session, actions) = engine.new_session(white, black, start.elapsed());
        let id = session.id();

        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            state: session.state().clone(),
            stats: session.stats(),
        });
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_CAPACITY);

        let mut task = SessionTask {
            engine,
            transport,
            session,
            timers: TimerManager::new(timer_tx),
            snapshot: snapshot_tx,
            pending: HashMap::new(),
            next_request_id: 0,
            start,
        };
        task.process_actions(actions);

        Self {
            id,
            inbox: inbox_tx,
            snapshot: snapshot_rx,
            task: tokio::spawn(task.run(inbox_rx, timer_rx)),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Queue input without waiting. A full or closed inbox drops it; peers
    /// recover lost messages through view changes and sync, and a dropped
    /// submission closes the client's reply channel.
    pub(crate) fn deliver(&self, input: SessionInput) {
        match self.inbox.try_send(input) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(session = ?self.id, "Session inbox full, input dropped");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(session = ?self.id, "Session task stopped, input dropped");
            }
        }
    }

    /// Close the inbox and wait for the task to drain it.
    pub(crate) async fn stop(self) {
        drop(self.inbox);
        if let Err(err) = self.task.await {
            warn!(session = ?self.id, error = %err, "Session task panicked");
        }
    }
}

struct SessionTask {
    engine: Arc<ConsensusEngine>,
    transport: Arc<dyn Transport>,
    session: GameSession,
    timers: TimerManager,
    snapshot: watch::Sender<SessionSnapshot>,
    /// Clients waiting for the pool's verdict on their move.
    pending: HashMap<RequestId, TransactReply>,
    next_request_id: u64,
    /// Node start; engine time is the elapsed duration.
    start: Instant,
}

impl SessionTask {
    #[instrument(name = "session", skip_all, fields(session = ?self.session.id()))]
    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<SessionInput>,
        mut timer_rx: mpsc::Receiver<TimerFired>,
    ) {
        debug!("Session task started");
        loop {
            tokio::select! {
                biased;

                // Timers first: a flooded inbox must not stall view changes
                Some(fired) = timer_rx.recv() => {
                    if let Some(event) = self.timers.take_fired(fired) {
                        self.apply(event);
                    }
                }

                input = inbox.recv() => match input {
                    Some(SessionInput::Event(event)) => self.apply(event),
                    Some(SessionInput::Submit { tx, reply }) => {
                        let request_id = RequestId::new(self.next_request_id);
                        self.next_request_id += 1;
                        self.pending.insert(request_id, reply);
                        self.apply(Event::SubmitTransaction { tx, request_id });
                    }
                    None => break,
                },
            }
        }
        self.timers.cancel_all();
        debug!(
            committed_height = self.session.committed_height(),
            "Session task stopped"
        );
    }

    fn apply(&mut self, event: Event) {
        let now = self.start.elapsed();
        let actions = self.engine.handle(&mut self.session, event, now);
        self.process_actions(actions);

        let stats = self.session.stats();
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.stats == stats {
                return false;
            }
            snapshot.stats = stats;
            true
        });
    }

    fn process_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            self.process_action(action);
        }
    }

    fn process_action(&mut self, action: Action) {
        match action {
            Action::Broadcast { message } => self.send(None, message),
            Action::SendTo { peer, message } => self.send(Some(peer), message),
            Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
            Action::CancelTimer { id } => self.timers.cancel_timer(id),
            Action::EmitTransactionResult { request_id, result } => {
                match self.pending.remove(&request_id) {
                    // Client may have given up waiting
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => debug!(%request_id, "No client waiting for transaction result"),
                }
            }
            Action::EmitCommittedState { view, state, .. } => {
                info!(
                    ?view,
                    moves = state.move_count(),
                    status = ?state.status,
                    "Committed state published"
                );
                self.snapshot.send_replace(SessionSnapshot {
                    state: *state,
                    stats: self.session.stats(),
                });
            }
        }
    }

    fn send(&self, peer: Option<PeerId>, message: OutboundMessage) {
        let payload = match encode_message(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(msg_type = message.type_name(), error = %err, "Failed to encode message");
                return;
            }
        };
        let topic = message.topic();
        let result = match peer {
            Some(peer) => self.transport.unicast(peer, topic, payload),
            None => self.transport.broadcast(topic, payload),
        };
        if let Err(err) = result {
            debug!(msg_type = message.type_name(), error = %err, "Send failed");
        }
    }
}

//! Client facade over a running node.
//!
//! [`NodeHandle`] is cheap to clone and talks to the runner's dispatcher
//! over a channel. It offers the four client operations (state, start,
//! transact, is-in-game) plus snapshot access for diagnostics.

use crate::session::{SessionSnapshot, TransactReply};
use gambit_mempool::PoolError;
use gambit_types::{GameState, Hash, PublicKey, Transaction};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Errors talking to a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node stopped")]
    Stopped,

    /// The node shed the request before answering (overloaded session).
    #[error("Request dropped")]
    RequestDropped,
}

/// Answer to a `transact` call.
///
/// `ok` only means the move entered the consensus pipeline; clients poll
/// [`NodeHandle::state`] to see it commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactResponse {
    pub ok: bool,
    pub tx_hash: Option<Hash>,
    pub rejection: Option<PoolError>,
}

impl From<Result<Hash, PoolError>> for TransactResponse {
    fn from(result: Result<Hash, PoolError>) -> Self {
        match result {
            Ok(tx_hash) => Self {
                ok: true,
                tx_hash: Some(tx_hash),
                rejection: None,
            },
            Err(err) => Self {
                ok: false,
                tx_hash: None,
                rejection: Some(err),
            },
        }
    }
}

/// Requests served by the dispatcher.
pub(crate) enum NodeCommand {
    State {
        white: PublicKey,
        black: PublicKey,
        reply: oneshot::Sender<Option<GameState>>,
    },
    Start {
        white: PublicKey,
        black: PublicKey,
        reply: oneshot::Sender<GameState>,
    },
    Transact {
        tx: Transaction,
        reply: TransactReply,
    },
    IsInGame {
        player: PublicKey,
        reply: oneshot::Sender<Option<GameState>>,
    },
    Watch {
        white: PublicKey,
        black: PublicKey,
        reply: oneshot::Sender<Option<watch::Receiver<SessionSnapshot>>>,
    },
}

/// Handle for issuing client requests to a node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    pub(crate) fn new(commands: mpsc::Sender<NodeCommand>) -> Self {
        Self { commands }
    }

    /// Last committed state of the game, if it was started on this node.
    pub async fn state(
        &self,
        white: &PublicKey,
        black: &PublicKey,
    ) -> Result<Option<GameState>, NodeError> {
        self.request(|reply| NodeCommand::State {
            white: white.clone(),
            black: black.clone(),
            reply,
        })
        .await
    }

    /// Start a game, or return the current state if it already exists.
    pub async fn start(
        &self,
        white: &PublicKey,
        black: &PublicKey,
    ) -> Result<GameState, NodeError> {
        self.request(|reply| NodeCommand::Start {
            white: white.clone(),
            black: black.clone(),
            reply,
        })
        .await
    }

    /// Submit a signed move.
    pub async fn transact(&self, tx: Transaction) -> Result<TransactResponse, NodeError> {
        let result = self
            .request(|reply| NodeCommand::Transact { tx, reply })
            .await?;
        Ok(result.into())
    }

    /// A game `player` takes part in, newest in-progress game first.
    pub async fn is_in_game(&self, player: &PublicKey) -> Result<Option<GameState>, NodeError> {
        self.request(|reply| NodeCommand::IsInGame {
            player: player.clone(),
            reply,
        })
        .await
    }

    /// Subscribe to a session's published snapshots.
    pub async fn watch(
        &self,
        white: &PublicKey,
        black: &PublicKey,
    ) -> Result<Option<watch::Receiver<SessionSnapshot>>, NodeError> {
        self.request(|reply| NodeCommand::Watch {
            white: white.clone(),
            black: black.clone(),
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> Result<T, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::RequestDropped)
    }
}

//! Session registry.

use gambit_bft::{ConsensusEngine, GameSession};
use gambit_core::Action;
use gambit_types::{current_game_for, GameState, PublicKey, SessionId};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Every game this node takes part in, keyed by player pair.
///
/// Created empty at startup and owned by whoever drives the node; sessions
/// are never removed.
#[derive(Debug, Default)]
pub struct RegistryState {
    sessions: BTreeMap<SessionId, GameSession>,

    /// Session ids in creation order.
    started: Vec<SessionId>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the game between `white` and `black`, or return the existing one.
    ///
    /// Only a newly created session comes with actions (its view timer).
    pub fn start(
        &mut self,
        engine: &ConsensusEngine,
        white: PublicKey,
        black: PublicKey,
        now: Duration,
    ) -> (&mut GameSession, Vec<Action>) {
        let id = SessionId::for_players(&white, &black);
        match self.sessions.entry(id) {
            Entry::Occupied(entry) => {
                debug!(session = ?id, "Session already started");
                (entry.into_mut(), vec![])
            }
            Entry::Vacant(entry) => {
                let (session, actions) = engine.new_session(white, black, now);
                self.started.push(id);
                (entry.insert(session), actions)
            }
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&GameSession> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut GameSession> {
        self.sessions.get_mut(id)
    }

    /// Last committed state of the game between `white` and `black`.
    pub fn state(&self, white: &PublicKey, black: &PublicKey) -> Option<&GameState> {
        self.get(&SessionId::for_players(white, black))
            .map(GameSession::state)
    }

    /// A game `player` takes part in, as either color.
    ///
    /// Scans sessions newest first and prefers one still in progress.
    pub fn is_in_game(&self, player: &PublicKey) -> Option<&GameSession> {
        let newest_first = self.started.iter().rev().filter_map(|id| self.sessions.get(id));
        current_game_for(newest_first, player, |session| session.state())
    }

    /// Sessions in creation order.
    pub fn sessions(&self) -> impl Iterator<Item = &GameSession> + '_ {
        self.started.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

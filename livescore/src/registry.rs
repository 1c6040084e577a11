//! Keyed store of the most recently observed players
//!
//! The registry holds one immutable roster at a time. A scoreboard snapshot
//! builds a complete new roster and swaps it in with a single pointer store,
//! so a reader either sees the old roster or the new one, never a mix.
//! Readers that need several players to agree with each other (killer and
//! victim of the same kill) take a [`Roster`] once and resolve against it.

use log::debug;
use shared::Player;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One generation of the player set, as listed by a single snapshot.
#[derive(Debug, Default)]
pub struct Roster {
    generation: u64,
    players: HashMap<String, Arc<Player>>,
}

impl Roster {
    /// Looks up a nickname, falling back to a zero-valued player.
    pub fn resolve(&self, nick: &str) -> Arc<Player> {
        match self.players.get(nick) {
            Some(player) => Arc::clone(player),
            None => Arc::new(Player::unknown(nick)),
        }
    }

    pub fn get(&self, nick: &str) -> Option<&Arc<Player>> {
        self.players.get(nick)
    }

    /// Number of snapshots applied so far; 0 before the first one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Shared, atomically replaced player roster for one session.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    current: RwLock<Arc<Roster>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest known state of `nick`, or a zero-valued player if no
    /// snapshot has listed it yet.
    pub fn resolve(&self, nick: &str) -> Arc<Player> {
        self.roster().resolve(nick)
    }

    /// Current roster generation, stable for as long as the caller holds it.
    pub fn roster(&self) -> Arc<Roster> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replaces the whole player set with `players`, keyed by nickname.
    pub fn replace_all<I>(&self, players: I)
    where
        I: IntoIterator<Item = Arc<Player>>,
    {
        let players: HashMap<String, Arc<Player>> = players
            .into_iter()
            .map(|player| (player.nick.clone(), player))
            .collect();

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation + 1;
        debug!(
            "Roster generation {} with {} players",
            generation,
            players.len()
        );
        *guard = Arc::new(Roster {
            generation,
            players,
        });
    }

    /// Forgets every player, e.g. when a new session starts.
    pub fn clear(&self) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(Roster::default());
    }

    pub fn len(&self) -> usize {
        self.roster().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster().is_empty()
    }
}

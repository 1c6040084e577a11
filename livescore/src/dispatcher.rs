//! Published events and the handler registry
//!
//! Application code registers callbacks per [`EventKind`]. Kinds nobody
//! registered for are simply dropped, so publishing is always safe. Handlers
//! run in registration order; one that returns an error or panics is logged
//! and counted, and the remaining handlers still run.

use crate::decoder::{
    Assist, BombDefused, BombPlanted, LogEvent, MapChange, MatchStarted, PlayerJoin, PlayerQuit,
    RoundEnd, Suicide,
};
use crate::error::{DispatchError, HandlerError};
use log::error;
use shared::{
    Kill, RawEvent, Scoreboard, EVENT_ASSIST, EVENT_BOMB_DEFUSED, EVENT_BOMB_PLANTED,
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_KILL, EVENT_MAP_CHANGE, EVENT_MATCH_STARTED,
    EVENT_PLAYBACK, EVENT_PLAYER_JOIN, EVENT_PLAYER_QUIT, EVENT_RESTART, EVENT_ROUND_END,
    EVENT_ROUND_START, EVENT_SCOREBOARD, EVENT_SUICIDE,
};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Upper bound on handlers per event kind.
pub const MAX_HANDLERS_PER_KIND: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Playback,
    Scoreboard,
    Kill,
    Assist,
    RoundStart,
    RoundEnd,
    BombPlanted,
    BombDefused,
    PlayerJoin,
    PlayerQuit,
    MapChange,
    MatchStarted,
    Restart,
    Suicide,
    /// Any event kind without a dedicated type
    Unknown,
}

impl EventKind {
    pub const ALL: [EventKind; 17] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::Playback,
        EventKind::Scoreboard,
        EventKind::Kill,
        EventKind::Assist,
        EventKind::RoundStart,
        EventKind::RoundEnd,
        EventKind::BombPlanted,
        EventKind::BombDefused,
        EventKind::PlayerJoin,
        EventKind::PlayerQuit,
        EventKind::MapChange,
        EventKind::MatchStarted,
        EventKind::Restart,
        EventKind::Suicide,
        EventKind::Unknown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Connect => EVENT_CONNECT,
            EventKind::Disconnect => EVENT_DISCONNECT,
            EventKind::Playback => EVENT_PLAYBACK,
            EventKind::Scoreboard => EVENT_SCOREBOARD,
            EventKind::Kill => EVENT_KILL,
            EventKind::Assist => EVENT_ASSIST,
            EventKind::RoundStart => EVENT_ROUND_START,
            EventKind::RoundEnd => EVENT_ROUND_END,
            EventKind::BombPlanted => EVENT_BOMB_PLANTED,
            EventKind::BombDefused => EVENT_BOMB_DEFUSED,
            EventKind::PlayerJoin => EVENT_PLAYER_JOIN,
            EventKind::PlayerQuit => EVENT_PLAYER_QUIT,
            EventKind::MapChange => EVENT_MAP_CHANGE,
            EventKind::MatchStarted => EVENT_MATCH_STARTED,
            EventKind::Restart => EVENT_RESTART,
            EventKind::Suicide => EVENT_SUICIDE,
            EventKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the session publishes to application callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    Disconnect,
    /// Backlog batch, oldest first
    Playback(Vec<Vec<RawEvent>>),
    Scoreboard(Arc<Scoreboard>),
    Kill(Kill),
    Assist(Assist),
    RoundStart,
    RoundEnd(RoundEnd),
    BombPlanted(BombPlanted),
    BombDefused(BombDefused),
    PlayerJoin(PlayerJoin),
    PlayerQuit(PlayerQuit),
    MapChange(MapChange),
    MatchStarted(MatchStarted),
    Restart,
    Suicide(Suicide),
    Unknown(RawEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect => EventKind::Connect,
            Event::Disconnect => EventKind::Disconnect,
            Event::Playback(_) => EventKind::Playback,
            Event::Scoreboard(_) => EventKind::Scoreboard,
            Event::Kill(_) => EventKind::Kill,
            Event::Assist(_) => EventKind::Assist,
            Event::RoundStart => EventKind::RoundStart,
            Event::RoundEnd(_) => EventKind::RoundEnd,
            Event::BombPlanted(_) => EventKind::BombPlanted,
            Event::BombDefused(_) => EventKind::BombDefused,
            Event::PlayerJoin(_) => EventKind::PlayerJoin,
            Event::PlayerQuit(_) => EventKind::PlayerQuit,
            Event::MapChange(_) => EventKind::MapChange,
            Event::MatchStarted(_) => EventKind::MatchStarted,
            Event::Restart => EventKind::Restart,
            Event::Suicide(_) => EventKind::Suicide,
            Event::Unknown(_) => EventKind::Unknown,
        }
    }
}

impl From<LogEvent> for Event {
    fn from(event: LogEvent) -> Self {
        match event {
            LogEvent::Kill(kill) => Event::Kill(kill),
            LogEvent::Assist(assist) => Event::Assist(assist.assist),
            LogEvent::RoundStart => Event::RoundStart,
            LogEvent::RoundEnd(round_end) => Event::RoundEnd(round_end),
            LogEvent::BombPlanted(planted) => Event::BombPlanted(planted),
            LogEvent::BombDefused(defused) => Event::BombDefused(defused),
            LogEvent::PlayerJoin(join) => Event::PlayerJoin(join),
            LogEvent::PlayerQuit(quit) => Event::PlayerQuit(quit),
            LogEvent::MapChange(change) => Event::MapChange(change),
            LogEvent::MatchStarted(started) => Event::MatchStarted(started),
            LogEvent::Restart => Event::Restart,
            LogEvent::Suicide(suicide) => Event::Suicide(suicide),
            LogEvent::Raw(raw) => Event::Unknown(raw),
        }
    }
}

pub type Handler = Box<dyn FnMut(&Event) -> Result<(), HandlerError> + Send>;

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
    failures: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` after any handlers already registered for `kind`.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Result<(), DispatchError>
    where
        F: FnMut(&Event) -> Result<(), HandlerError> + Send + 'static,
    {
        let handlers = self.handlers.entry(kind).or_default();
        if handlers.len() >= MAX_HANDLERS_PER_KIND {
            return Err(DispatchError::TooManyHandlers {
                kind: kind.to_string(),
                limit: MAX_HANDLERS_PER_KIND,
            });
        }

        handlers.push(Box::new(handler));
        Ok(())
    }

    /// Makes `handler` the only handler for `kind`.
    pub fn replace<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) -> Result<(), HandlerError> + Send + 'static,
    {
        self.handlers.insert(kind, vec![Box::new(handler)]);
    }

    /// Drops every handler for `kind`, restoring the no-op default.
    pub fn clear(&mut self, kind: EventKind) {
        self.handlers.remove(&kind);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Total handler failures since creation.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Runs every handler registered for the event's kind and returns how many
    /// of them failed.
    pub fn publish(&mut self, event: &Event) -> usize {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get_mut(&kind) else {
            return 0;
        };

        let mut failed = 0;
        for (index, handler) in handlers.iter_mut().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("{} handler #{} failed: {}", kind, index, e);
                    failed += 1;
                }
                Err(payload) => {
                    error!(
                        "{} handler #{} panicked: {}",
                        kind,
                        index,
                        panic_message(payload.as_ref())
                    );
                    failed += 1;
                }
            }
        }

        self.failures += failed as u64;
        failed
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (*kind, handlers.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("handlers", &counts)
            .field("failures", &self.failures)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

//! Frame decoding for scorebot `log` messages
//!
//! A `log` frame carries a list of bundles, newest first. Each bundle maps
//! event kinds to payloads. Frames holding a single bundle are live events
//! and are decoded into typed [`LogEvent`]s one entry at a time, so one
//! malformed entry never hides its neighbours. Frames holding more than one
//! bundle are backlog sent on (re)connect and are surfaced whole, oldest
//! first, as a playback batch holding one [`RawEvent`] list per bundle.

use crate::error::DecodeError;
use crate::registry::{PlayerRegistry, Roster};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::{
    Kill, PendingAssist, RawEvent, Side, WinType, EVENT_ASSIST, EVENT_BOMB_DEFUSED,
    EVENT_BOMB_PLANTED, EVENT_KILL, EVENT_MAP_CHANGE, EVENT_MATCH_STARTED, EVENT_PLAYER_JOIN,
    EVENT_PLAYER_QUIT, EVENT_RESTART, EVENT_ROUND_END, EVENT_ROUND_START, EVENT_SUICIDE,
};
use std::sync::Arc;

/// Wire layout of a `Kill` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillFrame {
    pub event_id: u64,
    pub killer_nick: String,
    pub victim_nick: String,
    pub weapon: String,
    pub head_shot: bool,
    #[serde(default)]
    pub flasher_nick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assist {
    /// Correlation id of the kill this assist belongs to
    pub kill_event_id: u64,
    pub assister_nick: String,
    pub victim_nick: String,
    #[serde(default)]
    pub killer_nick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEnd {
    pub winner: Side,
    #[serde(default)]
    pub win_type: Option<WinType>,
    pub counter_terrorist_score: u32,
    pub terrorist_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BombPlanted {
    pub player_nick: String,
    #[serde(default)]
    pub ct_players: Option<u32>,
    #[serde(default)]
    pub t_players: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BombDefused {
    pub player_nick: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoin {
    pub player_nick: String,
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerQuit {
    pub player_nick: String,
    #[serde(default)]
    pub player_side: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapChange {
    pub map: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStarted {
    #[serde(default)]
    pub map: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suicide {
    pub player_nick: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub weapon: Option<String>,
}

/// Assist entry together with the players it names, resolved when decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistEvent {
    pub assist: Assist,
    pub pending: PendingAssist,
}

/// One decoded live event.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Kill(Kill),
    Assist(AssistEvent),
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
    Raw(RawEvent),
}

#[derive(Debug)]
pub enum Frame {
    /// Backlog bundles, oldest first. Each bundle keeps its own entries.
    Playback(Vec<Vec<RawEvent>>),
    /// Entries of a single live bundle, in frame order.
    Live(Vec<Result<LogEvent, DecodeError>>),
}

/// Decodes `log` frames, resolving player nicknames against the session roster.
pub struct FrameDecoder {
    registry: Arc<PlayerRegistry>,
}

impl FrameDecoder {
    pub fn new(registry: Arc<PlayerRegistry>) -> Self {
        Self { registry }
    }

    /// Decodes the text of a `log` message.
    pub fn decode_text(&self, text: &str) -> Result<Frame, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;
        self.decode(value)
    }

    /// Decodes an already parsed `log` message.
    pub fn decode(&self, frame: Value) -> Result<Frame, DecodeError> {
        let mut bundles = match frame {
            Value::Object(mut fields) => match fields.remove("log") {
                Some(Value::Array(bundles)) => bundles,
                _ => return Err(DecodeError::MissingLog),
            },
            _ => return Err(DecodeError::MissingLog),
        };

        // The scorebot sends the newest bundle first
        bundles.reverse();

        if bundles.len() > 1 {
            let batch = bundles.into_iter().map(bundle_entries).collect();
            return Ok(Frame::Playback(batch));
        }

        // Killer and victim of one kill must come from the same roster
        let roster = self.registry.roster();
        let events = bundles
            .into_iter()
            .flat_map(bundle_entries)
            .map(|entry| decode_entry(entry, &roster))
            .collect();

        Ok(Frame::Live(events))
    }
}

fn bundle_entries(bundle: Value) -> Vec<RawEvent> {
    match bundle {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(kind, payload)| RawEvent { kind, payload })
            .collect(),
        // A bundle that is not a map has no kind to key it by
        other => vec![RawEvent {
            kind: String::new(),
            payload: other,
        }],
    }
}

/// Decodes one `kind -> payload` entry. Unrecognised kinds become [`LogEvent::Raw`].
pub fn decode_entry(entry: RawEvent, roster: &Roster) -> Result<LogEvent, DecodeError> {
    let kind = entry.kind.as_str();
    let payload = entry.payload;

    let event = match kind {
        EVENT_KILL => {
            let frame: KillFrame = typed(kind, payload)?;
            LogEvent::Kill(Kill {
                event_id: frame.event_id,
                killer: roster.resolve(&frame.killer_nick),
                victim: roster.resolve(&frame.victim_nick),
                weapon: frame.weapon,
                headshot: frame.head_shot,
                assister: None,
                flasher: frame.flasher_nick.as_deref().map(|nick| roster.resolve(nick)),
            })
        }
        EVENT_ASSIST => {
            let assist: Assist = typed(kind, payload)?;
            let pending = PendingAssist {
                kill_event_id: assist.kill_event_id,
                assister: roster.resolve(&assist.assister_nick),
                victim: roster.resolve(&assist.victim_nick),
            };
            LogEvent::Assist(AssistEvent { assist, pending })
        }
        EVENT_ROUND_START => LogEvent::RoundStart,
        EVENT_ROUND_END => LogEvent::RoundEnd(typed(kind, payload)?),
        EVENT_BOMB_PLANTED => LogEvent::BombPlanted(typed(kind, payload)?),
        EVENT_BOMB_DEFUSED => LogEvent::BombDefused(typed(kind, payload)?),
        EVENT_PLAYER_JOIN => LogEvent::PlayerJoin(typed(kind, payload)?),
        EVENT_PLAYER_QUIT => LogEvent::PlayerQuit(typed(kind, payload)?),
        EVENT_MAP_CHANGE => LogEvent::MapChange(typed(kind, payload)?),
        EVENT_MATCH_STARTED => LogEvent::MatchStarted(typed(kind, payload)?),
        EVENT_RESTART => LogEvent::Restart,
        EVENT_SUICIDE => LogEvent::Suicide(typed(kind, payload)?),
        _ => LogEvent::Raw(RawEvent {
            kind: kind.to_string(),
            payload,
        }),
    };

    Ok(event)
}

fn typed<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T, DecodeError> {
    // Field-less kinds are sometimes sent with a null payload
    let payload = match payload {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    serde_json::from_value(payload).map_err(|source| DecodeError::Malformed {
        kind: kind.to_string(),
        source,
    })
}

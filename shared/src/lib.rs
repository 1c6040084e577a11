use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const EVENT_CONNECT: &str = "Connect";
pub const EVENT_DISCONNECT: &str = "Disconnect";
pub const EVENT_PLAYBACK: &str = "Playback";
pub const EVENT_SCOREBOARD: &str = "Scoreboard";
pub const EVENT_ASSIST: &str = "Assist";
pub const EVENT_BOMB_DEFUSED: &str = "BombDefused";
pub const EVENT_BOMB_PLANTED: &str = "BombPlanted";
pub const EVENT_KILL: &str = "Kill";
pub const EVENT_MAP_CHANGE: &str = "MapChange";
pub const EVENT_MATCH_STARTED: &str = "MatchStarted";
pub const EVENT_PLAYER_JOIN: &str = "PlayerJoin";
pub const EVENT_PLAYER_QUIT: &str = "PlayerQuit";
pub const EVENT_RESTART: &str = "Restart";
pub const EVENT_ROUND_END: &str = "RoundEnd";
pub const EVENT_ROUND_START: &str = "RoundStart";
pub const EVENT_SUICIDE: &str = "Suicide";

pub const SIDE_TERRORIST: &str = "TERRORIST";
pub const SIDE_COUNTER_TERRORIST: &str = "CT";

/// One of the two match roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "TERRORIST")]
    Terrorist,
    #[serde(rename = "CT")]
    CounterTerrorist,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Terrorist => Side::CounterTerrorist,
            Side::CounterTerrorist => Side::Terrorist,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Terrorist => SIDE_TERRORIST,
            Side::CounterTerrorist => SIDE_COUNTER_TERRORIST,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a round was decided. Values the scorebot adds later are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WinType {
    BombDefused,
    CtsWin,
    Lost,
    RoundDraw,
    TargetBombed,
    TargetSaved,
    TerroristsWin,
    Other(String),
}

impl From<String> for WinType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Bomb_Defused" => WinType::BombDefused,
            "CTs_Win" => WinType::CtsWin,
            "lost" => WinType::Lost,
            "Round_Draw" => WinType::RoundDraw,
            "Target_Bombed" => WinType::TargetBombed,
            "Target_Saved" => WinType::TargetSaved,
            "Terrorists_Win" => WinType::TerroristsWin,
            _ => WinType::Other(value),
        }
    }
}

impl From<WinType> for String {
    fn from(value: WinType) -> Self {
        match value {
            WinType::BombDefused => "Bomb_Defused".to_string(),
            WinType::CtsWin => "CTs_Win".to_string(),
            WinType::Lost => "lost".to_string(),
            WinType::RoundDraw => "Round_Draw".to_string(),
            WinType::TargetBombed => "Target_Bombed".to_string(),
            WinType::TargetSaved => "Target_Saved".to_string(),
            WinType::TerroristsWin => "Terrorists_Win".to_string(),
            WinType::Other(other) => other,
        }
    }
}

/// Identity of the team a player was listed under in the snapshot that produced it.
///
/// Players point back at their team through this tag instead of the full [`Team`],
/// which owns the players and would otherwise form a reference cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamTag {
    pub id: u64,
    pub name: String,
    pub side: Side,
}

/// Most recently observed state of one player.
///
/// A fresh value is produced for every scoreboard snapshot; nothing patches it
/// in place afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub nick: String,
    pub name: String,
    pub hp: u32,
    pub kevlar: bool,
    pub helmet: bool,
    pub has_defusekit: bool,
    pub money: u32,
    pub adr: f64,
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
    pub score: i32,
    pub rating: f64,
    pub alive: bool,
    pub hltv_id: Option<u64>,
    pub steam_id: Option<String>,
    pub primary_weapon: Option<String>,
    pub team: Option<TeamTag>,
}

impl Player {
    /// Placeholder for a nickname no snapshot has listed yet. Every statistic is zero.
    pub fn unknown(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            ..Self::default()
        }
    }

    /// True once this player has been seen in a scoreboard snapshot.
    pub fn is_known(&self) -> bool {
        self.team.is_some()
    }

    pub fn side(&self) -> Option<Side> {
        self.team.as_ref().map(|team| team.side)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub side: Side,
    pub score: u32,
    pub players: Vec<Arc<Player>>,
}

impl Team {
    pub fn tag(&self) -> TeamTag {
        TeamTag {
            id: self.id,
            name: self.name.clone(),
            side: self.side,
        }
    }

    pub fn player(&self, nick: &str) -> Option<&Arc<Player>> {
        self.players.iter().find(|player| player.nick == nick)
    }
}

/// Full match state as of one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Scoreboard {
    pub map_name: String,
    pub bomb_planted: bool,
    pub current_round: u32,
    pub terrorists: Team,
    pub counter_terrorists: Team,
}

impl Scoreboard {
    /// Team name to score, for quick printing.
    pub fn score(&self) -> HashMap<String, u32> {
        let mut score = HashMap::new();
        score.insert(self.terrorists.name.clone(), self.terrorists.score);
        score.insert(
            self.counter_terrorists.name.clone(),
            self.counter_terrorists.score,
        );
        score
    }

    /// The team with the strictly higher score, `None` on a tie.
    pub fn leader(&self) -> Option<&Team> {
        if self.terrorists.score > self.counter_terrorists.score {
            return Some(&self.terrorists);
        }

        if self.counter_terrorists.score > self.terrorists.score {
            return Some(&self.counter_terrorists);
        }

        None
    }

    pub fn team(&self, side: Side) -> &Team {
        match side {
            Side::Terrorist => &self.terrorists,
            Side::CounterTerrorist => &self.counter_terrorists,
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &Arc<Player>> {
        self.terrorists
            .players
            .iter()
            .chain(self.counter_terrorists.players.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kill {
    /// Correlation key shared with the matching assist.
    pub event_id: u64,
    pub killer: Arc<Player>,
    pub victim: Arc<Player>,
    pub weapon: String,
    pub headshot: bool,
    pub assister: Option<Arc<Player>>,
    pub flasher: Option<Arc<Player>>,
}

/// An assist that arrived before its kill was published.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAssist {
    pub kill_event_id: u64,
    pub assister: Arc<Player>,
    pub victim: Arc<Player>,
}

/// Event kind the decoder has no dedicated type for, forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: String,
    pub payload: Value,
}

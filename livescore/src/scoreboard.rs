//! Scoreboard reconstruction from full-state snapshots
//!
//! Each `scoreboard` frame supersedes everything known before it. Both teams
//! and every player are rebuilt from scratch; nothing is patched in place.
//! A snapshot missing any required field is rejected as a whole and the
//! previous roster stays in effect.

use crate::error::BuildError;
use crate::registry::PlayerRegistry;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use shared::{Player, Scoreboard, Side, Team, TeamTag};
use std::collections::HashSet;
use std::sync::Arc;

/// Wire layout of a `scoreboard` frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardPayload {
    pub map_name: String,
    pub bomb_planted: bool,
    pub current_round: u32,

    #[serde(rename = "TERRORIST")]
    pub terrorists: Vec<PlayerRecord>,
    #[serde(rename = "CT")]
    pub counter_terrorists: Vec<PlayerRecord>,

    pub t_team_id: u64,
    pub terrorist_team_name: String,
    pub t_team_score: u32,

    pub ct_team_id: u64,
    pub ct_team_name: String,
    pub ct_team_score: u32,
}

/// Wire layout of one player row in a snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub nick: String,
    pub name: String,
    pub hp: u32,
    pub kevlar: bool,
    pub helmet: bool,
    pub has_defusekit: bool,
    pub money: u32,
    pub damage_pr_round: f64,
    #[serde(default)]
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
    pub score: i32,
    #[serde(default)]
    pub rating: f64,
    pub alive: bool,
    pub db_id: u64,
    pub steam_id: String,
    #[serde(default)]
    pub primary_weapon: Option<String>,
}

impl PlayerRecord {
    fn into_player(self, team: &TeamTag) -> Player {
        Player {
            nick: self.nick,
            name: self.name,
            hp: self.hp,
            kevlar: self.kevlar,
            helmet: self.helmet,
            has_defusekit: self.has_defusekit,
            money: self.money,
            adr: self.damage_pr_round,
            kills: self.kills,
            assists: self.assists,
            deaths: self.deaths,
            score: self.score,
            rating: self.rating,
            alive: self.alive,
            hltv_id: Some(self.db_id),
            steam_id: Some(self.steam_id),
            primary_weapon: self.primary_weapon,
            team: Some(team.clone()),
        }
    }
}

/// Rebuilds the scoreboard and refreshes the session's player registry.
pub struct ScoreboardBuilder {
    registry: Arc<PlayerRegistry>,
}

impl ScoreboardBuilder {
    pub fn new(registry: Arc<PlayerRegistry>) -> Self {
        Self { registry }
    }

    /// Builds a scoreboard from a raw snapshot payload.
    ///
    /// On success the registry is swapped to the freshly built players before
    /// returning, so events decoded from the next frame resolve against them.
    /// On failure the registry is left untouched.
    pub fn build(&self, payload: &Value) -> Result<Arc<Scoreboard>, BuildError> {
        let payload = ScoreboardPayload::deserialize(payload)?;
        let scoreboard = assemble(payload)?;

        self.registry
            .replace_all(scoreboard.players().map(Arc::clone));

        debug!(
            "Scoreboard round {} on {}: {} {} - {} {}",
            scoreboard.current_round,
            scoreboard.map_name,
            scoreboard.terrorists.name,
            scoreboard.terrorists.score,
            scoreboard.counter_terrorists.score,
            scoreboard.counter_terrorists.name,
        );

        Ok(Arc::new(scoreboard))
    }
}

/// Turns a decoded snapshot into a scoreboard without touching any registry.
pub fn assemble(payload: ScoreboardPayload) -> Result<Scoreboard, BuildError> {
    let mut seen = HashSet::new();

    let terrorists = build_team(
        TeamTag {
            id: payload.t_team_id,
            name: payload.terrorist_team_name,
            side: Side::Terrorist,
        },
        payload.t_team_score,
        payload.terrorists,
        &mut seen,
    )?;

    let counter_terrorists = build_team(
        TeamTag {
            id: payload.ct_team_id,
            name: payload.ct_team_name,
            side: Side::CounterTerrorist,
        },
        payload.ct_team_score,
        payload.counter_terrorists,
        &mut seen,
    )?;

    Ok(Scoreboard {
        map_name: payload.map_name,
        bomb_planted: payload.bomb_planted,
        current_round: payload.current_round,
        terrorists,
        counter_terrorists,
    })
}

fn build_team(
    tag: TeamTag,
    score: u32,
    records: Vec<PlayerRecord>,
    seen: &mut HashSet<String>,
) -> Result<Team, BuildError> {
    let mut players = Vec::with_capacity(records.len());

    for record in records {
        // A nickname is the registry key, it may only appear once per snapshot
        if !seen.insert(record.nick.clone()) {
            return Err(BuildError::DuplicatePlayer(record.nick));
        }
        players.push(Arc::new(record.into_player(&tag)));
    }

    Ok(Team {
        id: tag.id,
        name: tag.name,
        side: tag.side,
        score,
        players,
    })
}

// Denormalised views: player and fixture references with human readable names.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{PlayerId, Position, Snapshot, TeamId};
use crate::fixtures::FixtureContext;
use crate::planner::{Action, CompactFixture};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRef {
    pub id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub team_id: TeamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub now_cost: u32,
    pub ownership_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_team_id: Option<TeamId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_strength: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_home: Option<bool>,
}

pub type ExpandedAction = Action<PlayerRef, FixtureRef>;

fn team_name(snapshot: &Snapshot, id: Option<TeamId>) -> Option<String> {
    id.and_then(|id| snapshot.team(id)).and_then(|t| t.name.clone())
}

/// Player view. An id missing from the bootstrap keeps the id and nothing
/// else.
pub fn describe_player(snapshot: &Snapshot, id: PlayerId) -> PlayerRef {
    match snapshot.player(id) {
        Some(p) => PlayerRef {
            id,
            name: p.web_name.clone(),
            team_id: p.team,
            team_name: team_name(snapshot, Some(p.team)),
            position: Some(p.position),
            now_cost: p.now_cost,
            ownership_pct: p.selected_by_percent,
        },
        None => PlayerRef {
            id,
            name: None,
            team_id: 0,
            team_name: None,
            position: None,
            now_cost: 0,
            ownership_pct: 0.0,
        },
    }
}

pub fn describe_fixture(snapshot: &Snapshot, fixture: &FixtureContext) -> FixtureRef {
    FixtureRef {
        opponent_team_id: fixture.opponent_team_id,
        opponent_team_name: team_name(snapshot, fixture.opponent_team_id),
        opponent_strength: fixture.opponent_strength,
        was_home: Some(fixture.was_home),
    }
}

pub fn describe_compact_fixture(snapshot: &Snapshot, fixture: &CompactFixture) -> FixtureRef {
    FixtureRef {
        opponent_team_id: fixture.opponent_team_id,
        opponent_team_name: team_name(snapshot, fixture.opponent_team_id),
        opponent_strength: fixture.opponent_strength,
        was_home: fixture.was_home,
    }
}

pub fn expand_action(snapshot: &Snapshot, action: &Action) -> ExpandedAction {
    action.map_refs(
        |id| describe_player(snapshot, id),
        |fx| describe_compact_fixture(snapshot, fx),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamesIndexPlayer {
    pub name: Option<String>,
    pub team_id: TeamId,
    pub team_name: Option<String>,
    pub position: Position,
}

/// Every player and team id mapped to its names, ordered by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamesIndex {
    pub players: BTreeMap<PlayerId, NamesIndexPlayer>,
    pub teams: BTreeMap<TeamId, Option<String>>,
}

impl NamesIndex {
    pub fn build(snapshot: &Snapshot) -> Self {
        let players = snapshot
            .players()
            .iter()
            .map(|p| {
                let entry = NamesIndexPlayer {
                    name: p.web_name.clone(),
                    team_id: p.team,
                    team_name: team_name(snapshot, Some(p.team)),
                    position: p.position,
                };
                (p.id, entry)
            })
            .collect();
        let teams = snapshot.teams().iter().map(|t| (t.id, t.name.clone())).collect();
        NamesIndex { players, teams }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

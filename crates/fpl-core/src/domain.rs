// Typed views of the FPL bootstrap, fixture and picks payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub type PlayerId = u32;
pub type TeamId = u32;

/// Strength assumed for a team whose strength is absent, zero or unknown.
pub const DEFAULT_TEAM_STRENGTH: u8 = 3;

const MIN_TEAM_STRENGTH: u8 = 1;
const MAX_TEAM_STRENGTH: u8 = 5;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// FPL squad positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    /// Outfield positions in the order lineups are filled.
    pub const OUTFIELD: [Position; 3] = [Position::Defender, Position::Midfielder, Position::Forward];

    /// Map an upstream `element_type` id. Unknown ids fall back to midfield.
    pub fn from_element_type(element_type: u32) -> Self {
        Self::known_element_type(element_type).unwrap_or(Position::Midfielder)
    }

    fn known_element_type(element_type: u32) -> Option<Self> {
        match element_type {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Forward),
            _ => None,
        }
    }

    /// Parse a short position label by its first letter ("GKP", "DEF", "M", ...).
    pub fn from_short_name(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().chars().next()? {
            'G' => Some(Position::Goalkeeper),
            'D' => Some(Position::Defender),
            'M' => Some(Position::Midfielder),
            'F' => Some(Position::Forward),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }

    /// Fewest starters allowed in this position.
    pub fn min_starters(&self) -> usize {
        match self {
            Position::Goalkeeper => 1,
            Position::Defender => 3,
            Position::Midfielder => 2,
            Position::Forward => 1,
        }
    }

    /// Most starters allowed in this position.
    pub fn max_starters(&self) -> usize {
        match self {
            Position::Goalkeeper => 1,
            Position::Defender => 5,
            Position::Midfielder => 5,
            Position::Forward => 3,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Raw upstream payloads
// ---------------------------------------------------------------------------

/// `bootstrap-static/` payload. Numeric fields stay as raw JSON values and are
/// parsed leniently when the snapshot is built.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapPayload {
    #[serde(default)]
    pub elements: Vec<RawElement>,
    #[serde(default)]
    pub teams: Vec<RawTeam>,
    #[serde(default)]
    pub element_types: Vec<RawElementType>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawElement {
    pub id: PlayerId,
    #[serde(default)]
    pub web_name: Option<String>,
    #[serde(default)]
    pub team: Value,
    #[serde(default)]
    pub element_type: Value,
    #[serde(default)]
    pub now_cost: Value,
    #[serde(default)]
    pub form: Value,
    #[serde(default)]
    pub ict_index: Value,
    #[serde(default)]
    pub minutes: Value,
    #[serde(default)]
    pub selected_by_percent: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTeam {
    pub id: TeamId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub strength: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawElementType {
    pub id: u32,
    #[serde(default)]
    pub singular_name_short: Option<String>,
    #[serde(default)]
    pub singular_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub id: u32,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub finished: bool,
}

/// One fixture from `fixtures/`. `event` is null for unscheduled fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: u32,
    #[serde(default)]
    pub event: Option<u32>,
    pub team_h: TeamId,
    pub team_a: TeamId,
}

/// `entry/{tid}/event/{gw}/picks/` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PicksPayload {
    #[serde(default)]
    pub picks: Vec<Pick>,
    #[serde(default)]
    pub entry_history: EntryHistory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryHistory {
    /// Money in the bank, in tenths of a million.
    #[serde(default)]
    pub bank: Option<i64>,
}

impl PicksPayload {
    pub fn bank(&self) -> i64 {
        self.entry_history.bank.unwrap_or(0)
    }
}

/// A manager's pick. Multiplier 0 is benched, 1 starting, 2 captain, 3 triple captain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub element: PlayerId,
    #[serde(default)]
    pub is_captain: bool,
    #[serde(default)]
    pub is_vice_captain: bool,
    #[serde(default)]
    pub multiplier: u8,
}

impl Pick {
    pub fn is_starting(&self) -> bool {
        self.multiplier > 0
    }
}

// ---------------------------------------------------------------------------
// Parsed entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub web_name: Option<String>,
    pub team: TeamId,
    pub element_type: u32,
    pub position: Position,
    /// Price in tenths of a million.
    pub now_cost: u32,
    pub form: f64,
    pub ict_index: f64,
    /// Cumulative season minutes.
    pub minutes: u32,
    pub selected_by_percent: f64,
}

impl Player {
    /// Web name, or the id when the name is missing.
    pub fn display_name(&self) -> String {
        match &self.web_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: TeamId,
    pub name: Option<String>,
    /// 1..=5, where 5 is the weakest side.
    pub strength: u8,
}

/// Player id -> ownership percentage.
pub type OwnershipIndex = HashMap<PlayerId, f64>;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Parsed bootstrap data with id lookups. Built once per request.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    players: Vec<Player>,
    player_index: HashMap<PlayerId, usize>,
    teams: Vec<Team>,
    team_index: HashMap<TeamId, usize>,
    position_labels: HashMap<u32, Position>,
    last_live_gameweek: Option<u32>,
}

impl Snapshot {
    pub fn from_bootstrap(payload: &BootstrapPayload) -> Self {
        let mut position_labels: HashMap<u32, Position> = (1..=4)
            .filter_map(|et| Position::known_element_type(et).map(|p| (et, p)))
            .collect();
        for et in &payload.element_types {
            let label = et
                .singular_name_short
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(et.singular_name.as_deref());
            if let Some(pos) = label.and_then(Position::from_short_name) {
                position_labels.insert(et.id, pos);
            }
        }

        let mut players = Vec::with_capacity(payload.elements.len());
        let mut player_index = HashMap::with_capacity(payload.elements.len());
        for raw in &payload.elements {
            let element_type = lenient_u32(&raw.element_type);
            let player = Player {
                id: raw.id,
                web_name: raw.web_name.clone(),
                team: lenient_u32(&raw.team),
                element_type,
                position: position_labels
                    .get(&element_type)
                    .copied()
                    .unwrap_or(Position::Midfielder),
                now_cost: lenient_u32(&raw.now_cost),
                form: lenient_f64(&raw.form),
                ict_index: lenient_f64(&raw.ict_index),
                minutes: lenient_u32(&raw.minutes),
                selected_by_percent: lenient_f64(&raw.selected_by_percent).max(0.0),
            };
            // A repeated id replaces the earlier entry in place.
            match player_index.get(&player.id) {
                Some(&i) => players[i] = player,
                None => {
                    player_index.insert(player.id, players.len());
                    players.push(player);
                }
            }
        }

        let mut teams = Vec::with_capacity(payload.teams.len());
        let mut team_index = HashMap::with_capacity(payload.teams.len());
        for raw in &payload.teams {
            let team = Team {
                id: raw.id,
                name: raw.name.clone(),
                strength: parse_strength(&raw.strength),
            };
            match team_index.get(&team.id) {
                Some(&i) => teams[i] = team,
                None => {
                    team_index.insert(team.id, teams.len());
                    teams.push(team);
                }
            }
        }

        let last_live_gameweek = payload
            .events
            .iter()
            .filter(|e| e.is_current || e.finished)
            .map(|e| e.id)
            .max()
            .filter(|&id| id > 0);

        Snapshot {
            players,
            player_index,
            teams,
            team_index,
            position_labels,
            last_live_gameweek,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.player_index.get(&id).map(|&i| &self.players[i])
    }

    /// Players in bootstrap order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.team_index.get(&id).map(|&i| &self.teams[i])
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Strength of a known team, `None` for an unknown team id.
    pub fn team_strength(&self, id: TeamId) -> Option<u8> {
        self.team(id).map(|t| t.strength)
    }

    /// Position of a player; unknown players count as midfielders.
    pub fn position_of(&self, id: PlayerId) -> Position {
        self.player(id)
            .map(|p| p.position)
            .unwrap_or(Position::Midfielder)
    }

    /// Position label for an `element_type`, if the bootstrap knows it.
    pub fn position_label(&self, element_type: u32) -> Option<Position> {
        self.position_labels.get(&element_type).copied()
    }

    pub fn ownership_index(&self) -> OwnershipIndex {
        self.players
            .iter()
            .map(|p| (p.id, p.selected_by_percent))
            .collect()
    }

    pub fn display_name(&self, id: PlayerId) -> String {
        self.player(id)
            .map(Player::display_name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Highest event id that is current or finished.
    pub fn last_live_gameweek(&self) -> Option<u32> {
        self.last_live_gameweek
    }
}

// ---------------------------------------------------------------------------
// Lenient numeric parsing
// ---------------------------------------------------------------------------

/// Parse a number or numeric string; anything else (or a non-finite value) is 0.
pub fn lenient_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Like [`lenient_f64`], truncated to a non-negative integer.
pub fn lenient_u32(value: &Value) -> u32 {
    let v = lenient_f64(value);
    if v <= 0.0 {
        0
    } else if v >= u32::MAX as f64 {
        u32::MAX
    } else {
        v as u32
    }
}

fn parse_strength(value: &Value) -> u8 {
    match lenient_u32(value) {
        0 => DEFAULT_TEAM_STRENGTH,
        s => s.clamp(MIN_TEAM_STRENGTH as u32, MAX_TEAM_STRENGTH as u32) as u8,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

// Response bodies for the tool endpoints.

use serde::Serialize;
use serde_json::Value;

use fpl_core::analysis::{CaptainCandidate, EpDeltaRow, TemplateSplit};
use fpl_core::domain::{lenient_u32, BootstrapPayload, Fixture, Pick, PlayerId, Snapshot, TeamId};
use fpl_core::names::{ExpandedAction, FixtureRef, PlayerRef};
use fpl_core::planner::{Action, PlanData};
use fpl_core::scoring::CaptainMode;
use fpl_core::transfers::TransferSuggestion;

pub const PLANNER_SCHEMA_VERSION: &str = "planner/1.1";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ---------------------------------------------------------------------------
// Bootstrap and fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SlimTeam {
    pub id: TeamId,
    pub name: Option<String>,
    pub strength: u8,
}

/// Player fields as the upstream sends them; form and ICT stay text.
#[derive(Debug, Serialize)]
pub struct SlimPlayer {
    pub id: PlayerId,
    pub web_name: Option<String>,
    pub now_cost: u32,
    pub form: String,
    pub ict_index: String,
    pub minutes: u32,
    pub team: TeamId,
}

#[derive(Debug, Serialize)]
pub struct BootstrapSlim {
    pub teams: Vec<SlimTeam>,
    pub players: Vec<SlimPlayer>,
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

impl BootstrapSlim {
    pub fn build(payload: &BootstrapPayload, snapshot: &Snapshot) -> Self {
        let teams = snapshot
            .teams()
            .iter()
            .map(|t| SlimTeam {
                id: t.id,
                name: t.name.clone(),
                strength: t.strength,
            })
            .collect();
        let players = payload
            .elements
            .iter()
            .map(|e| SlimPlayer {
                id: e.id,
                web_name: e.web_name.clone(),
                now_cost: lenient_u32(&e.now_cost),
                form: raw_text(&e.form),
                ict_index: raw_text(&e.ict_index),
                minutes: lenient_u32(&e.minutes),
                team: lenient_u32(&e.team),
            })
            .collect();
        BootstrapSlim { teams, players }
    }
}

#[derive(Debug, Serialize)]
pub struct FixturesResponse {
    pub fixtures: Vec<Fixture>,
}

// ---------------------------------------------------------------------------
// Manager picks and summary
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PickExpanded {
    pub player: PlayerRef,
    pub is_captain: bool,
    pub is_vice_captain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<FixtureRef>,
}

#[derive(Debug, Serialize)]
pub struct ManagerPicksResponse {
    pub picks: Vec<Pick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picks_expanded: Option<Vec<PickExpanded>>,
}

#[derive(Debug, Serialize)]
pub struct PickNote {
    pub element: PlayerId,
    pub is_captain: bool,
    pub is_vice_captain: bool,
}

impl From<&Pick> for PickNote {
    fn from(p: &Pick) -> Self {
        PickNote {
            element: p.element,
            is_captain: p.is_captain,
            is_vice_captain: p.is_vice_captain,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaptainCandidateExpanded {
    pub player: PlayerRef,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub gw: u32,
    pub picks: Vec<PickNote>,
    pub template_vs_differential: TemplateSplit,
    pub captain_candidates: Vec<CaptainCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picks_expanded: Option<Vec<PickExpanded>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captain_candidates_expanded: Option<Vec<CaptainCandidateExpanded>>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRow {
    pub out_element: PlayerId,
    pub in_element: PlayerId,
    pub reason: String,
    pub epdelta_gain: f64,
}

impl TransferRow {
    pub fn from_suggestion(s: &TransferSuggestion, reason: impl Into<String>, gain: f64) -> Self {
        TransferRow {
            out_element: s.out,
            in_element: s.incoming,
            reason: reason.into(),
            epdelta_gain: gain,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferExpanded {
    pub out: PlayerRef,
    #[serde(rename = "in")]
    pub incoming: PlayerRef,
    pub reason: String,
    pub epdelta_gain: f64,
}

#[derive(Debug, Serialize)]
pub struct EpDeltaExpanded {
    pub player: PlayerRef,
    pub epdelta: f64,
    pub fixture: FixtureRef,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub gw: u32,
    pub recommended_captain_safe: CaptainCandidate,
    pub recommended_captain_aggressive: CaptainCandidate,
    pub epdeltas: Vec<EpDeltaRow>,
    pub transfer_suggestions: Vec<TransferRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epdeltas_expanded: Option<Vec<EpDeltaExpanded>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_captain_safe_expanded: Option<CaptainCandidateExpanded>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_captain_aggressive_expanded: Option<CaptainCandidateExpanded>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_suggestions_expanded: Option<Vec<TransferExpanded>>,
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PlannerMeta {
    pub tid: u32,
    pub gw: u32,
    pub mode: CaptainMode,
    pub allow_hit: bool,
    pub bank_used: i64,
}

#[derive(Debug, Serialize)]
pub struct PlannerData {
    pub gw: u32,
    pub picks_gw_used: u32,
    #[serde(flatten)]
    pub plan: PlanData,
}

/// One squad slot in the expanded planner view.
#[derive(Debug, Serialize)]
pub struct PlannerSlot {
    pub player: PlayerRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixture: Option<FixtureRef>,
    pub epdelta: f64,
    pub is_captain: bool,
    pub is_vice_captain: bool,
}

#[derive(Debug, Serialize)]
pub struct PlannerResponse {
    pub schema_version: &'static str,
    pub generated_at: String,
    pub meta: PlannerMeta,
    pub data: PlannerData,
    pub actions: Vec<Action>,
    pub summary: String,
    pub summary_long: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_suggestions: Option<Vec<TransferRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_expanded: Option<Vec<ExpandedAction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_expanded: Option<Vec<PlannerSlot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimal_expanded: Option<Vec<PlannerSlot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bench_expanded: Option<Vec<PlannerSlot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_suggestions_expanded: Option<Vec<TransferExpanded>>,
}

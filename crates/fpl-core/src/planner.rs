// Gameweek planner: reconciles the manager's current lineup with the optimal
// one and emits an ordered, replayable list of actions.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Fixture, OwnershipIndex, Pick, PlayerId, Position, Snapshot, TeamId};
use crate::fixtures::{fixtures_by_team, TeamFixture};
use crate::scoring::{aggregate_ep_for_fixtures, round2, CaptainMode, EpTable};
use crate::selector::{
    choose_starting_xi, formation_str, is_legal_start, recommend_captain_from_ids, PositionMap,
    STARTING_XI,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest EPΔ gain worth a lineup swap.
pub const SWAP_MIN_GAIN: f64 = 0.20;
pub const BENCH_BOOST_THRESHOLD: f64 = 12.0;
pub const TRIPLE_CAPTAIN_THRESHOLD: f64 = 4.0;

const SWAP_PRIORITY_BASE: u32 = 10;
const CAPTAIN_PRIORITY: u32 = 50;
const VICE_PRIORITY: u32 = 60;
const CHIP_PRIORITY: u32 = 90;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionGroup {
    Lineup,
    Captaincy,
    Chip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    HigherEp,
    HighestCaptainScore,
    SecondBestCaptain,
    BenchBoostValue,
    TripleCaptainValue,
    BelowThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Chip {
    #[serde(rename = "BB")]
    BenchBoost,
    #[serde(rename = "TC")]
    TripleCaptain,
    #[serde(rename = "NONE")]
    NoChip,
}

impl Chip {
    pub fn label(&self) -> &'static str {
        match self {
            Chip::BenchBoost => "BB",
            Chip::TripleCaptain => "TC",
            Chip::NoChip => "NONE",
        }
    }
}

/// Fixture context attached to a swap. Fields are omitted when the player's
/// team has no fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompactFixture {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_team_id: Option<TeamId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_strength: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_home: Option<bool>,
}

impl From<Option<TeamFixture>> for CompactFixture {
    fn from(f: Option<TeamFixture>) -> Self {
        CompactFixture {
            opponent_team_id: f.map(|f| f.opponent_team_id),
            opponent_strength: f.map(|f| f.opponent_strength),
            was_home: f.map(|f| f.was_home),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwapFactors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opp_strength: Option<u8>,
    pub form: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapAction<P = PlayerId, F = CompactFixture> {
    pub action_group: ActionGroup,
    pub priority: u32,
    pub bundle_id: String,
    pub in_player: P,
    pub out_player: P,
    pub ep_in: f64,
    pub ep_out: f64,
    pub delta_ep: f64,
    pub reason_code: ReasonCode,
    pub factors: SwapFactors,
    pub reason: String,
    pub in_fixture: F,
    pub out_fixture: F,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptainAction<P = PlayerId> {
    pub action_group: ActionGroup,
    pub priority: u32,
    pub player: P,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_player: Option<P>,
    pub reason_code: ReasonCode,
    pub reason: String,
    pub ep_new: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ep_old: Option<f64>,
    pub delta_ep: f64,
    pub captain_mode: CaptainMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViceAction<P = PlayerId> {
    pub action_group: ActionGroup,
    pub priority: u32,
    pub player: P,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_player: Option<P>,
    pub reason_code: ReasonCode,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChipDetails {
    pub bench_boost_gain: f64,
    pub triple_captain_gain: f64,
    pub bench_boost_threshold: f64,
    pub triple_captain_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChipAction {
    pub action_group: ActionGroup,
    pub priority: u32,
    pub chip: Chip,
    pub reason_code: ReasonCode,
    pub reason: String,
    pub details: ChipDetails,
}

/// A planner action. Player and fixture references are ids in the compact
/// form; `names::expand_action` swaps them for denormalised views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action<P = PlayerId, F = CompactFixture> {
    Swap(SwapAction<P, F>),
    SetCaptain(CaptainAction<P>),
    SetVice(ViceAction<P>),
    Chip(ChipAction),
}

impl<P, F> Action<P, F> {
    pub fn priority(&self) -> u32 {
        match self {
            Action::Swap(a) => a.priority,
            Action::SetCaptain(a) => a.priority,
            Action::SetVice(a) => a.priority,
            Action::Chip(a) => a.priority,
        }
    }

    pub fn action_group(&self) -> ActionGroup {
        match self {
            Action::Swap(a) => a.action_group,
            Action::SetCaptain(a) => a.action_group,
            Action::SetVice(a) => a.action_group,
            Action::Chip(a) => a.action_group,
        }
    }

    pub fn bundle_id(&self) -> Option<&str> {
        match self {
            Action::Swap(a) => Some(&a.bundle_id),
            _ => None,
        }
    }
}

impl Action {
    /// Rebuild the action with player and fixture references mapped.
    pub fn map_refs<P, F>(
        &self,
        player: impl Fn(PlayerId) -> P,
        fixture: impl Fn(&CompactFixture) -> F,
    ) -> Action<P, F> {
        match self {
            Action::Swap(a) => Action::Swap(SwapAction {
                action_group: a.action_group,
                priority: a.priority,
                bundle_id: a.bundle_id.clone(),
                in_player: player(a.in_player),
                out_player: player(a.out_player),
                ep_in: a.ep_in,
                ep_out: a.ep_out,
                delta_ep: a.delta_ep,
                reason_code: a.reason_code,
                factors: a.factors,
                reason: a.reason.clone(),
                in_fixture: fixture(&a.in_fixture),
                out_fixture: fixture(&a.out_fixture),
            }),
            Action::SetCaptain(a) => Action::SetCaptain(CaptainAction {
                action_group: a.action_group,
                priority: a.priority,
                player: player(a.player),
                old_player: a.old_player.map(&player),
                reason_code: a.reason_code,
                reason: a.reason.clone(),
                ep_new: a.ep_new,
                ep_old: a.ep_old,
                delta_ep: a.delta_ep,
                captain_mode: a.captain_mode,
            }),
            Action::SetVice(a) => Action::SetVice(ViceAction {
                action_group: a.action_group,
                priority: a.priority,
                player: player(a.player),
                old_player: a.old_player.map(&player),
                reason_code: a.reason_code,
                reason: a.reason.clone(),
            }),
            Action::Chip(a) => Action::Chip(a.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChipEval {
    pub bench_boost_gain: f64,
    pub triple_captain_gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanData {
    pub formation_current: String,
    pub formation_optimal: String,
    pub current_start: Vec<PlayerId>,
    pub current_bench: Vec<PlayerId>,
    pub optimal_start: Vec<PlayerId>,
    pub optimal_bench: Vec<PlayerId>,
    pub captain: PlayerId,
    pub vice_captain: PlayerId,
    pub ep_total_current: f64,
    pub ep_total_optimal: f64,
    pub ep_gain_lineup: f64,
    pub bench_ep_total: f64,
    pub chip_eval: ChipEval,
    pub per_player_ep: EpTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub data: PlanData,
    pub actions: Vec<Action>,
    pub summary: String,
    pub summary_long: String,
}

/// Everything the planner reads for one request.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub picks: &'a [Pick],
    pub snapshot: &'a Snapshot,
    /// Fixtures of the target gameweek only.
    pub fixtures_gw: &'a [Fixture],
    pub gw: u32,
    pub ownership: &'a OwnershipIndex,
    pub mode: CaptainMode,
}

/// The swap replay did not reproduce the optimal lineup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Invalid swap order: in={in_player} out={out_player}")]
    InvalidSwapOrder { in_player: PlayerId, out_player: PlayerId },

    #[error("Starters count must remain 11 after swap")]
    StarterCount,

    #[error("Swaps do not yield optimal_start")]
    SwapMismatch,

    #[error("formation_optimal does not match derived positions")]
    FormationMismatch,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Plan a gameweek: optimal XI and bench, captaincy, chip advice and the
/// swap/captaincy/chip actions that take the current lineup there. The
/// actions are replayed before returning; a plan whose swaps do not reach the
/// optimal XI is an error.
pub fn plan_gameweek(input: &PlanInput<'_>) -> Result<Plan, PlanError> {
    let snapshot = input.snapshot;
    let positions = pick_positions(input.picks, snapshot);
    let by_team = fixtures_by_team(input.fixtures_gw, snapshot);

    let per_player_ep: EpTable = input
        .picks
        .iter()
        .map(|pick| {
            let ep = snapshot
                .player(pick.element)
                .map(|p| aggregate_ep_for_fixtures(p, team_fixtures(snapshot, &by_team, p.id)))
                .unwrap_or(0.0);
            (pick.element, round2(ep))
        })
        .collect();

    let (current_start, current_bench) = current_lineup(input.picks, &per_player_ep, &positions);
    let (optimal_start, optimal_bench) = choose_starting_xi(&per_player_ep, &positions);

    let ep_total_current = per_player_ep.total(&current_start);
    let ep_total_optimal = per_player_ep.total(&optimal_start);
    let bench_ep_total = per_player_ep.total(&optimal_bench);

    let (captain, vice_captain) =
        recommend_captain_from_ids(&optimal_start, &per_player_ep, input.ownership, &positions, input.mode);
    let chip_eval = ChipEval {
        bench_boost_gain: bench_ep_total,
        triple_captain_gain: per_player_ep.get(captain),
    };

    let data = PlanData {
        formation_current: formation_str(&current_start, &positions),
        formation_optimal: formation_str(&optimal_start, &positions),
        current_start,
        current_bench,
        optimal_start,
        optimal_bench,
        captain,
        vice_captain,
        ep_total_current,
        ep_total_optimal,
        ep_gain_lineup: ep_total_optimal - ep_total_current,
        bench_ep_total,
        chip_eval,
        per_player_ep,
    };

    let swaps = choose_swaps(&data, &positions);
    debug!(gw = input.gw, swaps = swaps.len(), captain, "lineup planned");

    let current_captain = input.picks.iter().find(|p| p.is_captain).map(|p| p.element);
    let current_vice = input.picks.iter().find(|p| p.is_vice_captain).map(|p| p.element);

    let builder = ActionBuilder {
        snapshot,
        data: &data,
        by_team: &by_team,
        gw: input.gw,
        mode: input.mode,
    };
    let mut actions: Vec<Action> = swaps
        .iter()
        .enumerate()
        .map(|(k, swap)| builder.swap(swap, SWAP_PRIORITY_BASE + k as u32))
        .collect();
    if let Some(action) = builder.captain(current_captain) {
        actions.push(action);
    }
    if let Some(action) = builder.vice(current_vice) {
        actions.push(action);
    }
    let chip = builder.chip();
    actions.push(chip);

    let summary = short_summary(snapshot, &data, &swaps, &actions, input.mode);
    let summary_long = long_summary(snapshot, &data, &swaps, &actions, input.mode, current_captain);

    verify_plan(&data, &actions, &positions)?;

    Ok(Plan {
        data,
        actions,
        summary,
        summary_long,
    })
}

/// Split picks into starters and bench by multiplier. A lineup that starts
/// more than one goalkeeper keeps the best one, benches the rest and promotes
/// the best bench outfielders until eleven start again.
fn current_lineup(picks: &[Pick], ep: &EpTable, positions: &PositionMap) -> (Vec<PlayerId>, Vec<PlayerId>) {
    let mut start: Vec<PlayerId> = picks.iter().filter(|p| p.is_starting()).map(|p| p.element).collect();
    let mut bench: Vec<PlayerId> = picks.iter().filter(|p| !p.is_starting()).map(|p| p.element).collect();

    let is_gk = |id: &PlayerId| positions.get(id) == Some(&Position::Goalkeeper);
    let mut keepers: Vec<PlayerId> = start.iter().copied().filter(is_gk).collect();
    if keepers.len() <= 1 {
        return (start, bench);
    }

    keepers.sort_by(|&a, &b| ep.get(b).partial_cmp(&ep.get(a)).unwrap_or(Ordering::Equal));
    warn!(keepers = ?keepers, "current lineup starts more than one goalkeeper, repairing");
    for &gk in &keepers[1..] {
        start.retain(|&id| id != gk);
        bench.push(gk);
    }

    let mut outfield: Vec<PlayerId> = bench.iter().copied().filter(|id| !is_gk(id)).collect();
    outfield.sort_by(|&a, &b| ep.get(b).partial_cmp(&ep.get(a)).unwrap_or(Ordering::Equal));
    for id in outfield {
        if start.len() >= STARTING_XI {
            break;
        }
        start.push(id);
        bench.retain(|&b| b != id);
    }

    (start, bench)
}

#[derive(Debug, Clone, Copy)]
struct Swap {
    incoming: PlayerId,
    outgoing: PlayerId,
    delta: f64,
}

/// Greedy swap selection over every (optimal-only, current-only) pair, best
/// gain first. Pairs worth at least the minimum gain go first; the remaining
/// pairs follow in the same order until the trial lineup reaches the optimal
/// XI. A pair is accepted while both players are unused and the trial lineup
/// stays legal.
fn choose_swaps(data: &PlanData, positions: &PositionMap) -> Vec<Swap> {
    let ep = &data.per_player_ep;
    let start_in: Vec<PlayerId> = data
        .optimal_start
        .iter()
        .copied()
        .filter(|id| !data.current_start.contains(id))
        .collect();
    let bench_out: Vec<PlayerId> = data
        .current_start
        .iter()
        .copied()
        .filter(|id| !data.optimal_start.contains(id))
        .collect();

    let mut pairs: Vec<Swap> = Vec::new();
    for &incoming in &start_in {
        for &outgoing in &bench_out {
            let delta = ep.get(incoming) - ep.get(outgoing);
            pairs.push(Swap { incoming, outgoing, delta });
        }
    }
    pairs.sort_by(|a, b| b.delta.partial_cmp(&a.delta).unwrap_or(Ordering::Equal));

    let mut state = SwapState::new(&data.current_start, positions);
    // EPΔ values are already rounded; compare on the same grid.
    let preferred: Vec<Swap> = pairs
        .iter()
        .copied()
        .filter(|p| round2(p.delta) >= SWAP_MIN_GAIN)
        .collect();
    state.accept_pass(&preferred);

    // Any lineup state between two legal XIs admits a legal swap towards the
    // target, so each pass accepts at least one pair until it is reached.
    while state.chosen.len() < start_in.len().min(bench_out.len()) {
        if state.accept_pass(&pairs) == 0 {
            warn!(remaining = start_in.len() - state.chosen.len(), "no legal follow-on swap");
            break;
        }
    }
    state.chosen
}

struct SwapState<'a> {
    positions: &'a PositionMap,
    trial: Vec<PlayerId>,
    used_in: HashSet<PlayerId>,
    used_out: HashSet<PlayerId>,
    chosen: Vec<Swap>,
}

impl<'a> SwapState<'a> {
    fn new(current_start: &[PlayerId], positions: &'a PositionMap) -> Self {
        SwapState {
            positions,
            trial: current_start.to_vec(),
            used_in: HashSet::new(),
            used_out: HashSet::new(),
            chosen: Vec::new(),
        }
    }

    /// One greedy pass; returns how many pairs were accepted.
    fn accept_pass(&mut self, pairs: &[Swap]) -> usize {
        let before = self.chosen.len();
        for &pair in pairs {
            if self.used_in.contains(&pair.incoming) || self.used_out.contains(&pair.outgoing) {
                continue;
            }
            let mut next: Vec<PlayerId> = self.trial.iter().copied().filter(|&id| id != pair.outgoing).collect();
            next.push(pair.incoming);
            if is_legal_start(&next, self.positions) {
                self.used_in.insert(pair.incoming);
                self.used_out.insert(pair.outgoing);
                self.trial = next;
                self.chosen.push(pair);
            }
        }
        self.chosen.len() - before
    }
}

/// Fixtures of the player's team this gameweek; empty for blanks and unknown
/// players.
fn team_fixtures<'a>(
    snapshot: &Snapshot,
    by_team: &'a HashMap<TeamId, Vec<TeamFixture>>,
    id: PlayerId,
) -> &'a [TeamFixture] {
    snapshot
        .player(id)
        .and_then(|p| by_team.get(&p.team))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

struct ActionBuilder<'a> {
    snapshot: &'a Snapshot,
    data: &'a PlanData,
    by_team: &'a HashMap<TeamId, Vec<TeamFixture>>,
    gw: u32,
    mode: CaptainMode,
}

impl ActionBuilder<'_> {
    fn first_fixture(&self, id: PlayerId) -> Option<TeamFixture> {
        team_fixtures(self.snapshot, self.by_team, id).first().copied()
    }

    fn swap(&self, swap: &Swap, priority: u32) -> Action {
        let ep = &self.data.per_player_ep;
        let ep_in = round2(ep.get(swap.incoming));
        let ep_out = round2(ep.get(swap.outgoing));
        let in_fx = self.first_fixture(swap.incoming);
        let in_form = self.snapshot.player(swap.incoming).map(|p| p.form).unwrap_or(0.0);

        Action::Swap(SwapAction {
            action_group: ActionGroup::Lineup,
            priority,
            bundle_id: format!("lineup-{}-1", self.gw),
            in_player: swap.incoming,
            out_player: swap.outgoing,
            ep_in,
            ep_out,
            delta_ep: round2(swap.delta),
            reason_code: ReasonCode::HigherEp,
            factors: SwapFactors {
                home: in_fx.map(|f| f.was_home),
                opp_strength: in_fx.map(|f| f.opponent_strength),
                form: (in_form * 10.0).round() / 10.0,
            },
            reason: format!("EP_diff {ep_out:.2} -> {ep_in:.2}; form {in_form:.1}"),
            in_fixture: CompactFixture::from(in_fx),
            out_fixture: CompactFixture::from(self.first_fixture(swap.outgoing)),
        })
    }

    fn captain(&self, current: Option<PlayerId>) -> Option<Action> {
        let captain = self.data.captain;
        if captain == 0 || current == Some(captain) {
            return None;
        }
        let ep = &self.data.per_player_ep;
        let old_ep = current.map(|id| ep.get(id));
        Some(Action::SetCaptain(CaptainAction {
            action_group: ActionGroup::Captaincy,
            priority: CAPTAIN_PRIORITY,
            player: captain,
            old_player: current,
            reason_code: ReasonCode::HighestCaptainScore,
            reason: format!("Highest captain score in mode={}", self.mode),
            ep_new: round2(ep.get(captain)),
            ep_old: old_ep.map(round2),
            delta_ep: round2(ep.get(captain) - old_ep.unwrap_or(0.0)),
            captain_mode: self.mode,
        }))
    }

    fn vice(&self, current: Option<PlayerId>) -> Option<Action> {
        let vice = self.data.vice_captain;
        if vice == 0 || current == Some(vice) {
            return None;
        }
        Some(Action::SetVice(ViceAction {
            action_group: ActionGroup::Captaincy,
            priority: VICE_PRIORITY,
            player: vice,
            old_player: current,
            reason_code: ReasonCode::SecondBestCaptain,
            reason: "Second-best captain".to_string(),
        }))
    }

    fn chip(&self) -> Action {
        let eval = self.data.chip_eval;
        let (chip, reason_code) = choose_chip(eval);
        Action::Chip(ChipAction {
            action_group: ActionGroup::Chip,
            priority: CHIP_PRIORITY,
            chip,
            reason_code,
            reason: "Chip evaluation".to_string(),
            details: ChipDetails {
                bench_boost_gain: round2(eval.bench_boost_gain),
                triple_captain_gain: round2(eval.triple_captain_gain),
                bench_boost_threshold: BENCH_BOOST_THRESHOLD,
                triple_captain_threshold: TRIPLE_CAPTAIN_THRESHOLD,
            },
        })
    }
}

/// Bench boost when the bench is worth at least 12, otherwise triple captain
/// when the captain is worth at least 4, otherwise no chip.
pub fn choose_chip(eval: ChipEval) -> (Chip, ReasonCode) {
    if eval.bench_boost_gain >= BENCH_BOOST_THRESHOLD {
        (Chip::BenchBoost, ReasonCode::BenchBoostValue)
    } else if eval.triple_captain_gain >= TRIPLE_CAPTAIN_THRESHOLD {
        (Chip::TripleCaptain, ReasonCode::TripleCaptainValue)
    } else {
        (Chip::NoChip, ReasonCode::BelowThreshold)
    }
}

fn chosen_chip(actions: &[Action]) -> Chip {
    actions
        .iter()
        .find_map(|a| match a {
            Action::Chip(c) => Some(c.chip),
            _ => None,
        })
        .unwrap_or(Chip::NoChip)
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

fn short_summary(snapshot: &Snapshot, data: &PlanData, swaps: &[Swap], actions: &[Action], mode: CaptainMode) -> String {
    let incoming: Vec<String> = swaps.iter().map(|s| snapshot.display_name(s.incoming)).collect();
    let outgoing: Vec<String> = swaps.iter().map(|s| snapshot.display_name(s.outgoing)).collect();

    let mut parts: Vec<String> = Vec::new();
    match (incoming.is_empty(), outgoing.is_empty()) {
        (false, false) => parts.push(format!("Start {} and bench {}", incoming.join(", "), outgoing.join(", "))),
        (false, true) => parts.push(format!("Start {}", incoming.join(", "))),
        (true, false) => parts.push(format!("Bench {}", outgoing.join(", "))),
        (true, true) => {}
    }
    if data.captain != 0 {
        parts.push(format!("Captain {} ({mode})", snapshot.display_name(data.captain)));
    }
    parts.push(format!("Chip: {}", chosen_chip(actions).label()));
    format!("{}.", parts.join(". "))
}

fn long_summary(
    snapshot: &Snapshot,
    data: &PlanData,
    swaps: &[Swap],
    actions: &[Action],
    mode: CaptainMode,
    current_captain: Option<PlayerId>,
) -> String {
    let mut sentences: Vec<String> = swaps
        .iter()
        .map(|s| {
            format!(
                "Start {} for {} (+{:.2} EP).",
                snapshot.display_name(s.incoming),
                snapshot.display_name(s.outgoing),
                round2(s.delta)
            )
        })
        .collect();

    for action in actions {
        if let Action::SetCaptain(a) = action {
            let old = current_captain
                .map(|id| snapshot.display_name(id))
                .unwrap_or_else(|| "none".to_string());
            sentences.push(format!(
                "Captain {} over {} ({:+.2} EP) in {mode} mode.",
                snapshot.display_name(a.player),
                old,
                a.delta_ep
            ));
        }
    }

    let bench_gain = round2(data.chip_eval.bench_boost_gain);
    let captain_gain = round2(data.chip_eval.triple_captain_gain);
    sentences.push(match chosen_chip(actions) {
        Chip::NoChip => format!("No chip - bench adds +{bench_gain:.2} EP below {BENCH_BOOST_THRESHOLD:.0}."),
        Chip::BenchBoost => format!("Chip BB: bench adds +{bench_gain:.2} EP (>= {BENCH_BOOST_THRESHOLD:.0})."),
        Chip::TripleCaptain => {
            format!("Chip TC: captain extra +{captain_gain:.2} EP (>= {TRIPLE_CAPTAIN_THRESHOLD:.0}).")
        }
    });
    sentences.join(" ")
}

// ---------------------------------------------------------------------------
// Consistency check
// ---------------------------------------------------------------------------

/// Replay the swap actions in (bundle, priority) order against the current
/// lineup. Every swap must bring a bench player in for a starter, the lineup
/// must stay at eleven, the result must be the optimal XI and the optimal
/// formation string must match the optimal XI.
pub fn verify_plan(data: &PlanData, actions: &[Action], positions: &PositionMap) -> Result<(), PlanError> {
    let mut start: HashSet<PlayerId> = data.current_start.iter().copied().collect();
    let mut bench: HashSet<PlayerId> = data.current_bench.iter().copied().collect();

    let mut swaps: Vec<&SwapAction> = actions
        .iter()
        .filter_map(|a| match a {
            Action::Swap(s) => Some(s),
            _ => None,
        })
        .collect();
    swaps.sort_by(|a, b| (a.bundle_id.as_str(), a.priority).cmp(&(b.bundle_id.as_str(), b.priority)));

    for swap in swaps {
        if !bench.contains(&swap.in_player) || !start.contains(&swap.out_player) {
            return Err(PlanError::InvalidSwapOrder {
                in_player: swap.in_player,
                out_player: swap.out_player,
            });
        }
        start.remove(&swap.out_player);
        start.insert(swap.in_player);
        bench.remove(&swap.in_player);
        bench.insert(swap.out_player);
        if start.len() != STARTING_XI {
            return Err(PlanError::StarterCount);
        }
    }

    let optimal: HashSet<PlayerId> = data.optimal_start.iter().copied().collect();
    if start != optimal || optimal.len() != data.optimal_start.len() {
        return Err(PlanError::SwapMismatch);
    }
    if formation_str(&data.optimal_start, positions) != data.formation_optimal {
        return Err(PlanError::FormationMismatch);
    }
    Ok(())
}

/// Position map for every pick, as the planner sees it.
pub fn pick_positions(picks: &[Pick], snapshot: &Snapshot) -> PositionMap {
    picks
        .iter()
        .map(|p| (p.element, snapshot.position_of(p.element)))
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

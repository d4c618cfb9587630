// Manager analysis: squad composition, captain ranking and per-pick EPΔ.

use serde::Serialize;
use std::cmp::Ordering;

use crate::domain::{OwnershipIndex, Pick, PlayerId, TeamId};
use crate::fixtures::LinkedPick;
use crate::scoring::{captain_score, expected_points_delta, recent_minutes_proxy, CaptainMode};

/// Ownership percentage at or above which a pick counts as template.
pub const DEFAULT_TEMPLATE_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemplateSplit {
    pub template_count: usize,
    pub differential_count: usize,
    pub template_ratio: f64,
}

/// Count picks owned by at least `threshold` percent of managers.
pub fn template_vs_differential(picks: &[Pick], ownership: &OwnershipIndex, threshold: f64) -> TemplateSplit {
    let template_count = picks
        .iter()
        .filter(|p| ownership.get(&p.element).copied().unwrap_or(0.0) >= threshold)
        .count();
    let differential_count = picks.len() - template_count;
    let template_ratio = if picks.is_empty() {
        0.0
    } else {
        template_count as f64 / picks.len() as f64
    };

    TemplateSplit {
        template_count,
        differential_count,
        template_ratio,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaptainCandidate {
    pub element: PlayerId,
    pub score: f64,
}

/// Captain scores for every starter with a known player, in pick order.
fn score_starters(linked: &[LinkedPick<'_>], ownership: &OwnershipIndex, mode: CaptainMode) -> Vec<CaptainCandidate> {
    linked
        .iter()
        .filter(|row| row.pick.is_starting())
        .filter_map(|row| {
            let player = row.player?;
            let own = ownership.get(&player.id).copied().unwrap_or(0.0);
            Some(CaptainCandidate {
                element: row.element(),
                score: captain_score(player, row.fixture.as_ref(), own, mode),
            })
        })
        .collect()
}

/// The `limit` best captain candidates among the starters, best first. Ties
/// keep pick order.
pub fn rank_captain_candidates(
    linked: &[LinkedPick<'_>],
    ownership: &OwnershipIndex,
    mode: CaptainMode,
    limit: usize,
) -> Vec<CaptainCandidate> {
    let mut candidates = score_starters(linked, ownership, mode);
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates.truncate(limit);
    candidates
}

/// Best captain by raw captain score. Only positive scores qualify; with none
/// the result is element 0 with score 0.
pub fn recommend_captain(linked: &[LinkedPick<'_>], ownership: &OwnershipIndex, mode: CaptainMode) -> CaptainCandidate {
    score_starters(linked, ownership, mode).into_iter().fold(
        CaptainCandidate {
            element: 0,
            score: 0.0,
        },
        |best, c| if c.score > best.score { c } else { best },
    )
}

/// EPΔ of one pick against its linked opponent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpDeltaRow {
    pub element: PlayerId,
    pub epdelta: f64,
    pub opponent_team: Option<TeamId>,
    pub opponent_strength: Option<u8>,
    pub was_home: bool,
}

/// One row per pick with a known player, bench included. Blank gameweeks
/// and unknown opponents are scored at neutral strength.
pub fn epdelta_rows(linked: &[LinkedPick<'_>]) -> Vec<EpDeltaRow> {
    linked
        .iter()
        .filter_map(|row| {
            let player = row.player?;
            let fixture = row.fixture.unwrap_or_default();
            Some(EpDeltaRow {
                element: row.element(),
                epdelta: expected_points_delta(player, fixture.strength_or_neutral(), recent_minutes_proxy(player)),
                opponent_team: fixture.opponent_team_id,
                opponent_strength: fixture.opponent_strength,
                was_home: fixture.was_home,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

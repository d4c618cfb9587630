// Scoring primitives: expected-points delta (EPΔ), captain score and
// double-gameweek aggregation.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::domain::{Player, PlayerId, DEFAULT_TEAM_STRENGTH};
use crate::fixtures::{FixtureContext, TeamFixture};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const FORM_RANGE: (f64, f64) = (0.0, 10.0);
const ICT_RANGE: (f64, f64) = (0.0, 20.0);
const FORM_WEIGHT: f64 = 0.6;
const ICT_WEIGHT: f64 = 0.4;

/// Minutes over the last two gameweeks at which the sustainability factor is 0.5.
const MINUTES_PIVOT: f64 = 120.0;
const MINUTES_SCALE: f64 = 60.0;

/// Cap on cumulative minutes used as a stand-in for recent minutes.
pub const RECENT_MINUTES_CAP: f64 = 180.0;

const EP_SCALE: f64 = 6.0;

/// Strength bounds mapped onto [0, 1]: strength 5 (weakest) scores highest.
const OPPONENT_EASIEST: f64 = 5.0;
const OPPONENT_HARDEST: f64 = 1.0;

const SIGMOID_SATURATION: f64 = 50.0;

const SAFE_OWNERSHIP_WEIGHT: f64 = 0.15;
const AGGRESSIVE_OWNERSHIP_WEIGHT: f64 = 0.10;
const HOME_BONUS: f64 = 0.05;

/// Multiplier applied to the summed EPΔ of a team playing twice in a gameweek.
pub const DOUBLE_GAMEWEEK_BONUS: f64 = 1.1;

// ---------------------------------------------------------------------------
// Captain mode
// ---------------------------------------------------------------------------

/// Captaincy preference: back the template (`Safe`) or chase differentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptainMode {
    #[default]
    Safe,
    Aggressive,
}

impl CaptainMode {
    pub fn from_str_mode(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Some(CaptainMode::Safe),
            "aggressive" => Some(CaptainMode::Aggressive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptainMode::Safe => "safe",
            CaptainMode::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for CaptainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Math helpers
// ---------------------------------------------------------------------------

/// Logistic function, saturating to exactly 0 or 1 beyond ±50.
pub fn sigmoid(x: f64) -> f64 {
    if x >= SIGMOID_SATURATION {
        return 1.0;
    }
    if x <= -SIGMOID_SATURATION {
        return 0.0;
    }
    1.0 / (1.0 + (-x).exp())
}

/// Linear map of `x` onto [0, 1] over the range spanned by `lo` and `hi`,
/// clamped. The bounds may be given in either order; a degenerate range is 0.
pub fn normalize(x: f64, lo: f64, hi: f64) -> f64 {
    if hi == lo {
        return 0.0;
    }
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Minutes proxy used when per-gameweek minutes are not available.
pub fn recent_minutes_proxy(player: &Player) -> f64 {
    (player.minutes as f64).min(RECENT_MINUTES_CAP)
}

// ---------------------------------------------------------------------------
// EPΔ
// ---------------------------------------------------------------------------

/// Expected points delta for a player against an opponent of the given
/// strength: `6 * (0.6*form_n + 0.4*ict_n) * sigmoid((min-120)/60) * d`.
pub fn expected_points_delta(player: &Player, opponent_strength: u8, recent_minutes: f64) -> f64 {
    let form_n = normalize(player.form, FORM_RANGE.0, FORM_RANGE.1);
    let ict_n = normalize(player.ict_index, ICT_RANGE.0, ICT_RANGE.1);
    let mix = FORM_WEIGHT * form_n + ICT_WEIGHT * ict_n;

    let minutes_factor = sigmoid((recent_minutes - MINUTES_PIVOT) / MINUTES_SCALE);
    let difficulty = normalize(opponent_strength as f64, OPPONENT_EASIEST, OPPONENT_HARDEST);

    EP_SCALE * mix * minutes_factor * difficulty
}

/// Captaincy score: EPΔ for the linked fixture, adjusted for ownership
/// (rewarded in safe mode, penalised in aggressive mode) and home advantage.
pub fn captain_score(
    player: &Player,
    fixture: Option<&FixtureContext>,
    ownership_pct: f64,
    mode: CaptainMode,
) -> f64 {
    let strength = fixture
        .map(FixtureContext::strength_or_neutral)
        .unwrap_or(DEFAULT_TEAM_STRENGTH);
    let base = expected_points_delta(player, strength, recent_minutes_proxy(player));

    let adjustment = match mode {
        CaptainMode::Safe => SAFE_OWNERSHIP_WEIGHT * ownership_pct,
        CaptainMode::Aggressive => -AGGRESSIVE_OWNERSHIP_WEIGHT * ownership_pct,
    };
    let home_bonus = if fixture.is_some_and(|f| f.was_home) {
        HOME_BONUS
    } else {
        0.0
    };

    base * (1.0 + adjustment + home_bonus)
}

/// Sum of EPΔ over every fixture a player's team has in the gameweek, with
/// the double-gameweek bonus when there is more than one.
pub fn aggregate_ep_for_fixtures(player: &Player, fixtures: &[TeamFixture]) -> f64 {
    let minutes = recent_minutes_proxy(player);
    let total: f64 = fixtures
        .iter()
        .map(|f| expected_points_delta(player, f.opponent_strength, minutes))
        .sum();
    if fixtures.len() > 1 {
        total * DOUBLE_GAMEWEEK_BONUS
    } else {
        total
    }
}

// ---------------------------------------------------------------------------
// EpTable
// ---------------------------------------------------------------------------

/// Per-player EPΔ keyed by player id, kept in squad insertion order so that
/// ties resolve to the first player encountered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpTable {
    entries: Vec<(PlayerId, f64)>,
}

impl EpTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. A replaced entry keeps its original slot.
    pub fn insert(&mut self, id: PlayerId, ep: f64) {
        match self.entries.iter_mut().find(|(pid, _)| *pid == id) {
            Some(entry) => entry.1 = ep,
            None => self.entries.push((id, ep)),
        }
    }

    /// EPΔ for a player, 0 when absent.
    pub fn get(&self, id: PlayerId) -> f64 {
        self.entries
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, ep)| *ep)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.entries.iter().any(|(pid, _)| *pid == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Sum of EPΔ for the given ids.
    pub fn total(&self, ids: &[PlayerId]) -> f64 {
        ids.iter().map(|&id| self.get(id)).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(PlayerId, f64)> for EpTable {
    fn from_iter<I: IntoIterator<Item = (PlayerId, f64)>>(iter: I) -> Self {
        let mut table = EpTable::new();
        for (id, ep) in iter {
            table.insert(id, ep);
        }
        table
    }
}

impl Serialize for EpTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, ep) in &self.entries {
            map.serialize_entry(id, ep)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn player(form: f64, ict: f64, minutes: u32) -> Player {
        Player {
            id: 1,
            web_name: Some("Test".into()),
            team: 1,
            element_type: 3,
            position: Position::Midfielder,
            now_cost: 60,
            form,
            ict_index: ict,
            minutes,
            selected_by_percent: 10.0,
        }
    }

    #[test]
    fn worked_epdelta_example() {
        let p = player(2.7, 4.0, 270);
        let ep = expected_points_delta(&p, 3, 180.0);
        assert!(approx_eq(ep, 0.5307485280853836, 1e-12), "got {ep}");
    }

    #[test]
    fn epdelta_is_monotonic_in_form_ict_and_strength() {
        let base = expected_points_delta(&player(2.0, 4.0, 270), 3, 180.0);
        assert!(expected_points_delta(&player(3.0, 4.0, 270), 3, 180.0) > base);
        assert!(expected_points_delta(&player(2.0, 6.0, 270), 3, 180.0) > base);
        assert!(expected_points_delta(&player(2.0, 4.0, 270), 4, 180.0) > base);
        assert!(expected_points_delta(&player(2.0, 4.0, 270), 2, 180.0) < base);
    }

    #[test]
    fn strongest_opponent_zeroes_epdelta() {
        assert_eq!(expected_points_delta(&player(8.0, 15.0, 270), 1, 180.0), 0.0);
        let easiest = expected_points_delta(&player(10.0, 20.0, 270), 5, 180.0);
        assert!(approx_eq(easiest, 6.0 * sigmoid(1.0), 1e-12));
    }

    #[test]
    fn sigmoid_saturates() {
        assert_eq!(sigmoid(50.0), 1.0);
        assert_eq!(sigmoid(-50.0), 0.0);
        assert!(approx_eq(sigmoid(0.0), 0.5, 1e-12));
    }

    #[test]
    fn normalize_handles_reversed_and_degenerate_bounds() {
        assert_eq!(normalize(5.0, 5.0, 1.0), 1.0);
        assert_eq!(normalize(1.0, 5.0, 1.0), 0.0);
        assert_eq!(normalize(3.0, 5.0, 1.0), 0.5);
        assert_eq!(normalize(4.0, 2.0, 2.0), 0.0);
        assert_eq!(normalize(25.0, 0.0, 20.0), 1.0);
        assert_eq!(normalize(-1.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn captain_score_applies_ownership_and_home_bonus() {
        let p = player(2.7, 4.0, 270);
        let base = expected_points_delta(&p, 3, 180.0);
        let home = FixtureContext {
            was_home: true,
            opponent_team_id: Some(2),
            opponent_strength: Some(3),
        };

        let safe = captain_score(&p, Some(&home), 10.0, CaptainMode::Safe);
        assert!(approx_eq(safe, base * (1.0 + 1.5 + 0.05), 1e-12));

        let aggressive = captain_score(&p, Some(&home), 10.0, CaptainMode::Aggressive);
        assert!(approx_eq(aggressive, base * (1.0 - 1.0 + 0.05), 1e-12));

        let blank = captain_score(&p, None, 0.0, CaptainMode::Safe);
        assert!(approx_eq(blank, base, 1e-12));
    }

    #[test]
    fn aggregation_sums_fixtures_with_double_gameweek_bonus() {
        let p = player(2.7, 4.0, 270);
        let single = expected_points_delta(&p, 3, 180.0);
        let one = [TeamFixture {
            was_home: true,
            opponent_team_id: 2,
            opponent_strength: 3,
        }];
        let two = [one[0], one[0]];

        assert_eq!(aggregate_ep_for_fixtures(&p, &[]), 0.0);
        assert!(approx_eq(aggregate_ep_for_fixtures(&p, &one), single, 1e-12));
        assert!(approx_eq(
            aggregate_ep_for_fixtures(&p, &two),
            2.0 * single * DOUBLE_GAMEWEEK_BONUS,
            1e-12
        ));
    }

    #[test]
    fn ep_table_keeps_insertion_order_and_serializes_as_map() {
        let mut table = EpTable::new();
        table.insert(9, 0.44);
        table.insert(1, 0.53);
        table.insert(9, 0.5);
        assert_eq!(table.ids().collect::<Vec<_>>(), vec![9, 1]);
        assert_eq!(table.get(9), 0.5);
        assert_eq!(table.get(42), 0.0);
        assert_eq!(
            serde_json::to_string(&table).unwrap(),
            r#"{"9":0.5,"1":0.53}"#
        );
    }

    #[test]
    fn captain_mode_parsing() {
        assert_eq!(CaptainMode::from_str_mode("Aggressive"), Some(CaptainMode::Aggressive));
        assert_eq!(CaptainMode::from_str_mode("bold"), None);
        assert_eq!(CaptainMode::default(), CaptainMode::Safe);
    }
}

// Transfer advisor: sequential like-for-like upgrades under budget and the
// three-per-club limit.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::domain::{PlayerId, Snapshot, TeamId, DEFAULT_TEAM_STRENGTH};
use crate::fixtures::LinkedPick;
use crate::scoring::{expected_points_delta, recent_minutes_proxy};

/// Starters considered for sale, weakest first.
const SELL_CANDIDATES: usize = 3;

/// Maximum squad members from one club.
pub const MAX_PER_TEAM: usize = 3;

/// Bank allowance, in tenths of a million, that simulates taking a -4 hit.
pub const HIT_ALLOWANCE: i64 = 4;

/// Money available for transfers, in tenths of a million.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferBudget {
    pub bank: i64,
    pub allowance: i64,
}

impl TransferBudget {
    pub fn new(bank: i64, allow_hit: bool) -> Self {
        TransferBudget {
            bank,
            allowance: if allow_hit { HIT_ALLOWANCE } else { 0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSuggestion {
    pub out: PlayerId,
    #[serde(rename = "in")]
    pub incoming: PlayerId,
    pub ep_out: f64,
    pub ep_in: f64,
    pub reason: String,
}

impl TransferSuggestion {
    pub fn gain(&self) -> f64 {
        self.ep_in - self.ep_out
    }
}

/// Suggest up to three upgrades for the weakest starters.
///
/// Starters are scored against their linked opponent, replacements at neutral
/// strength. A replacement must play the same position, be outside the squad,
/// keep its club at three players or fewer (a same-club swap is always fine),
/// fit within `bank + allowance` and have strictly higher EPΔ. Each accepted
/// transfer updates the squad, club counts and bank seen by the next one.
pub fn suggest_transfers(
    linked: &[LinkedPick<'_>],
    snapshot: &Snapshot,
    budget: TransferBudget,
) -> Vec<TransferSuggestion> {
    let mut squad: HashSet<PlayerId> = linked.iter().map(|row| row.element()).collect();
    let team_of = |id: PlayerId| snapshot.player(id).map(|p| p.team).unwrap_or(0);

    let mut team_counts: HashMap<TeamId, usize> = HashMap::new();
    for &id in &squad {
        *team_counts.entry(team_of(id)).or_default() += 1;
    }

    let mut starters: Vec<(PlayerId, f64)> = linked
        .iter()
        .filter(|row| row.pick.is_starting())
        .filter_map(|row| {
            let player = row.player?;
            let strength = row
                .fixture
                .map(|f| f.strength_or_neutral())
                .unwrap_or(DEFAULT_TEAM_STRENGTH);
            let ep = expected_points_delta(player, strength, recent_minutes_proxy(player));
            Some((player.id, ep))
        })
        .collect();
    starters.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let candidate_scores: Vec<(PlayerId, f64)> = snapshot
        .players()
        .iter()
        .filter(|p| !squad.contains(&p.id))
        .map(|p| (p.id, expected_points_delta(p, DEFAULT_TEAM_STRENGTH, recent_minutes_proxy(p))))
        .collect();

    let mut bank = budget.bank;
    let mut suggestions = Vec::new();

    for &(out_id, ep_out) in starters.iter().take(SELL_CANDIDATES) {
        let Some(out_player) = snapshot.player(out_id) else {
            continue;
        };

        let mut best: Option<(PlayerId, f64)> = None;
        for &(in_id, ep_in) in &candidate_scores {
            if squad.contains(&in_id) || ep_in <= ep_out {
                continue;
            }
            let Some(in_player) = snapshot.player(in_id) else {
                continue;
            };
            if in_player.position != out_player.position {
                continue;
            }
            let club_count = team_counts.get(&in_player.team).copied().unwrap_or(0);
            if in_player.team != out_player.team && club_count >= MAX_PER_TEAM {
                continue;
            }
            let cost_delta = in_player.now_cost as i64 - out_player.now_cost as i64;
            if cost_delta > bank + budget.allowance {
                continue;
            }
            if best.map_or(true, |(_, top)| ep_in > top) {
                best = Some((in_id, ep_in));
            }
        }

        let Some((in_id, ep_in)) = best else {
            debug!(out = out_id, "no legal upgrade");
            continue;
        };
        let Some(in_player) = snapshot.player(in_id) else {
            continue;
        };

        suggestions.push(TransferSuggestion {
            out: out_id,
            incoming: in_id,
            ep_out,
            ep_in,
            reason: format!(
                "Upgrade EPΔ {:.2} -> {:.2}; in-form {:.1}",
                ep_out, ep_in, in_player.form
            ),
        });

        squad.remove(&out_id);
        squad.insert(in_id);
        if let Some(n) = team_counts.get_mut(&out_player.team) {
            *n = n.saturating_sub(1);
        }
        *team_counts.entry(in_player.team).or_default() += 1;
        bank -= in_player.now_cost as i64 - out_player.now_cost as i64;
    }

    suggestions
}

/// Drop suggestions whose gain is below `min_gain` and repeat suggestions of
/// the same incoming player, keeping the first.
pub fn filter_suggestions(suggestions: &[TransferSuggestion], min_gain: f64) -> Vec<TransferSuggestion> {
    let mut seen_in = HashSet::new();
    suggestions
        .iter()
        .filter(|s| s.gain() >= min_gain)
        .filter(|s| seen_in.insert(s.incoming))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BootstrapPayload, Fixture, Pick};
    use crate::fixtures::link_fixtures_for_manager;
    use serde_json::json;

    fn element(id: u32, team: u32, et: u32, cost: u32, form: &str, ict: &str) -> serde_json::Value {
        json!({
            "id": id, "web_name": format!("P{id}"), "team": team, "element_type": et,
            "now_cost": cost, "form": form, "ict_index": ict, "minutes": 270,
            "selected_by_percent": "5.0"
        })
    }

    /// Squad of three starting defenders (ids 1-3) on teams 1-3, plus a pool
    /// of defenders to buy.
    fn snapshot(pool: Vec<serde_json::Value>) -> Snapshot {
        let mut elements = vec![
            element(1, 1, 2, 45, "0.5", "1.0"),
            element(2, 2, 2, 45, "1.0", "2.0"),
            element(3, 3, 2, 45, "1.5", "3.0"),
        ];
        elements.extend(pool);
        let payload: BootstrapPayload = serde_json::from_value(json!({
            "elements": elements,
            "teams": [
                {"id": 1, "name": "A", "strength": 3},
                {"id": 2, "name": "B", "strength": 3},
                {"id": 3, "name": "C", "strength": 3},
                {"id": 4, "name": "D", "strength": 3}
            ]
        }))
        .unwrap();
        Snapshot::from_bootstrap(&payload)
    }

    fn picks() -> Vec<Pick> {
        (1..=3)
            .map(|element| Pick { element, is_captain: false, is_vice_captain: false, multiplier: 1 })
            .collect()
    }

    fn fixtures() -> Vec<Fixture> {
        vec![Fixture { id: 1, event: Some(4), team_h: 1, team_a: 2 }]
    }

    #[test]
    fn budget_rule_with_and_without_hit() {
        // Costs 5 more than any squad defender: needs bank + allowance >= 5.
        let snap = snapshot(vec![element(20, 4, 2, 50, "6.0", "10.0")]);
        let picks = picks();
        let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

        assert!(suggest_transfers(&linked, &snap, TransferBudget::new(0, false)).is_empty());
        assert!(suggest_transfers(&linked, &snap, TransferBudget::new(1, true)).len() == 1);
        assert!(suggest_transfers(&linked, &snap, TransferBudget::new(0, true)).is_empty());
    }

    #[test]
    fn hit_allowance_covers_an_exact_four_tenths() {
        // Costs exactly 4 more than every squad defender, with an empty bank.
        let snap = snapshot(vec![element(20, 4, 2, 49, "6.0", "10.0")]);
        let picks = picks();
        let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

        assert!(suggest_transfers(&linked, &snap, TransferBudget::new(0, false)).is_empty());
        let with_hit = suggest_transfers(&linked, &snap, TransferBudget::new(0, true));
        assert_eq!(with_hit.len(), 1);
        assert_eq!(with_hit[0].incoming, 20);
    }

    #[test]
    fn accepted_transfers_consume_bank_and_squad() {
        let snap = snapshot(vec![
            element(20, 4, 2, 45, "6.0", "10.0"),
            element(21, 4, 2, 47, "5.0", "9.0"),
        ]);
        let picks = picks();
        let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

        let out = suggest_transfers(&linked, &snap, TransferBudget::new(2, false));
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].out, out[0].incoming), (1, 20));
        // Player 20 is now in the squad, so the next slot takes 21 and spends the bank.
        assert_eq!(out[1].incoming, 21);
        assert!(out[0].reason.starts_with("Upgrade EPΔ"));
        assert!(out[0].reason.ends_with("in-form 6.0"));
    }

    #[test]
    fn team_cap_blocks_a_fourth_player() {
        let mut pool = vec![element(20, 1, 2, 40, "9.0", "15.0")];
        // Two extra squad members on team 1 bring the club to three.
        pool.push(element(30, 1, 3, 50, "0.0", "0.0"));
        pool.push(element(31, 1, 3, 50, "0.0", "0.0"));
        let snap = snapshot(pool);
        let mut picks = picks();
        picks.push(Pick { element: 30, is_captain: false, is_vice_captain: false, multiplier: 0 });
        picks.push(Pick { element: 31, is_captain: false, is_vice_captain: false, multiplier: 0 });
        let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

        let out = suggest_transfers(&linked, &snap, TransferBudget::new(100, false));
        // Only the team-1 defender (same club) may swap for player 20.
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].out, out[0].incoming), (1, 20));
    }

    #[test]
    fn filter_applies_min_gain_and_dedups_incoming() {
        let s = |out, incoming, ep_out, ep_in| TransferSuggestion {
            out,
            incoming,
            ep_out,
            ep_in,
            reason: String::new(),
        };
        let filtered = filter_suggestions(
            &[s(1, 20, 0.1, 1.0), s(2, 20, 0.1, 2.0), s(3, 21, 1.0, 1.3)],
            0.5,
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].out, 1);
    }
}

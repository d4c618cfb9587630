// Integration tests for the planning engine over a realistic 15-man squad.

use fpl_core::analysis::{
    rank_captain_candidates, recommend_captain, template_vs_differential, DEFAULT_TEMPLATE_THRESHOLD,
};
use fpl_core::domain::{BootstrapPayload, Fixture, Pick, PlayerId, Snapshot};
use fpl_core::fixtures::{fixtures_for_gameweek, link_fixtures_for_manager};
use fpl_core::planner::{
    pick_positions, plan_gameweek, verify_plan, Action, Chip, PlanError, PlanInput, ReasonCode,
};
use fpl_core::scoring::{expected_points_delta, recent_minutes_proxy, round2, CaptainMode};
use fpl_core::selector::is_legal_start;
use fpl_core::transfers::{filter_suggestions, suggest_transfers, TransferBudget};
use serde_json::{json, Value};

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

type Row = (u32, &'static str, u32, u32, u32, &'static str, &'static str, u32, &'static str);

const SQUAD: [Row; 15] = [
    (1, "Dbravka", 1, 1, 45, "2.7", "4.0", 270, "10.0"),
    (12, "Snchez", 2, 1, 45, "0.1", "1.0", 90, "6.0"),
    (191, "Esteve", 2, 2, 40, "2.7", "5.0", 270, "1.0"),
    (506, "Murillo", 3, 2, 40, "0.1", "1.0", 90, "2.0"),
    (4, "DEF4", 1, 2, 45, "1.0", "3.0", 270, "5.0"),
    (5, "DEF5", 1, 2, 45, "1.0", "3.0", 270, "5.0"),
    (6, "DEF6", 1, 2, 45, "1.0", "3.0", 270, "5.0"),
    (7, "B Fernandes", 3, 3, 95, "3.0", "9.0", 270, "20.0"),
    (8, "MID2", 2, 3, 60, "2.0", "4.0", 270, "12.0"),
    (9, "MID3", 1, 3, 60, "2.0", "4.0", 270, "12.0"),
    (10, "MID4", 1, 3, 60, "2.0", "4.0", 270, "12.0"),
    (11, "MID5", 1, 3, 60, "2.0", "4.0", 270, "12.0"),
    (13, "FWD1", 2, 4, 70, "2.2", "5.0", 270, "5.0"),
    (14, "FWD2", 3, 4, 70, "1.9", "4.0", 270, "4.0"),
    (15, "FWD3", 4, 4, 70, "1.7", "3.0", 270, "3.0"),
];

const MARKET: [Row; 3] = [
    (16, "Haaland", 4, 4, 74, "8.0", "12.0", 270, "45.0"),
    (17, "Gabriel", 4, 2, 40, "5.0", "8.0", 270, "25.0"),
    (18, "Palmer", 2, 3, 60, "6.0", "10.0", 270, "30.0"),
];

const STARTERS: [PlayerId; 11] = [1, 191, 506, 4, 5, 7, 8, 9, 10, 13, 14];
const BENCH: [PlayerId; 4] = [12, 6, 11, 15];

fn element(row: &Row) -> Value {
    let (id, name, team, et, cost, form, ict, minutes, own) = *row;
    json!({
        "id": id, "web_name": name, "team": team, "element_type": et, "now_cost": cost,
        "form": form, "ict_index": ict, "minutes": minutes, "selected_by_percent": own
    })
}

fn snapshot(with_market: bool) -> Snapshot {
    let mut elements: Vec<Value> = SQUAD.iter().map(element).collect();
    if with_market {
        elements.extend(MARKET.iter().map(element));
    }
    let payload: BootstrapPayload = serde_json::from_value(json!({
        "elements": elements,
        "teams": [
            {"id": 1, "name": "Arsenal", "strength": 4},
            {"id": 2, "name": "Chelsea", "strength": 3},
            {"id": 3, "name": "Liverpool", "strength": 4},
            {"id": 4, "name": "Man City", "strength": 5}
        ],
        "events": [{"id": 3, "is_current": true, "finished": false}]
    }))
    .unwrap();
    Snapshot::from_bootstrap(&payload)
}

fn fixtures() -> Vec<Fixture> {
    vec![
        Fixture { id: 1, event: Some(4), team_h: 1, team_a: 2 },
        Fixture { id: 2, event: Some(4), team_h: 3, team_a: 4 },
        Fixture { id: 3, event: Some(5), team_h: 2, team_a: 3 },
    ]
}

fn picks() -> Vec<Pick> {
    let starters = STARTERS.iter().map(|&e| Pick {
        element: e,
        is_captain: e == 7,
        is_vice_captain: e == 9,
        multiplier: 1,
    });
    let bench = BENCH.iter().map(|&e| Pick {
        element: e,
        is_captain: false,
        is_vice_captain: false,
        multiplier: 0,
    });
    starters.chain(bench).collect()
}

fn plan_for(snap: &Snapshot, picks: &[Pick], fixtures: &[Fixture], gw: u32, mode: CaptainMode) -> fpl_core::planner::Plan {
    let fixtures_gw = fixtures_for_gameweek(fixtures, gw);
    let ownership = snap.ownership_index();
    plan_gameweek(&PlanInput {
        picks,
        snapshot: snap,
        fixtures_gw: &fixtures_gw,
        gw,
        ownership: &ownership,
        mode,
    })
    .unwrap()
}

fn plan(snap: &Snapshot, picks: &[Pick], mode: CaptainMode) -> fpl_core::planner::Plan {
    plan_for(snap, picks, &fixtures(), 4, mode)
}

fn swap_pairs(actions: &[Action]) -> Vec<(PlayerId, PlayerId)> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Swap(s) => Some((s.in_player, s.out_player)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

#[test]
fn safe_plan_for_mock_squad() {
    let snap = snapshot(false);
    let picks = picks();
    let plan = plan(&snap, &picks, CaptainMode::Safe);
    let data = &plan.data;

    assert_eq!(data.formation_current, "4-4-2");
    assert_eq!(data.formation_optimal, "3-4-3");
    assert_eq!(data.current_start, STARTERS.to_vec());
    assert_eq!(data.current_bench, BENCH.to_vec());
    assert_eq!(data.optimal_start, vec![1, 191, 4, 5, 7, 8, 14, 13, 15, 9, 10]);
    assert_eq!(data.optimal_bench, vec![506, 6, 11, 12]);
    assert_eq!((data.captain, data.vice_captain), (7, 14));

    assert!(approx_eq(data.ep_total_current, 6.7));
    assert!((data.ep_total_optimal - 7.17).abs() < 1e-9);
    assert!((data.ep_gain_lineup - 0.47).abs() < 1e-9);
    assert!((data.bench_ep_total - 0.8).abs() < 1e-9);
    assert!(approx_eq(data.chip_eval.triple_captain_gain, 1.58));
    assert!(approx_eq(data.per_player_ep.get(191), 0.86));
    assert!(approx_eq(data.per_player_ep.get(12), 0.04));

    assert_eq!(plan.actions.len(), 3);
    match &plan.actions[0] {
        Action::Swap(swap) => {
            assert_eq!((swap.in_player, swap.out_player), (15, 506));
            assert_eq!(swap.priority, 10);
            assert_eq!(swap.bundle_id, "lineup-4-1");
            assert!(approx_eq(swap.delta_ep, 0.47));
            assert_eq!(swap.reason, "EP_diff 0.06 -> 0.53; form 1.7");
            assert_eq!(swap.factors.home, Some(false));
            assert_eq!(swap.factors.opp_strength, Some(4));
            assert_eq!(swap.out_fixture.opponent_strength, Some(5));
        }
        other => panic!("expected swap, got {other:?}"),
    }
    match &plan.actions[1] {
        Action::SetVice(vice) => {
            assert_eq!(vice.player, 14);
            assert_eq!(vice.old_player, Some(9));
        }
        other => panic!("expected set_vice, got {other:?}"),
    }
    match &plan.actions[2] {
        Action::Chip(chip) => {
            assert_eq!(chip.chip, Chip::NoChip);
            assert_eq!(chip.reason_code, ReasonCode::BelowThreshold);
        }
        other => panic!("expected chip, got {other:?}"),
    }

    assert_eq!(plan.summary, "Start FWD3 and bench Murillo. Captain B Fernandes (safe). Chip: NONE.");
    assert_eq!(
        plan.summary_long,
        "Start FWD3 for Murillo (+0.47 EP). No chip - bench adds +0.80 EP below 12."
    );
}

#[test]
fn aggressive_plan_changes_vice_only() {
    let snap = snapshot(true);
    let picks = picks();
    let plan = plan(&snap, &picks, CaptainMode::Aggressive);

    assert_eq!((plan.data.captain, plan.data.vice_captain), (7, 191));
    assert_eq!(
        plan.summary,
        "Start FWD3 and bench Murillo. Captain B Fernandes (aggressive). Chip: NONE."
    );
    assert!(!plan.actions.iter().any(|a| matches!(a, Action::SetCaptain(_))));
    assert!(plan
        .actions
        .iter()
        .any(|a| matches!(a, Action::SetVice(v) if v.player == 191 && v.old_player == Some(9))));
}

#[test]
fn planning_is_deterministic() {
    let snap = snapshot(false);
    let picks = picks();
    let first = plan(&snap, &picks, CaptainMode::Safe);
    let second = plan(&snap, &picks, CaptainMode::Safe);

    let a = serde_json::to_string(&(&first.data, &first.actions)).unwrap();
    let b = serde_json::to_string(&(&second.data, &second.actions)).unwrap();
    assert_eq!(a, b);
    assert!(a.contains(r#""per_player_ep":{"1":0.53,"191":0.86"#));
}

#[test]
fn optimal_lineup_is_legal_and_replayable() {
    let snap = snapshot(false);
    let picks = picks();
    let plan = plan(&snap, &picks, CaptainMode::Safe);
    let positions = pick_positions(&picks, &snap);

    assert!(is_legal_start(&plan.data.optimal_start, &positions));
    assert_eq!(verify_plan(&plan.data, &plan.actions, &positions), Ok(()));
}

#[test]
fn tampered_swap_fails_verification() {
    let snap = snapshot(false);
    let picks = picks();
    let plan = plan(&snap, &picks, CaptainMode::Safe);
    let positions = pick_positions(&picks, &snap);

    let mut actions = plan.actions.clone();
    if let Action::Swap(swap) = &mut actions[0] {
        swap.out_player = 13;
    }
    assert_eq!(verify_plan(&plan.data, &actions, &positions), Err(PlanError::SwapMismatch));
}

#[test]
fn two_starting_goalkeepers_are_repaired_before_planning() {
    let snap = snapshot(false);
    let mut picks = picks();
    // Start the second keeper in place of a midfielder.
    for p in picks.iter_mut() {
        if p.element == 12 {
            p.multiplier = 1;
        }
        if p.element == 10 {
            p.multiplier = 0;
        }
    }
    let plan = plan(&snap, &picks, CaptainMode::Safe);
    let positions = pick_positions(&picks, &snap);

    assert_eq!(plan.data.current_start.len(), 11);
    assert!(!plan.data.current_start.contains(&12));
    assert!(plan.data.current_bench.contains(&12));
    assert!(is_legal_start(&plan.data.current_start, &positions));
}

#[test]
fn blank_gameweek_still_reaches_the_optimal_xi() {
    let snap = snapshot(false);
    let picks = picks();
    // Nobody plays in gameweek 6.
    let plan = plan_for(&snap, &picks, &fixtures(), 6, CaptainMode::Safe);
    let data = &plan.data;
    let positions = pick_positions(&picks, &snap);

    assert!(data.per_player_ep.iter().all(|(_, ep)| ep == 0.0));
    // Equal EPΔ fills defence first.
    assert_eq!(data.formation_optimal, "5-4-1");
    assert_eq!(data.optimal_start, vec![1, 191, 506, 4, 7, 8, 13, 5, 6, 9, 10]);
    assert_eq!(swap_pairs(&plan.actions), vec![(6, 14)]);
    assert_eq!(verify_plan(data, &plan.actions, &positions), Ok(()));
}

#[test]
fn blank_starters_are_planned_around() {
    let snap = snapshot(false);
    let picks = picks();
    // Only Chelsea and Liverpool play in gameweek 5.
    let plan = plan_for(&snap, &picks, &fixtures(), 5, CaptainMode::Safe);
    let data = &plan.data;
    let positions = pick_positions(&picks, &snap);

    for id in [1, 4, 5, 6, 9, 10, 11, 15] {
        assert!(approx_eq(data.per_player_ep.get(id), 0.0), "player {id}");
    }
    assert!(data.optimal_start.contains(&12));
    assert!(!data.optimal_start.contains(&1));
    assert!(is_legal_start(&data.optimal_start, &positions));
    assert_eq!(verify_plan(data, &plan.actions, &positions), Ok(()));
}

#[test]
fn double_gameweek_sums_fixtures_with_bonus() {
    let snap = snapshot(false);
    let picks = picks();
    let mut fixtures = fixtures();
    // Chelsea and Man City both play twice in gameweek 4.
    fixtures.push(Fixture { id: 9, event: Some(4), team_h: 2, team_a: 4 });
    let plan = plan_for(&snap, &picks, &fixtures, 4, CaptainMode::Safe);
    let positions = pick_positions(&picks, &snap);

    let esteve = snap.player(191).unwrap();
    let minutes = recent_minutes_proxy(esteve);
    let double = (expected_points_delta(esteve, 4, minutes) + expected_points_delta(esteve, 5, minutes)) * 1.1;
    assert!(approx_eq(plan.data.per_player_ep.get(191), round2(double)));
    assert!(plan.data.per_player_ep.get(191) > 0.86);
    // Single-fixture teams are unchanged.
    assert!(approx_eq(plan.data.per_player_ep.get(1), 0.53));
    assert_eq!(verify_plan(&plan.data, &plan.actions, &positions), Ok(()));
}

// ---------------------------------------------------------------------------
// Analysis and transfers
// ---------------------------------------------------------------------------

#[test]
fn transfer_upgrade_for_weakest_starter() {
    let snap = snapshot(true);
    let picks = picks();
    let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

    for allow_hit in [false, true] {
        let suggestions = suggest_transfers(&linked, &snap, TransferBudget::new(0, allow_hit));
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!((s.out, s.incoming), (506, 17));
        assert!(approx_eq(s.ep_out, 0.058896344332510696));
        assert!(approx_eq(s.ep_in, 1.0088608385094069));
        assert_eq!(s.reason, "Upgrade EPΔ 0.06 -> 1.01; in-form 5.0");

        let filtered = filter_suggestions(&suggestions, 0.5);
        assert_eq!(filtered.len(), 1);
    }
}

#[test]
fn captaincy_and_template_analysis() {
    let snap = snapshot(true);
    let picks = picks();
    let ownership = snap.ownership_index();
    let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

    let split = template_vs_differential(&picks, &ownership, DEFAULT_TEMPLATE_THRESHOLD);
    assert_eq!((split.template_count, split.differential_count), (1, 14));
    assert!(approx_eq(split.template_ratio, 1.0 / 15.0));

    let safe = recommend_captain(&linked, &ownership, CaptainMode::Safe);
    assert_eq!(safe.element, 7);
    assert!(approx_eq(safe.score, 6.395300445855283));

    let aggressive = recommend_captain(&linked, &ownership, CaptainMode::Aggressive);
    assert_eq!(aggressive.element, 191);
    assert!(approx_eq(aggressive.score, 0.7757262577842984));

    let top: Vec<(PlayerId, f64)> = rank_captain_candidates(&linked, &ownership, CaptainMode::Safe, 3)
        .iter()
        .map(|c| (c.element, c.score))
        .collect();
    assert_eq!(top.iter().map(|t| t.0).collect::<Vec<_>>(), vec![7, 8, 14]);
    assert!(approx_eq(top[1].1, 1.8422676181476125));
    assert!(approx_eq(top[2].1, 1.4040711061167876));
}

// Squad selection: starting XI, bench order, captaincy and formation checks.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::{OwnershipIndex, PlayerId, Position};
use crate::scoring::{CaptainMode, EpTable};

/// Number of players in a starting lineup.
pub const STARTING_XI: usize = 11;

/// Outfield substitutes kept on the bench ahead of the spare goalkeeper.
const BENCH_OUTFIELD: usize = 3;

/// Raw EPΔ below which the top captaincy score is not trusted.
pub const LOW_CONFIDENCE_CAPTAIN_EP: f64 = 0.8;

const SAFE_OWNERSHIP_CAP: f64 = 80.0;
const AGGRESSIVE_OWNERSHIP_CAP: f64 = 20.0;
const AGGRESSIVE_SCALE: f64 = 25.0;

pub type PositionMap = HashMap<PlayerId, Position>;

fn position_in(positions: &PositionMap, id: PlayerId) -> Position {
    positions.get(&id).copied().unwrap_or(Position::Midfielder)
}

fn by_ep_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Default, Clone, Copy)]
struct PositionCounts {
    gk: usize,
    def: usize,
    mid: usize,
    fwd: usize,
}

impl PositionCounts {
    fn of(ids: &[PlayerId], positions: &PositionMap) -> Self {
        let mut counts = Self::default();
        for &id in ids {
            *counts.slot(position_in(positions, id)) += 1;
        }
        counts
    }

    fn slot(&mut self, pos: Position) -> &mut usize {
        match pos {
            Position::Goalkeeper => &mut self.gk,
            Position::Defender => &mut self.def,
            Position::Midfielder => &mut self.mid,
            Position::Forward => &mut self.fwd,
        }
    }

    fn get(&self, pos: Position) -> usize {
        match pos {
            Position::Goalkeeper => self.gk,
            Position::Defender => self.def,
            Position::Midfielder => self.mid,
            Position::Forward => self.fwd,
        }
    }
}

/// Outfield formation string, e.g. `"4-4-2"`.
pub fn formation_str(ids: &[PlayerId], positions: &PositionMap) -> String {
    let c = PositionCounts::of(ids, positions);
    format!("{}-{}-{}", c.def, c.mid, c.fwd)
}

/// Whether `ids` is a legal starting XI: eleven players, one goalkeeper and
/// every outfield position within its limits.
pub fn is_legal_start(ids: &[PlayerId], positions: &PositionMap) -> bool {
    if ids.len() != STARTING_XI {
        return false;
    }
    let counts = PositionCounts::of(ids, positions);
    if counts.gk != 1 {
        return false;
    }
    Position::OUTFIELD.iter().all(|pos| {
        let n = counts.get(*pos);
        n >= pos.min_starters() && n <= pos.max_starters()
    })
}

/// Pick the highest-EPΔ legal XI and order the bench.
///
/// One goalkeeper is chosen first, then each outfield minimum is met, then the
/// remaining slots go to the best outfielders whose position has room. The
/// bench is the three weakest unselected outfielders in ascending EPΔ order
/// followed by one spare goalkeeper. Ties keep squad order.
pub fn choose_starting_xi(ep: &EpTable, positions: &PositionMap) -> (Vec<PlayerId>, Vec<PlayerId>) {
    let mut by_pos: HashMap<Position, Vec<(PlayerId, f64)>> = HashMap::new();
    for (id, value) in ep.iter() {
        by_pos.entry(position_in(positions, id)).or_default().push((id, value));
    }
    for pool in by_pos.values_mut() {
        pool.sort_by(|a, b| by_ep_desc(a.1, b.1));
    }
    let pool = |pos: Position| by_pos.get(&pos).map(Vec::as_slice).unwrap_or(&[]);

    let mut selected: Vec<PlayerId> = Vec::with_capacity(STARTING_XI);
    let mut counts = PositionCounts::default();

    if let Some(&(gk, _)) = pool(Position::Goalkeeper).first() {
        selected.push(gk);
        counts.gk = 1;
    }

    for pos in Position::OUTFIELD {
        let picks: Vec<PlayerId> = pool(pos)
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !selected.contains(id))
            .take(pos.min_starters())
            .collect();
        *counts.slot(pos) += picks.len();
        selected.extend(picks);
    }

    let mut candidates: Vec<(PlayerId, f64)> = Position::OUTFIELD
        .iter()
        .flat_map(|&pos| pool(pos).iter().copied())
        .filter(|(id, _)| !selected.contains(id))
        .collect();
    candidates.sort_by(|a, b| by_ep_desc(a.1, b.1));
    for (id, _) in candidates {
        if selected.len() >= STARTING_XI {
            break;
        }
        let pos = position_in(positions, id);
        if counts.get(pos) < pos.max_starters() {
            selected.push(id);
            *counts.slot(pos) += 1;
        }
    }

    let unselected: Vec<PlayerId> = ep.ids().filter(|id| !selected.contains(id)).collect();
    let mut outfield_bench: Vec<PlayerId> = unselected
        .iter()
        .copied()
        .filter(|&id| position_in(positions, id) != Position::Goalkeeper)
        .collect();
    outfield_bench.sort_by(|&a, &b| ep.get(a).partial_cmp(&ep.get(b)).unwrap_or(Ordering::Equal));

    let mut bench: Vec<PlayerId> = outfield_bench.into_iter().take(BENCH_OUTFIELD).collect();
    bench.extend(
        unselected
            .iter()
            .copied()
            .find(|&id| position_in(positions, id) == Position::Goalkeeper),
    );

    (selected, bench)
}

/// Captain and vice among `start`, goalkeepers excluded. Returns `(0, 0)`
/// when there is no candidate.
///
/// Safe mode boosts owned players (ownership capped at 80%), aggressive mode
/// boosts players owned by fewer than 20%. If the top score comes from a
/// player with raw EPΔ below 0.8, the player with the best raw EPΔ captains
/// instead. The vice is the best-scoring other candidate.
pub fn recommend_captain_from_ids(
    start: &[PlayerId],
    ep: &EpTable,
    ownership: &OwnershipIndex,
    positions: &PositionMap,
    mode: CaptainMode,
) -> (PlayerId, PlayerId) {
    let mut scored: Vec<(PlayerId, f64, f64)> = start
        .iter()
        .copied()
        .filter(|&id| positions.get(&id) != Some(&Position::Goalkeeper))
        .map(|id| {
            let own = ownership.get(&id).copied().unwrap_or(0.0);
            let base = ep.get(id);
            let score = match mode {
                CaptainMode::Safe => base * (1.0 + own.min(SAFE_OWNERSHIP_CAP) / 100.0),
                CaptainMode::Aggressive => {
                    base * (1.0 + (AGGRESSIVE_OWNERSHIP_CAP - own.min(AGGRESSIVE_OWNERSHIP_CAP)).max(0.0) / AGGRESSIVE_SCALE)
                }
            };
            (id, score, base)
        })
        .collect();

    if scored.is_empty() {
        return (0, 0);
    }
    scored.sort_by(|a, b| by_ep_desc(a.1, b.1));

    let (mut captain, _, top_base) = scored[0];
    if top_base < LOW_CONFIDENCE_CAPTAIN_EP {
        let mut best = scored[0];
        for candidate in &scored[1..] {
            if candidate.2 > best.2 {
                best = *candidate;
            }
        }
        captain = best.0;
    }

    let vice = scored
        .iter()
        .map(|(id, _, _)| *id)
        .find(|&id| id != captain)
        .unwrap_or(0);

    (captain, vice)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

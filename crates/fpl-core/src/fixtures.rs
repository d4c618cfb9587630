// Fixture linking: per-pick fixture context and per-team fixture sets.

use serde::Serialize;
use std::collections::HashMap;

use crate::domain::{Fixture, Pick, Player, Snapshot, TeamId, DEFAULT_TEAM_STRENGTH};

/// Opponent context for one pick in one gameweek. A team without a fixture
/// gets a blank context: not at home, no opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FixtureContext {
    pub was_home: bool,
    pub opponent_team_id: Option<TeamId>,
    pub opponent_strength: Option<u8>,
}

impl FixtureContext {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn is_blank(&self) -> bool {
        self.opponent_team_id.is_none()
    }

    /// Opponent strength, or the neutral strength when unknown.
    pub fn strength_or_neutral(&self) -> u8 {
        self.opponent_strength.unwrap_or(DEFAULT_TEAM_STRENGTH)
    }
}

/// One side of a fixture as seen from a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamFixture {
    pub was_home: bool,
    pub opponent_team_id: TeamId,
    pub opponent_strength: u8,
}

impl From<TeamFixture> for FixtureContext {
    fn from(f: TeamFixture) -> Self {
        FixtureContext {
            was_home: f.was_home,
            opponent_team_id: Some(f.opponent_team_id),
            opponent_strength: Some(f.opponent_strength),
        }
    }
}

/// A pick joined with its player and fixture context. `player` and `fixture`
/// are both `None` when the pick's element is missing from the bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct LinkedPick<'a> {
    pub pick: &'a Pick,
    pub player: Option<&'a Player>,
    pub fixture: Option<FixtureContext>,
}

impl LinkedPick<'_> {
    pub fn element(&self) -> u32 {
        self.pick.element
    }
}

/// Fixtures scheduled in gameweek `gw`. Unscheduled fixtures are skipped.
pub fn fixtures_for_gameweek(fixtures: &[Fixture], gw: u32) -> Vec<Fixture> {
    fixtures
        .iter()
        .filter(|f| f.event == Some(gw))
        .copied()
        .collect()
}

/// Attach a fixture context for gameweek `gw` to every pick. A team with two
/// fixtures is linked to the first one listed.
pub fn link_fixtures_for_manager<'a>(
    gw: u32,
    picks: &'a [Pick],
    fixtures: &[Fixture],
    snapshot: &'a Snapshot,
) -> Vec<LinkedPick<'a>> {
    let gw_fixtures = fixtures_for_gameweek(fixtures, gw);

    picks
        .iter()
        .map(|pick| {
            let Some(player) = snapshot.player(pick.element) else {
                return LinkedPick {
                    pick,
                    player: None,
                    fixture: None,
                };
            };

            let context = gw_fixtures
                .iter()
                .find_map(|f| {
                    if f.team_h == player.team {
                        Some((true, f.team_a))
                    } else if f.team_a == player.team {
                        Some((false, f.team_h))
                    } else {
                        None
                    }
                })
                .map(|(was_home, opponent)| FixtureContext {
                    was_home,
                    opponent_team_id: Some(opponent),
                    opponent_strength: snapshot.team_strength(opponent),
                })
                .unwrap_or_else(FixtureContext::blank);

            LinkedPick {
                pick,
                player: Some(player),
                fixture: Some(context),
            }
        })
        .collect()
}

/// Every fixture of the gameweek from both sides, keyed by team. Unknown
/// opponents count as neutral strength.
pub fn fixtures_by_team(fixtures_gw: &[Fixture], snapshot: &Snapshot) -> HashMap<TeamId, Vec<TeamFixture>> {
    let strength = |team: TeamId| snapshot.team_strength(team).unwrap_or(DEFAULT_TEAM_STRENGTH);

    let mut by_team: HashMap<TeamId, Vec<TeamFixture>> = HashMap::new();
    for f in fixtures_gw {
        by_team.entry(f.team_h).or_default().push(TeamFixture {
            was_home: true,
            opponent_team_id: f.team_a,
            opponent_strength: strength(f.team_a),
        });
        by_team.entry(f.team_a).or_default().push(TeamFixture {
            was_home: false,
            opponent_team_id: f.team_h,
            opponent_strength: strength(f.team_h),
        });
    }
    by_team
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BootstrapPayload;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        let payload: BootstrapPayload = serde_json::from_value(json!({
            "elements": [
                {"id": 1, "web_name": "Home", "team": 1, "element_type": 2},
                {"id": 2, "web_name": "Away", "team": 2, "element_type": 3},
                {"id": 3, "web_name": "Blank", "team": 5, "element_type": 4},
                {"id": 4, "web_name": "Unknown opp", "team": 6, "element_type": 4}
            ],
            "teams": [
                {"id": 1, "name": "Arsenal", "strength": 4},
                {"id": 2, "name": "Chelsea", "strength": 3},
                {"id": 3, "name": "Fulham", "strength": 2},
                {"id": 5, "name": "Spurs", "strength": 4},
                {"id": 6, "name": "Wolves", "strength": 2}
            ]
        }))
        .unwrap();
        Snapshot::from_bootstrap(&payload)
    }

    fn fixtures() -> Vec<Fixture> {
        vec![
            Fixture { id: 10, event: Some(4), team_h: 1, team_a: 2 },
            Fixture { id: 11, event: Some(4), team_h: 3, team_a: 1 },
            Fixture { id: 12, event: Some(4), team_h: 6, team_a: 99 },
            Fixture { id: 13, event: None, team_h: 5, team_a: 3 },
            Fixture { id: 14, event: Some(5), team_h: 5, team_a: 2 },
        ]
    }

    fn pick(element: u32) -> Pick {
        Pick { element, is_captain: false, is_vice_captain: false, multiplier: 1 }
    }

    #[test]
    fn links_first_fixture_of_the_gameweek() {
        let snap = snapshot();
        let picks = vec![pick(1), pick(2), pick(3), pick(4), pick(77)];
        let linked = link_fixtures_for_manager(4, &picks, &fixtures(), &snap);

        let home = linked[0].fixture.unwrap();
        assert!(home.was_home);
        assert_eq!(home.opponent_team_id, Some(2));
        assert_eq!(home.opponent_strength, Some(3));

        let away = linked[1].fixture.unwrap();
        assert!(!away.was_home);
        assert_eq!(away.opponent_team_id, Some(1));
        assert_eq!(away.opponent_strength, Some(4));

        let blank = linked[2].fixture.unwrap();
        assert!(blank.is_blank());
        assert_eq!(blank.strength_or_neutral(), 3);

        let unknown_opponent = linked[3].fixture.unwrap();
        assert_eq!(unknown_opponent.opponent_team_id, Some(99));
        assert_eq!(unknown_opponent.opponent_strength, None);

        assert!(linked[4].player.is_none());
        assert!(linked[4].fixture.is_none());
    }

    #[test]
    fn fixtures_by_team_covers_both_sides_and_doubles() {
        let snap = snapshot();
        let gw = fixtures_for_gameweek(&fixtures(), 4);
        assert_eq!(gw.len(), 3);

        let by_team = fixtures_by_team(&gw, &snap);
        let arsenal = &by_team[&1];
        assert_eq!(arsenal.len(), 2);
        assert_eq!(arsenal[0].opponent_team_id, 2);
        assert!(arsenal[0].was_home);
        assert_eq!(arsenal[1].opponent_strength, 2);
        assert!(!arsenal[1].was_home);

        assert_eq!(by_team[&99][0].opponent_strength, 2);
        assert_eq!(by_team[&6][0].opponent_strength, DEFAULT_TEAM_STRENGTH);
        assert!(!by_team.contains_key(&5));
    }
}

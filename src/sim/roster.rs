use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SimError, SimResult};
use crate::sim::player::{Player, PlayerRole};

/// A team's starting nine in batting order, plus the starting pitcher.
/// Relief pitchers ride along for context but the starter goes the
/// distance (substitution policy is out of scope).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub team_id: Uuid,
    pub team_name: String,
    /// Exactly nine, in batting order.
    pub batters: Vec<Player>,
    pub starter: Player,
    pub bullpen: Vec<Player>,
}

const REQUIRED_POSITIONS: [&str; 5] = ["C", "1B", "2B", "3B", "SS"];
const OUTFIELD_POSITIONS: [&str; 4] = ["LF", "CF", "RF", "OF"];

impl Roster {
    pub fn validate(&self) -> SimResult<()> {
        if self.batters.len() != 9 {
            return Err(SimError::DataCorrupt(format!(
                "roster for {} has {} batters, expected 9",
                self.team_name,
                self.batters.len()
            )));
        }

        for required in REQUIRED_POSITIONS {
            if !self.batters.iter().any(|p| p.position == required) {
                return Err(SimError::DataCorrupt(format!(
                    "roster for {} is missing a {}",
                    self.team_name, required
                )));
            }
        }

        let outfielders = self
            .batters
            .iter()
            .filter(|p| OUTFIELD_POSITIONS.contains(&p.position.as_str()))
            .count();
        if outfielders < 3 {
            return Err(SimError::DataCorrupt(format!(
                "roster for {} has {} outfielders, expected 3",
                self.team_name, outfielders
            )));
        }

        let starter_bats = self.batters.iter().any(|p| p.id == self.starter.id);
        if starter_bats && self.starter.role != PlayerRole::TwoWay {
            return Err(SimError::DataCorrupt(format!(
                "starter {} appears in the batting order but is not two-way",
                self.starter.name
            )));
        }

        for player in self.batters.iter().chain(std::iter::once(&self.starter)) {
            player.rates.validate().map_err(|err| {
                SimError::DataCorrupt(format!("{}: {}", player.name, err))
            })?;
        }

        Ok(())
    }

    /// Whether any player had league-average rates substituted; used to
    /// observe default-filling in tests.
    pub fn any_defaulted(&self) -> bool {
        self.batters.iter().any(|p| p.defaulted) || self.starter.defaulted
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sim::player::{Handedness, RateBlock};

    pub(crate) fn test_player(name: &str, position: &str, slot: usize) -> Player {
        // Vary rates slightly by lineup slot so lineups aren't uniform.
        let mut rates = RateBlock::league_average();
        rates.single += 0.002 * slot as f64;
        Player {
            id: Uuid::new_v4(),
            name: name.to_string(),
            bats: if slot % 3 == 0 {
                Handedness::Left
            } else {
                Handedness::Right
            },
            throws: Handedness::Right,
            position: position.to_string(),
            role: PlayerRole::Batter,
            rates: rates.normalized(),
            pitching: None,
            defaulted: false,
        }
    }

    pub(crate) fn test_pitcher(name: &str) -> Player {
        Player {
            id: Uuid::new_v4(),
            name: name.to_string(),
            bats: Handedness::Right,
            throws: Handedness::Right,
            position: "P".to_string(),
            role: PlayerRole::Pitcher,
            rates: RateBlock::league_average(),
            pitching: Some(crate::sim::player::PitchingRates {
                strikeout_rate: 0.24,
                walk_rate: 0.08,
                home_runs_per_nine: 1.2,
                hits_per_nine: 8.4,
            }),
            defaulted: false,
        }
    }

    pub(crate) fn test_roster(team_name: &str) -> Roster {
        let positions = ["C", "1B", "2B", "3B", "SS", "LF", "CF", "RF", "DH"];
        let batters = positions
            .iter()
            .enumerate()
            .map(|(slot, pos)| test_player(&format!("{} batter {}", team_name, slot + 1), pos, slot))
            .collect();
        Roster {
            team_id: Uuid::new_v4(),
            team_name: team_name.to_string(),
            batters,
            starter: test_pitcher(&format!("{} starter", team_name)),
            bullpen: vec![],
        }
    }

    #[test]
    fn valid_roster_passes() {
        assert!(test_roster("Test").validate().is_ok());
    }

    #[test]
    fn eight_batters_is_corrupt() {
        let mut roster = test_roster("Test");
        roster.batters.pop();
        assert!(matches!(
            roster.validate(),
            Err(SimError::DataCorrupt(_))
        ));
    }

    #[test]
    fn missing_catcher_is_corrupt() {
        let mut roster = test_roster("Test");
        roster.batters[0].position = "DH".to_string();
        assert!(matches!(
            roster.validate(),
            Err(SimError::DataCorrupt(_))
        ));
    }

    #[test]
    fn two_outfielders_is_corrupt() {
        let mut roster = test_roster("Test");
        roster.batters[5].position = "DH".to_string();
        assert!(matches!(
            roster.validate(),
            Err(SimError::DataCorrupt(_))
        ));
    }

    #[test]
    fn batting_starter_must_be_two_way() {
        let mut roster = test_roster("Test");
        roster.starter = roster.batters[3].clone();
        assert!(roster.validate().is_err());

        roster.starter.role = PlayerRole::TwoWay;
        roster.batters[3].role = PlayerRole::TwoWay;
        roster.batters[3].id = roster.starter.id;
        assert!(roster.validate().is_ok());
    }
}

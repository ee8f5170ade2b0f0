use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::error::{SimError, SimResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "S")]
    Switch,
}

impl Handedness {
    pub fn parse(raw: &str) -> SimResult<Handedness> {
        match raw {
            "L" => Ok(Handedness::Left),
            "R" => Ok(Handedness::Right),
            "S" => Ok(Handedness::Switch),
            other => Err(SimError::DataCorrupt(format!(
                "unknown handedness {:?}",
                other
            ))),
        }
    }

    /// The side a switch hitter actually bats from depends on the
    /// pitcher; they always take the platoon advantage.
    pub fn effective_side(self, against: Handedness) -> Handedness {
        match self {
            Handedness::Switch => match against {
                Handedness::Left => Handedness::Right,
                _ => Handedness::Left,
            },
            side => side,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerRole {
    Batter,
    Pitcher,
    TwoWay,
}

impl PlayerRole {
    pub fn parse(raw: &str) -> SimResult<PlayerRole> {
        match raw {
            "batter" => Ok(PlayerRole::Batter),
            "pitcher" => Ok(PlayerRole::Pitcher),
            "two-way" => Ok(PlayerRole::TwoWay),
            other => Err(SimError::DataCorrupt(format!("unknown role {:?}", other))),
        }
    }
}

/// Terminal outcomes of a plate appearance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaOutcome {
    Strikeout,
    Walk,
    HitByPitch,
    Single,
    Double,
    Triple,
    HomeRun,
    InPlayOut,
}

impl PaOutcome {
    pub const ALL: [PaOutcome; 8] = [
        PaOutcome::Strikeout,
        PaOutcome::Walk,
        PaOutcome::HitByPitch,
        PaOutcome::Single,
        PaOutcome::Double,
        PaOutcome::Triple,
        PaOutcome::HomeRun,
        PaOutcome::InPlayOut,
    ];

    pub fn is_hit(self) -> bool {
        matches!(
            self,
            PaOutcome::Single | PaOutcome::Double | PaOutcome::Triple | PaOutcome::HomeRun
        )
    }
}

impl Display for PaOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PaOutcome::Strikeout => "strikeout",
            PaOutcome::Walk => "walk",
            PaOutcome::HitByPitch => "hit_by_pitch",
            PaOutcome::Single => "single",
            PaOutcome::Double => "double",
            PaOutcome::Triple => "triple",
            PaOutcome::HomeRun => "home_run",
            PaOutcome::InPlayOut => "in_play_out",
        };
        write!(f, "{}", name)
    }
}

/// Per-plate-appearance outcome probabilities from season aggregates.
/// A well-formed block is non-negative and sums to ~1; blocks loaded
/// from the store are normalized on the way in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateBlock {
    pub strikeout: f64,
    pub walk: f64,
    pub hit_by_pitch: f64,
    pub single: f64,
    pub double: f64,
    pub triple: f64,
    pub home_run: f64,
    pub in_play_out: f64,
}

impl RateBlock {
    /// League-wide averages, used both as the odds-ratio denominator and
    /// as the fill-in for players with no seasonal data.
    pub fn league_average() -> RateBlock {
        RateBlock {
            strikeout: 0.221,
            walk: 0.085,
            hit_by_pitch: 0.011,
            single: 0.140,
            double: 0.044,
            triple: 0.004,
            home_run: 0.031,
            in_play_out: 0.464,
        }
    }

    pub fn rate(&self, outcome: PaOutcome) -> f64 {
        match outcome {
            PaOutcome::Strikeout => self.strikeout,
            PaOutcome::Walk => self.walk,
            PaOutcome::HitByPitch => self.hit_by_pitch,
            PaOutcome::Single => self.single,
            PaOutcome::Double => self.double,
            PaOutcome::Triple => self.triple,
            PaOutcome::HomeRun => self.home_run,
            PaOutcome::InPlayOut => self.in_play_out,
        }
    }

    pub fn rate_mut(&mut self, outcome: PaOutcome) -> &mut f64 {
        match outcome {
            PaOutcome::Strikeout => &mut self.strikeout,
            PaOutcome::Walk => &mut self.walk,
            PaOutcome::HitByPitch => &mut self.hit_by_pitch,
            PaOutcome::Single => &mut self.single,
            PaOutcome::Double => &mut self.double,
            PaOutcome::Triple => &mut self.triple,
            PaOutcome::HomeRun => &mut self.home_run,
            PaOutcome::InPlayOut => &mut self.in_play_out,
        }
    }

    pub fn total(&self) -> f64 {
        PaOutcome::ALL.iter().map(|&o| self.rate(o)).sum()
    }

    pub fn validate(&self) -> SimResult<()> {
        for outcome in PaOutcome::ALL {
            if self.rate(outcome) < 0.0 || !self.rate(outcome).is_finite() {
                return Err(SimError::DataCorrupt(format!(
                    "negative or non-finite rate for {}",
                    outcome
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(SimError::DataCorrupt("rate block sums to zero".into()));
        }
        Ok(())
    }

    pub fn normalized(mut self) -> RateBlock {
        let total = self.total();
        if total > 0.0 {
            for outcome in PaOutcome::ALL {
                *self.rate_mut(outcome) /= total;
            }
        }
        self
    }
}

/// Park- and altitude-independent rates for pitchers. The allowed-rate
/// block the sampler needs is derived from these, borrowing the league
/// split for everything the four numbers don't pin down.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitchingRates {
    /// K per batter faced.
    pub strikeout_rate: f64,
    /// BB per batter faced.
    pub walk_rate: f64,
    pub home_runs_per_nine: f64,
    pub hits_per_nine: f64,
}

/// Batters faced per nine innings, league-typical. Converts the per-nine
/// pitcher rates into per-PA rates.
const BATTERS_PER_NINE: f64 = 38.3;

impl PitchingRates {
    pub fn allowed_rates(&self) -> RateBlock {
        let league = RateBlock::league_average();

        let home_run = (self.home_runs_per_nine / BATTERS_PER_NINE).max(0.0);
        let hits = (self.hits_per_nine / BATTERS_PER_NINE).max(home_run);
        let non_hr_hits = hits - home_run;

        // Split the non-HR hits the way the league does.
        let league_non_hr = league.single + league.double + league.triple;
        let single = non_hr_hits * league.single / league_non_hr;
        let double = non_hr_hits * league.double / league_non_hr;
        let triple = non_hr_hits * league.triple / league_non_hr;

        let strikeout = self.strikeout_rate.max(0.0);
        let walk = self.walk_rate.max(0.0);
        let hit_by_pitch = league.hit_by_pitch;
        let accounted = strikeout + walk + hit_by_pitch + hits;
        let in_play_out = (1.0 - accounted).max(0.0);

        RateBlock {
            strikeout,
            walk,
            hit_by_pitch,
            single,
            double,
            triple,
            home_run,
            in_play_out,
        }
        .normalized()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub bats: Handedness,
    pub throws: Handedness,
    pub position: String,
    pub role: PlayerRole,
    /// Plate-appearance outcome rates as a batter.
    pub rates: RateBlock,
    pub pitching: Option<PitchingRates>,
    /// True when the store had no seasonal data and league averages were
    /// substituted.
    pub defaulted: bool,
}

impl Player {
    /// The rate block this player allows when on the mound.
    pub fn allowed_rates(&self) -> RateBlock {
        match &self.pitching {
            Some(pitching) => pitching.allowed_rates(),
            None => RateBlock::league_average(),
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn league_average_sums_to_one() {
        let total = RateBlock::league_average().total();
        assert!((total - 1.0).abs() < 1e-9, "total was {}", total);
    }

    #[test]
    fn normalized_sums_to_one() {
        let block = RateBlock {
            strikeout: 2.0,
            walk: 1.0,
            hit_by_pitch: 0.1,
            single: 1.5,
            double: 0.5,
            triple: 0.05,
            home_run: 0.4,
            in_play_out: 4.0,
        }
        .normalized();
        assert!((block.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn negative_rate_is_corrupt() {
        let mut block = RateBlock::league_average();
        block.home_run = -0.01;
        assert!(matches!(block.validate(), Err(SimError::DataCorrupt(_))));
    }

    #[test]
    fn pitcher_allowed_rates_are_normalized() {
        let rates = PitchingRates {
            strikeout_rate: 0.28,
            walk_rate: 0.06,
            home_runs_per_nine: 1.1,
            hits_per_nine: 7.8,
        };
        let block = rates.allowed_rates();
        assert!((block.total() - 1.0).abs() < 1e-9);
        assert!(block.strikeout > RateBlock::league_average().strikeout);
        assert!(block.home_run > 0.0);
    }

    #[test]
    fn switch_hitter_takes_platoon_advantage() {
        assert_eq!(
            Handedness::Switch.effective_side(Handedness::Left),
            Handedness::Right
        );
        assert_eq!(
            Handedness::Switch.effective_side(Handedness::Right),
            Handedness::Left
        );
        assert_eq!(
            Handedness::Left.effective_side(Handedness::Left),
            Handedness::Left
        );
    }
}

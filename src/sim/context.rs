use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SimError, SimResult};
use crate::sim::player::Handedness;
use crate::sim::roster::Roster;
use crate::weather::Weather;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoofType {
    Open,
    Retractable,
    Dome,
    Indoor,
    Fixed,
}

impl RoofType {
    pub fn parse(raw: &str) -> SimResult<RoofType> {
        match raw {
            "open" => Ok(RoofType::Open),
            "retractable" => Ok(RoofType::Retractable),
            "dome" => Ok(RoofType::Dome),
            "indoor" => Ok(RoofType::Indoor),
            "fixed" => Ok(RoofType::Fixed),
            other => Err(SimError::DataCorrupt(format!(
                "unknown roof type {:?}",
                other
            ))),
        }
    }

    /// Controlled-environment parks skip the forecast entirely.
    pub fn is_controlled(self) -> bool {
        matches!(self, RoofType::Dome | RoofType::Indoor | RoofType::Fixed)
    }
}

/// Multiplicative outcome modifiers for one park. 1.000 everywhere is a
/// neutral park. The optional handedness split overrides the base HR
/// factor for one side of the plate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParkFactors {
    #[serde(default = "neutral")]
    pub home_run: f64,
    #[serde(default = "neutral")]
    pub double: f64,
    #[serde(default = "neutral")]
    pub triple: f64,
    #[serde(default = "neutral")]
    pub hits: f64,
    #[serde(default = "neutral")]
    pub errors: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_run_lhb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_run_rhb: Option<f64>,
}

fn neutral() -> f64 {
    1.0
}

impl Default for ParkFactors {
    fn default() -> ParkFactors {
        ParkFactors {
            home_run: 1.0,
            double: 1.0,
            triple: 1.0,
            hits: 1.0,
            errors: 1.0,
            home_run_lhb: None,
            home_run_rhb: None,
        }
    }
}

impl ParkFactors {
    /// HR factor for a batter standing on a particular side.
    pub fn home_run_for(&self, side: Handedness) -> f64 {
        match side {
            Handedness::Left => self.home_run_lhb.unwrap_or(self.home_run),
            _ => self.home_run_rhb.unwrap_or(self.home_run),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stadium {
    pub id: Uuid,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_feet: f64,
    pub roof: RoofType,
    pub park_factors: ParkFactors,
}

/// Signed umpire tendency deltas, zero-centered.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UmpireTendencies {
    /// Positive = bigger zone, more strikeouts and fewer walks.
    #[serde(default)]
    pub zone_expansion: f64,
    /// Positive = calls lean toward the home team.
    #[serde(default)]
    pub home_team_favor: f64,
    #[serde(default)]
    pub consistency: f64,
}

impl Default for UmpireTendencies {
    fn default() -> UmpireTendencies {
        UmpireTendencies {
            zone_expansion: 0.0,
            home_team_favor: 0.0,
            consistency: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Umpire {
    pub id: Uuid,
    pub name: String,
    pub tendencies: UmpireTendencies,
}

impl Umpire {
    /// Stand-in for games with no umpire assignment yet.
    pub fn neutral() -> Umpire {
        Umpire {
            id: Uuid::nil(),
            name: "unassigned".to_string(),
            tendencies: UmpireTendencies::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: String,
}

/// Everything the store knows about a scheduled game, before rosters and
/// weather are attached.
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub id: String,
    pub home_team: TeamInfo,
    pub away_team: TeamInfo,
    pub stadium: Stadium,
    pub umpire: Umpire,
    pub scheduled_at: DateTime<Utc>,
}

/// The full context one run simulates under. Built once per run and
/// shared read-only by every worker.
#[derive(Clone, Debug)]
pub struct GameContext {
    pub game_id: String,
    pub home_team: TeamInfo,
    pub away_team: TeamInfo,
    pub home_roster: Roster,
    pub away_roster: Roster,
    pub stadium: Stadium,
    pub umpire: Umpire,
    pub weather: Weather,
    pub scheduled_at: DateTime<Utc>,
}

impl GameContext {
    pub fn from_parts(
        record: GameRecord,
        home_roster: Roster,
        away_roster: Roster,
        weather: Weather,
    ) -> GameContext {
        GameContext {
            game_id: record.id,
            home_team: record.home_team,
            away_team: record.away_team,
            home_roster,
            away_roster,
            stadium: record.stadium,
            umpire: record.umpire,
            weather,
            scheduled_at: record.scheduled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controlled_roofs() {
        assert!(RoofType::Dome.is_controlled());
        assert!(RoofType::Indoor.is_controlled());
        assert!(RoofType::Fixed.is_controlled());
        assert!(!RoofType::Open.is_controlled());
        assert!(!RoofType::Retractable.is_controlled());
    }

    #[test]
    fn handedness_split_falls_back_to_base() {
        let mut factors = ParkFactors {
            home_run: 1.1,
            ..ParkFactors::default()
        };
        assert_eq!(factors.home_run_for(Handedness::Left), 1.1);

        factors.home_run_lhb = Some(1.3);
        assert_eq!(factors.home_run_for(Handedness::Left), 1.3);
        assert_eq!(factors.home_run_for(Handedness::Right), 1.1);
    }

    #[test]
    fn park_factors_deserialize_with_defaults() {
        let factors: ParkFactors = serde_json::from_str(r#"{"home_run": 1.2}"#).unwrap();
        assert_eq!(factors.home_run, 1.2);
        assert_eq!(factors.hits, 1.0);
        assert_eq!(factors.home_run_lhb, None);
    }
}

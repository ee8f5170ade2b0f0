use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::coordinator::aggregate::{Aggregate, AggregateStats, PlayerLines};
use crate::db_types::RunStatus;
use crate::error::{SimError, SimResult};
use crate::schema::*;
use crate::sim::game::Winner;
use crate::sim::trial::{KeyEvent, TrialResult};

#[derive(Identifiable, Queryable, Debug, Clone)]
#[diesel(table_name = teams)]
pub struct TeamRow {
    pub id: Uuid,
    pub name: String,
    pub abbreviation: String,
}

#[derive(Identifiable, Queryable, Debug, Clone)]
#[diesel(table_name = players)]
pub struct PlayerRow {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub bats: String,
    pub throws: String,
    pub position: String,
    pub role: String,
    pub lineup_slot: Option<i32>,
    pub is_starting_pitcher: bool,
    pub rates: Option<serde_json::Value>,
    pub pitching_rates: Option<serde_json::Value>,
}

#[derive(Identifiable, Queryable, Debug, Clone)]
#[diesel(table_name = stadiums)]
pub struct StadiumRow {
    pub id: Uuid,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_feet: f64,
    pub roof_type: String,
    pub park_factors: serde_json::Value,
}

#[derive(Identifiable, Queryable, Debug, Clone)]
#[diesel(table_name = umpires)]
pub struct UmpireRow {
    pub id: Uuid,
    pub name: String,
    pub tendencies: serde_json::Value,
}

#[derive(Identifiable, Queryable, Debug, Clone)]
#[diesel(table_name = games)]
pub struct GameRow {
    pub id: String,
    pub home_team_id: Uuid,
    pub away_team_id: Uuid,
    pub stadium_id: Uuid,
    pub umpire_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Identifiable, Queryable, Insertable, Debug, Clone, Serialize)]
#[diesel(table_name = simulation_runs, primary_key(run_id))]
pub struct Run {
    pub run_id: Uuid,
    pub game_id: String,
    pub config: serde_json::Value,
    pub total_runs: i32,
    pub completed_runs: i32,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = simulation_results)]
pub struct TrialRow {
    pub run_id: Uuid,
    pub trial_number: i32,
    pub home_score: i32,
    pub away_score: i32,
    pub winner: String,
    pub total_pitches: i32,
    pub duration_minutes: i32,
    pub key_events: serde_json::Value,
    pub errored: bool,
}

impl TrialRow {
    pub fn from_result(result: &TrialResult) -> SimResult<TrialRow> {
        Ok(TrialRow {
            run_id: result.run_id,
            trial_number: result.trial_number as i32,
            home_score: result.home_score as i32,
            away_score: result.away_score as i32,
            winner: result.winner.to_string(),
            total_pitches: result.total_pitches as i32,
            duration_minutes: result.duration_minutes as i32,
            key_events: serde_json::to_value(&result.key_events)?,
            errored: result.errored,
        })
    }

    /// Rehydrates the persisted portion of a trial. Per-player stat
    /// lines only exist in the aggregate, so they come back empty.
    pub fn into_result(self) -> SimResult<TrialResult> {
        let key_events: Vec<KeyEvent> = serde_json::from_value(self.key_events)?;
        let winner = Winner::parse(&self.winner).ok_or_else(|| {
            SimError::DataCorrupt(format!("unknown winner {:?}", self.winner))
        })?;
        Ok(TrialResult {
            run_id: self.run_id,
            trial_number: self.trial_number as u32,
            home_score: self.home_score as u32,
            away_score: self.away_score as u32,
            winner,
            total_pitches: self.total_pitches as u32,
            duration_minutes: self.duration_minutes as u32,
            key_events,
            batting_lines: Default::default(),
            pitching_lines: Default::default(),
            errored: self.errored,
        })
    }
}

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = simulation_aggregates)]
pub struct AggregateRow {
    pub run_id: Uuid,
    pub home_win_probability: f64,
    pub away_win_probability: f64,
    pub tie_probability: f64,
    pub expected_home_score: f64,
    pub expected_away_score: f64,
    pub home_score_distribution: serde_json::Value,
    pub away_score_distribution: serde_json::Value,
    pub average_duration_minutes: f64,
    pub average_pitches: f64,
    pub stats: serde_json::Value,
    pub player_lines: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AggregateRow {
    pub fn from_aggregate(aggregate: &Aggregate, created_at: DateTime<Utc>) -> SimResult<AggregateRow> {
        Ok(AggregateRow {
            run_id: aggregate.run_id,
            home_win_probability: aggregate.home_win_probability,
            away_win_probability: aggregate.away_win_probability,
            tie_probability: aggregate.tie_probability,
            expected_home_score: aggregate.expected_home_score,
            expected_away_score: aggregate.expected_away_score,
            home_score_distribution: serde_json::to_value(&aggregate.home_score_distribution)?,
            away_score_distribution: serde_json::to_value(&aggregate.away_score_distribution)?,
            average_duration_minutes: aggregate.average_duration_minutes,
            average_pitches: aggregate.average_pitches,
            stats: serde_json::to_value(aggregate.stats)?,
            player_lines: serde_json::to_value(&aggregate.player_lines)?,
            created_at,
        })
    }

    pub fn into_aggregate(self) -> SimResult<Aggregate> {
        let stats: AggregateStats = serde_json::from_value(self.stats)?;
        let player_lines: PlayerLines = serde_json::from_value(self.player_lines)?;
        Ok(Aggregate {
            run_id: self.run_id,
            home_win_probability: self.home_win_probability,
            away_win_probability: self.away_win_probability,
            tie_probability: self.tie_probability,
            expected_home_score: self.expected_home_score,
            expected_away_score: self.expected_away_score,
            home_score_distribution: serde_json::from_value(self.home_score_distribution)?,
            away_score_distribution: serde_json::from_value(self.away_score_distribution)?,
            average_duration_minutes: self.average_duration_minutes,
            average_pitches: self.average_pitches,
            stats,
            player_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::game::Half;
    use std::collections::BTreeMap;

    #[test]
    fn trial_row_round_trips_persisted_fields() {
        let original = TrialResult {
            run_id: Uuid::new_v4(),
            trial_number: 17,
            home_score: 6,
            away_score: 5,
            winner: Winner::Home,
            total_pitches: 289,
            duration_minutes: 194,
            key_events: vec![KeyEvent {
                event_type: "home_run".to_string(),
                inning: 9,
                half: Half::Bottom,
                runs_scored: 2,
                leverage: 2.4,
            }],
            batting_lines: Default::default(),
            pitching_lines: Default::default(),
            errored: false,
        };

        let row = TrialRow::from_result(&original).unwrap();
        let restored = row.into_result().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn unknown_winner_is_corrupt() {
        let row = TrialRow {
            run_id: Uuid::nil(),
            trial_number: 1,
            home_score: 0,
            away_score: 0,
            winner: "rainout".to_string(),
            total_pitches: 0,
            duration_minutes: 0,
            key_events: serde_json::json!([]),
            errored: false,
        };
        assert!(matches!(
            row.into_result(),
            Err(SimError::DataCorrupt(_))
        ));
    }

    #[test]
    fn aggregate_row_round_trips() {
        let mut home_scores = BTreeMap::new();
        home_scores.insert(3u32, 6u32);
        home_scores.insert(4, 4);
        let aggregate = Aggregate {
            run_id: Uuid::new_v4(),
            home_win_probability: 0.6,
            away_win_probability: 0.4,
            tie_probability: 0.0,
            expected_home_score: 3.4,
            expected_away_score: 2.9,
            home_score_distribution: home_scores.clone(),
            away_score_distribution: home_scores,
            average_duration_minutes: 177.5,
            average_pitches: 291.2,
            stats: AggregateStats {
                total_simulations: 10,
                home_wins: 6,
                away_wins: 4,
                ties: 0,
                errored_trials: 0,
                one_run_game_pct: 0.3,
                shutout_pct: 0.1,
            },
            player_lines: PlayerLines::default(),
        };

        let row = AggregateRow::from_aggregate(&aggregate, Utc::now()).unwrap();
        assert_eq!(row.into_aggregate().unwrap(), aggregate);
    }
}

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::sim::game::Winner;
use crate::sim::trial::TrialResult;

/// Per-player batting line averaged over all trials in a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanBattingLine {
    pub plate_appearances: f64,
    pub hits: f64,
    pub doubles: f64,
    pub triples: f64,
    pub home_runs: f64,
    pub walks: f64,
    pub strikeouts: f64,
    pub runs_batted_in: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanPitchingLine {
    pub batters_faced: f64,
    pub strikeouts: f64,
    pub walks: f64,
    pub hits_allowed: f64,
    pub home_runs_allowed: f64,
    pub runs_allowed: f64,
}

/// BTreeMaps keep serialization order stable, so identical multisets of
/// trials serialize to identical JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerLines {
    pub batting: BTreeMap<Uuid, MeanBattingLine>,
    pub pitching: BTreeMap<Uuid, MeanPitchingLine>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_simulations: u32,
    pub home_wins: u32,
    pub away_wins: u32,
    pub ties: u32,
    pub errored_trials: u32,
    pub one_run_game_pct: f64,
    pub shutout_pct: f64,
}

/// Final rollup of a completed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub run_id: Uuid,
    pub home_win_probability: f64,
    pub away_win_probability: f64,
    pub tie_probability: f64,
    pub expected_home_score: f64,
    pub expected_away_score: f64,
    pub home_score_distribution: BTreeMap<u32, u32>,
    pub away_score_distribution: BTreeMap<u32, u32>,
    pub average_duration_minutes: f64,
    pub average_pitches: f64,
    pub stats: AggregateStats,
    pub player_lines: PlayerLines,
}

#[derive(Clone, Copy, Debug, Default)]
struct BattingTotals {
    plate_appearances: u64,
    hits: u64,
    doubles: u64,
    triples: u64,
    home_runs: u64,
    walks: u64,
    strikeouts: u64,
    runs_batted_in: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct PitchingTotals {
    batters_faced: u64,
    strikeouts: u64,
    walks: u64,
    hits_allowed: u64,
    home_runs_allowed: u64,
    runs_allowed: u64,
}

/// Streaming accumulator over trial results. Merging is commutative and
/// associative (everything is a sum or a count), so the final aggregate
/// is a function of the trial multiset alone, not arrival order.
#[derive(Debug, Default)]
pub struct AggregateAccumulator {
    merged: u32,
    home_wins: u32,
    away_wins: u32,
    ties: u32,
    errored: u32,
    home_scores: BTreeMap<u32, u32>,
    away_scores: BTreeMap<u32, u32>,
    home_score_sum: u64,
    away_score_sum: u64,
    duration_sum: u64,
    pitches_sum: u64,
    one_run_games: u32,
    shutouts: u32,
    batting: HashMap<Uuid, BattingTotals>,
    pitching: HashMap<Uuid, PitchingTotals>,
}

impl AggregateAccumulator {
    pub fn new() -> AggregateAccumulator {
        AggregateAccumulator::default()
    }

    pub fn merged(&self) -> u32 {
        self.merged
    }

    pub fn errored_fraction(&self) -> f64 {
        if self.merged == 0 {
            0.0
        } else {
            self.errored as f64 / self.merged as f64
        }
    }

    pub fn merge(&mut self, result: &TrialResult) {
        self.merged += 1;
        match result.winner {
            Winner::Home => self.home_wins += 1,
            Winner::Away => self.away_wins += 1,
            Winner::Tie => self.ties += 1,
        }
        if result.errored {
            self.errored += 1;
        }

        *self.home_scores.entry(result.home_score).or_insert(0) += 1;
        *self.away_scores.entry(result.away_score).or_insert(0) += 1;
        self.home_score_sum += result.home_score as u64;
        self.away_score_sum += result.away_score as u64;
        self.duration_sum += result.duration_minutes as u64;
        self.pitches_sum += result.total_pitches as u64;

        let margin = result.home_score.abs_diff(result.away_score);
        if margin == 1 {
            self.one_run_games += 1;
        }
        if result.winner != Winner::Tie && (result.home_score == 0 || result.away_score == 0) {
            self.shutouts += 1;
        }

        for (player_id, line) in &result.batting_lines {
            let totals = self.batting.entry(*player_id).or_default();
            totals.plate_appearances += line.plate_appearances as u64;
            totals.hits += line.hits as u64;
            totals.doubles += line.doubles as u64;
            totals.triples += line.triples as u64;
            totals.home_runs += line.home_runs as u64;
            totals.walks += line.walks as u64;
            totals.strikeouts += line.strikeouts as u64;
            totals.runs_batted_in += line.runs_batted_in as u64;
        }
        for (player_id, line) in &result.pitching_lines {
            let totals = self.pitching.entry(*player_id).or_default();
            totals.batters_faced += line.batters_faced as u64;
            totals.strikeouts += line.strikeouts as u64;
            totals.walks += line.walks as u64;
            totals.hits_allowed += line.hits_allowed as u64;
            totals.home_runs_allowed += line.home_runs_allowed as u64;
            totals.runs_allowed += line.runs_allowed as u64;
        }
    }

    pub fn finalize(&self, run_id: Uuid) -> Aggregate {
        let trials = self.merged.max(1) as f64;

        let batting = self
            .batting
            .iter()
            .map(|(id, totals)| {
                (
                    *id,
                    MeanBattingLine {
                        plate_appearances: totals.plate_appearances as f64 / trials,
                        hits: totals.hits as f64 / trials,
                        doubles: totals.doubles as f64 / trials,
                        triples: totals.triples as f64 / trials,
                        home_runs: totals.home_runs as f64 / trials,
                        walks: totals.walks as f64 / trials,
                        strikeouts: totals.strikeouts as f64 / trials,
                        runs_batted_in: totals.runs_batted_in as f64 / trials,
                    },
                )
            })
            .collect();
        let pitching = self
            .pitching
            .iter()
            .map(|(id, totals)| {
                (
                    *id,
                    MeanPitchingLine {
                        batters_faced: totals.batters_faced as f64 / trials,
                        strikeouts: totals.strikeouts as f64 / trials,
                        walks: totals.walks as f64 / trials,
                        hits_allowed: totals.hits_allowed as f64 / trials,
                        home_runs_allowed: totals.home_runs_allowed as f64 / trials,
                        runs_allowed: totals.runs_allowed as f64 / trials,
                    },
                )
            })
            .collect();

        Aggregate {
            run_id,
            home_win_probability: self.home_wins as f64 / trials,
            away_win_probability: self.away_wins as f64 / trials,
            tie_probability: self.ties as f64 / trials,
            expected_home_score: self.home_score_sum as f64 / trials,
            expected_away_score: self.away_score_sum as f64 / trials,
            home_score_distribution: self.home_scores.clone(),
            away_score_distribution: self.away_scores.clone(),
            average_duration_minutes: self.duration_sum as f64 / trials,
            average_pitches: self.pitches_sum as f64 / trials,
            stats: AggregateStats {
                total_simulations: self.merged,
                home_wins: self.home_wins,
                away_wins: self.away_wins,
                ties: self.ties,
                errored_trials: self.errored,
                one_run_game_pct: self.one_run_games as f64 / trials,
                shutout_pct: self.shutouts as f64 / trials,
            },
            player_lines: PlayerLines { batting, pitching },
        }
    }
}

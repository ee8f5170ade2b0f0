use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    Top,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Home,
    Away,
    Tie,
}

impl Display for Winner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::Home => write!(f, "home"),
            Winner::Away => write!(f, "away"),
            Winner::Tie => write!(f, "tie"),
        }
    }
}

impl Winner {
    pub fn parse(raw: &str) -> Option<Winner> {
        match raw {
            "home" => Some(Winner::Home),
            "away" => Some(Winner::Away),
            "tie" => Some(Winner::Tie),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Count {
    pub balls: u8,
    pub strikes: u8,
}

/// Who's up, who's throwing, and how much the moment matters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurrentAtBat {
    pub batter: Uuid,
    pub pitcher: Uuid,
    pub leverage: f64,
}

/// Mutable state of one game playthrough. Lives entirely on one worker's
/// stack; never shared.
#[derive(Clone, Debug, PartialEq)]
pub struct GameState {
    pub inning: u32,
    pub half: Half,
    pub outs: u8,
    pub count: Count,
    /// First, second, third. Runner identity matters for stat lines.
    pub bases: [Option<Uuid>; 3],
    pub home_score: u32,
    pub away_score: u32,
    /// Next lineup slot, 0-8, per team.
    pub home_slot: usize,
    pub away_slot: usize,
    pub at_bat: Option<CurrentAtBat>,
}

impl GameState {
    pub fn new() -> GameState {
        GameState {
            inning: 1,
            half: Half::Top,
            outs: 0,
            count: Count::default(),
            bases: [None; 3],
            home_score: 0,
            away_score: 0,
            home_slot: 0,
            away_slot: 0,
            at_bat: None,
        }
    }

    pub fn is_inning_over(&self) -> bool {
        self.outs >= 3
    }

    /// Whether the game has reached a terminal state. Checked between
    /// plate appearances and again when a half-inning completes, before
    /// the state advances to the next half: a walk-off ends the bottom
    /// mid-inning, while the top half can only decide the game once its
    /// three outs are in. `cap_innings` bounds pathological extra-inning
    /// games; a capped game may end tied.
    pub fn is_game_over(&self, cap_innings: u32) -> bool {
        if self.inning > cap_innings {
            return true;
        }
        if self.inning < 9 {
            return false;
        }
        match self.half {
            // A completed top half only ends the game when the home team
            // already leads (the bottom is skipped); trailing or tied,
            // the home team still gets its turn at bat.
            Half::Top => self.is_inning_over() && self.home_score > self.away_score,
            // Home leading in the bottom is a walk-off; a finished
            // bottom with the away team ahead ends it too.
            Half::Bottom => {
                self.home_score > self.away_score
                    || (self.is_inning_over() && self.home_score != self.away_score)
            }
        }
    }

    /// Ends the current half-inning: clears bases, outs, and count, and
    /// flips to the other half (or the next inning).
    pub fn advance_inning(&mut self) {
        self.bases = [None; 3];
        self.outs = 0;
        self.count = Count::default();
        self.at_bat = None;
        match self.half {
            Half::Top => self.half = Half::Bottom,
            Half::Bottom => {
                self.half = Half::Top;
                self.inning += 1;
            }
        }
    }

    pub fn batting_slot(&mut self) -> &mut usize {
        match self.half {
            Half::Top => &mut self.away_slot,
            Half::Bottom => &mut self.home_slot,
        }
    }

    fn credit_run(&mut self, runs: u32) {
        match self.half {
            Half::Top => self.away_score += runs,
            Half::Bottom => self.home_score += runs,
        }
    }

    pub fn runners_on(&self) -> u32 {
        self.bases.iter().filter(|base| base.is_some()).count() as u32
    }

    /// Scalar estimate of how much this plate appearance can swing the
    /// game. Grows with lateness and traffic on the bases, shrinks as
    /// the score gap opens. Exact constants are tuning, not contract;
    /// the shape (monotone in late innings and close games) is.
    pub fn leverage(&self) -> f64 {
        let diff = (self.home_score as f64 - self.away_score as f64).abs();
        let inning_weight = 0.5 + 0.5 * (self.inning.min(9) as f64 / 9.0)
            + 0.05 * self.inning.saturating_sub(9) as f64;
        let score_weight = 2.0 / (1.0 + diff);
        let base_weight = 1.0 + 0.2 * self.runners_on() as f64;
        inning_weight * score_weight * base_weight
    }

    // Base-advancement helpers. Each applies one sampled outcome for
    // `batter`, mutates bases/outs/score, and returns the runs scored.

    pub fn apply_single(&mut self, batter: Uuid, rng: &mut impl Rng) -> u32 {
        let mut runs = 0;
        let [first, second, third] = self.bases;

        if third.is_some() {
            runs += 1;
        }
        let mut new_third = None;
        if let Some(runner) = second {
            // Runner on second scores 85% of the time, else holds at third.
            if rng.gen::<f64>() < 0.85 {
                runs += 1;
            } else {
                new_third = Some(runner);
            }
        }
        let mut new_second = None;
        if let Some(runner) = first {
            // First-to-third happens when third is open for it.
            if new_third.is_none() && rng.gen::<f64>() < 0.15 {
                new_third = Some(runner);
            } else {
                new_second = Some(runner);
            }
        }

        self.bases = [Some(batter), new_second, new_third];
        self.credit_run(runs);
        runs
    }

    pub fn apply_double(&mut self, batter: Uuid, rng: &mut impl Rng) -> u32 {
        let mut runs = 0;
        let [first, second, third] = self.bases;

        if third.is_some() {
            runs += 1;
        }
        if second.is_some() {
            runs += 1;
        }
        let mut new_third = None;
        if let Some(runner) = first {
            if rng.gen::<f64>() < 0.75 {
                runs += 1;
            } else {
                new_third = Some(runner);
            }
        }

        self.bases = [None, Some(batter), new_third];
        self.credit_run(runs);
        runs
    }

    pub fn apply_triple(&mut self, batter: Uuid) -> u32 {
        let runs = self.runners_on();
        self.bases = [None, None, Some(batter)];
        self.credit_run(runs);
        runs
    }

    pub fn apply_home_run(&mut self, _batter: Uuid) -> u32 {
        let runs = self.runners_on() + 1;
        self.bases = [None; 3];
        self.credit_run(runs);
        runs
    }

    /// Walks and hit-by-pitches advance only forced runners.
    pub fn apply_walk(&mut self, batter: Uuid) -> u32 {
        let mut runs = 0;
        let [first, second, third] = self.bases;

        let (new_first, new_second, new_third) = match (first, second, third) {
            (Some(f), Some(s), Some(_)) => {
                runs += 1;
                (Some(batter), Some(f), Some(s))
            }
            (Some(f), Some(s), None) => (Some(batter), Some(f), Some(s)),
            (Some(f), None, t) => (Some(batter), Some(f), t),
            (None, s, t) => (Some(batter), s, t),
        };

        self.bases = [new_first, new_second, new_third];
        self.credit_run(runs);
        runs
    }

    /// Strikeouts and balls in play that are caught: runners hold.
    pub fn apply_out(&mut self) {
        self.outs += 1;
    }
}

impl Default for GameState {
    fn default() -> GameState {
        GameState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn runner() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn fresh_state() {
        let state = GameState::new();
        assert_eq!(state.inning, 1);
        assert_eq!(state.half, Half::Top);
        assert_eq!(state.outs, 0);
        assert_eq!(state.bases, [None; 3]);
        assert_eq!((state.home_score, state.away_score), (0, 0));
        assert!(!state.is_game_over(30));
    }

    #[test]
    fn three_outs_end_the_half() {
        let mut state = GameState::new();
        state.apply_out();
        state.apply_out();
        assert!(!state.is_inning_over());
        state.apply_out();
        assert!(state.is_inning_over());
    }

    #[test]
    fn advance_inning_flips_halves_and_resets() {
        let mut state = GameState::new();
        state.bases[0] = Some(runner());
        state.outs = 3;
        state.advance_inning();
        assert_eq!(state.half, Half::Bottom);
        assert_eq!(state.inning, 1);
        assert_eq!(state.bases, [None; 3]);
        assert_eq!(state.outs, 0);

        state.advance_inning();
        assert_eq!(state.half, Half::Top);
        assert_eq!(state.inning, 2);
    }

    #[test]
    fn away_win_detected_when_bottom_ninth_completes() {
        let mut state = GameState::new();
        state.inning = 9;
        state.half = Half::Bottom;
        state.outs = 3;
        state.away_score = 4;
        state.home_score = 2;
        assert!(state.is_game_over(30));

        // Tied after nine: extra innings.
        state.home_score = 4;
        assert!(!state.is_game_over(30));
    }

    #[test]
    fn home_lead_after_completed_top_ninth_skips_the_bottom() {
        let mut state = GameState::new();
        state.inning = 9;
        state.half = Half::Top;
        state.outs = 3;
        state.home_score = 5;
        state.away_score = 3;
        assert!(state.is_game_over(30));

        // Away ahead after the top: the home team still bats.
        state.away_score = 7;
        assert!(!state.is_game_over(30));
    }

    #[test]
    fn away_lead_in_extra_top_half_does_not_end_the_game() {
        // The away team scoring first in the 10th must not end the game
        // mid-half, nor before the home team gets its bottom half.
        let mut state = GameState::new();
        state.inning = 10;
        state.half = Half::Top;
        state.outs = 1;
        state.away_score = 3;
        state.home_score = 2;
        assert!(!state.is_game_over(30));

        // Even with the top complete, the home half is still to come.
        state.outs = 3;
        assert!(!state.is_game_over(30));
    }

    #[test]
    fn home_lead_in_bottom_ninth_ends_game() {
        let mut state = GameState::new();
        state.inning = 9;
        state.half = Half::Bottom;
        state.home_score = 5;
        state.away_score = 3;
        assert!(state.is_game_over(30));

        // Away leading in the bottom: play on.
        state.home_score = 2;
        assert!(!state.is_game_over(30));
    }

    #[test]
    fn walkoff_mid_inning() {
        let mut state = GameState::new();
        state.inning = 11;
        state.half = Half::Bottom;
        state.home_score = 3;
        state.away_score = 3;
        state.outs = 1;
        assert!(!state.is_game_over(30));

        let mut rng = StdRng::seed_from_u64(7);
        state.bases[2] = Some(runner());
        state.apply_single(runner(), &mut rng);
        assert_eq!(state.home_score, 4);
        assert!(state.is_game_over(30));
    }

    #[test]
    fn inning_cap_forces_termination() {
        let mut state = GameState::new();
        state.inning = 31;
        state.half = Half::Top;
        state.home_score = 2;
        state.away_score = 2;
        assert!(state.is_game_over(30));
        assert!(!state.is_game_over(40));
    }

    #[test]
    fn single_scores_third_batter_to_first() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = GameState::new();
        let on_third = runner();
        let batter = runner();
        state.bases[2] = Some(on_third);

        let runs = state.apply_single(batter, &mut rng);
        assert_eq!(runs, 1);
        assert_eq!(state.away_score, 1);
        assert_eq!(state.bases[0], Some(batter));
        assert_eq!(state.bases[2], None);
    }

    #[test]
    fn double_always_scores_second_and_third() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = GameState::new();
        state.bases[1] = Some(runner());
        state.bases[2] = Some(runner());
        let batter = runner();

        let runs = state.apply_double(batter, &mut rng);
        assert_eq!(runs, 2);
        assert_eq!(state.bases[1], Some(batter));
        assert_eq!(state.bases[0], None);
    }

    #[test]
    fn double_with_runner_on_first_takes_both_branches() {
        // Across many seeded draws the runner from first must sometimes
        // score (p=0.75) and sometimes hold at third.
        let mut scored = 0;
        let mut held = 0;
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut state = GameState::new();
            let on_first = runner();
            state.bases[0] = Some(on_first);
            let runs = state.apply_double(runner(), &mut rng);
            if runs == 1 {
                scored += 1;
                assert_eq!(state.bases[2], None);
            } else {
                held += 1;
                assert_eq!(state.bases[2], Some(on_first));
            }
        }
        assert!(scored > held, "{} scored vs {} held", scored, held);
        assert!(held > 0);
    }

    #[test]
    fn triple_clears_the_bases() {
        let mut state = GameState::new();
        state.bases = [Some(runner()), Some(runner()), Some(runner())];
        let batter = runner();
        let runs = state.apply_triple(batter);
        assert_eq!(runs, 3);
        assert_eq!(state.bases, [None, None, Some(batter)]);
    }

    #[test]
    fn grand_slam_counts_four() {
        let mut state = GameState::new();
        state.half = Half::Bottom;
        state.bases = [Some(runner()), Some(runner()), Some(runner())];
        let runs = state.apply_home_run(runner());
        assert_eq!(runs, 4);
        assert_eq!(state.home_score, 4);
        assert_eq!(state.bases, [None; 3]);
    }

    #[test]
    fn walk_advances_only_forced_runners() {
        // Runner on second, first open: nobody is forced.
        let mut state = GameState::new();
        let on_second = runner();
        state.bases[1] = Some(on_second);
        let batter = runner();
        assert_eq!(state.apply_walk(batter), 0);
        assert_eq!(state.bases[0], Some(batter));
        assert_eq!(state.bases[1], Some(on_second));
        assert_eq!(state.bases[2], None);

        // Bases loaded: everyone moves up, one run forced in.
        let mut state = GameState::new();
        let (a, b, c) = (runner(), runner(), runner());
        state.bases = [Some(a), Some(b), Some(c)];
        let batter = runner();
        assert_eq!(state.apply_walk(batter), 1);
        assert_eq!(state.bases, [Some(batter), Some(a), Some(b)]);
        assert_eq!(state.away_score, 1);
    }

    #[test]
    fn walk_with_first_and_third_holds_third() {
        let mut state = GameState::new();
        let (on_first, on_third) = (runner(), runner());
        state.bases = [Some(on_first), None, Some(on_third)];
        let batter = runner();
        assert_eq!(state.apply_walk(batter), 0);
        assert_eq!(state.bases, [Some(batter), Some(on_first), Some(on_third)]);
    }

    #[test]
    fn leverage_monotone_in_lateness_and_closeness() {
        let mut early = GameState::new();
        early.inning = 2;
        let mut late = early.clone();
        late.inning = 9;
        assert!(late.leverage() > early.leverage());

        let mut close = GameState::new();
        close.inning = 9;
        close.home_score = 3;
        close.away_score = 3;
        let mut blowout = close.clone();
        blowout.away_score = 9;
        assert!(close.leverage() > blowout.leverage());

        let mut loaded = close.clone();
        loaded.bases = [Some(runner()), Some(runner()), Some(runner())];
        assert!(loaded.leverage() > close.leverage());
        assert!(loaded.leverage() >= 1.5);
    }

    #[test]
    fn scores_never_decrease() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut state = GameState::new();
        let mut last = (0, 0);
        for i in 0..200 {
            match i % 5 {
                0 => {
                    state.apply_single(runner(), &mut rng);
                }
                1 => {
                    state.apply_walk(runner());
                }
                2 => {
                    state.apply_home_run(runner());
                }
                3 => {
                    state.apply_double(runner(), &mut rng);
                }
                _ => {
                    state.apply_out();
                    if state.is_inning_over() {
                        state.advance_inning();
                    }
                }
            }
            let now = (state.home_score, state.away_score);
            assert!(now.0 >= last.0 && now.1 >= last.1);
            last = now;
        }
    }
}

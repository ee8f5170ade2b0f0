pub mod context;
pub mod game;
pub mod player;
pub mod roster;
pub mod sampler;
pub mod trial;

pub use context::{GameContext, GameRecord, ParkFactors, RoofType, Stadium, TeamInfo, Umpire, UmpireTendencies};
pub use game::{GameState, Half, Winner};
pub use player::{Handedness, PaOutcome, PitchingRates, Player, PlayerRole, RateBlock};
pub use roster::Roster;
pub use trial::{run_trial, trial_rng, BattingLine, KeyEvent, PitchingLine, TrialResult};

use rand::Rng;

use crate::sim::context::{ParkFactors, UmpireTendencies};
use crate::sim::game::Half;
use crate::sim::player::{PaOutcome, Player, RateBlock};
use crate::weather::{Weather, WindDirection};

/// Everything that shapes one plate appearance besides the two players.
#[derive(Clone, Copy, Debug)]
pub struct Situation<'a> {
    pub weather: &'a Weather,
    pub park: &'a ParkFactors,
    pub umpire: &'a UmpireTendencies,
    /// Which half is being played; the umpire's home-team favor works
    /// for the pitcher in the top half and against them in the bottom.
    pub half: Half,
}

/// Blends batter and pitcher per-PA rates with the odds-ratio method:
/// `expected_o = batter_o * pitcher_o / league_o`, normalized. A batter
/// facing a league-average pitcher reduces to their own rates.
fn blend_rates(batter: &RateBlock, pitcher: &RateBlock) -> [f64; 8] {
    let league = RateBlock::league_average();
    let mut rates = [0.0; 8];
    for (i, outcome) in PaOutcome::ALL.iter().enumerate() {
        let league_rate = league.rate(*outcome).max(1e-9);
        rates[i] = batter.rate(*outcome) * pitcher.rate(*outcome) / league_rate;
    }
    rates
}

fn rate_mut<'a>(rates: &'a mut [f64; 8], outcome: PaOutcome) -> &'a mut f64 {
    let index = PaOutcome::ALL
        .iter()
        .position(|&o| o == outcome)
        .unwrap_or(0);
    &mut rates[index]
}

/// Un-normalized outcome weights after every modifier. Exposed within
/// the crate so tests can assert on modifier direction without
/// statistics.
pub(crate) fn adjusted_rates(
    batter: &Player,
    pitcher: &Player,
    situation: &Situation<'_>,
) -> [f64; 8] {
    let mut rates = blend_rates(&batter.rates, &pitcher.allowed_rates());

    // Park factors, with the HR split by batter handedness if present.
    let side = batter.bats.effective_side(pitcher.throws);
    *rate_mut(&mut rates, PaOutcome::HomeRun) *= situation.park.home_run_for(side);
    *rate_mut(&mut rates, PaOutcome::Double) *= situation.park.double;
    *rate_mut(&mut rates, PaOutcome::Triple) *= situation.park.triple;
    *rate_mut(&mut rates, PaOutcome::Single) *= situation.park.hits;

    // Wind moves home runs; heat livens the whole ball.
    let weather = situation.weather;
    match weather.wind_direction {
        WindDirection::Out => {
            *rate_mut(&mut rates, PaOutcome::HomeRun) *= 1.0 + 0.02 * weather.wind_speed;
        }
        WindDirection::In => {
            *rate_mut(&mut rates, PaOutcome::HomeRun) /= 1.0 + 0.02 * weather.wind_speed;
        }
        _ => {}
    }
    if weather.temperature > 80.0 {
        let heat = 1.0 + 0.003 * (weather.temperature - 80.0);
        for outcome in [
            PaOutcome::Single,
            PaOutcome::Double,
            PaOutcome::Triple,
            PaOutcome::HomeRun,
        ] {
            *rate_mut(&mut rates, outcome) *= heat;
        }
    }
    // Thin, dry air carries; the combined effect stays within 3%.
    let pressure_factor = (1.0 + 0.01 * (29.92 - weather.pressure) / 29.92)
        .clamp(0.985, 1.015);
    let humidity_factor = (1.0 + 0.0002 * (50.0 - weather.humidity)).clamp(0.985, 1.015);
    *rate_mut(&mut rates, PaOutcome::HomeRun) *= pressure_factor * humidity_factor;

    // Umpire: a bigger zone trades walks for strikeouts; home-team favor
    // biases that trade toward whichever team is pitching at home.
    let umpire = situation.umpire;
    let favor = match situation.half {
        Half::Top => umpire.home_team_favor,
        Half::Bottom => -umpire.home_team_favor,
    };
    let zone_shift = 1.0 + (umpire.zone_expansion + favor) * 0.05;
    *rate_mut(&mut rates, PaOutcome::Strikeout) *= zone_shift.max(0.0);
    *rate_mut(&mut rates, PaOutcome::Walk) /= zone_shift.max(1e-9);

    // Platoon: same-side matchups favor the pitcher.
    if side == pitcher.throws {
        *rate_mut(&mut rates, PaOutcome::Strikeout) *= 1.05;
        for outcome in [
            PaOutcome::Single,
            PaOutcome::Double,
            PaOutcome::Triple,
            PaOutcome::HomeRun,
        ] {
            *rate_mut(&mut rates, outcome) *= 0.95;
        }
    } else {
        *rate_mut(&mut rates, PaOutcome::Strikeout) /= 1.05;
        for outcome in [
            PaOutcome::Single,
            PaOutcome::Double,
            PaOutcome::Triple,
            PaOutcome::HomeRun,
        ] {
            *rate_mut(&mut rates, outcome) /= 0.95;
        }
    }

    rates
}

/// Draws the outcome of one plate appearance. Deterministic for a given
/// RNG state and inputs.
pub fn sample_outcome(
    batter: &Player,
    pitcher: &Player,
    situation: &Situation<'_>,
    rng: &mut impl Rng,
) -> PaOutcome {
    let rates = adjusted_rates(batter, pitcher, situation);
    let total: f64 = rates.iter().sum();

    let roll = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, outcome) in PaOutcome::ALL.iter().enumerate() {
        cumulative += rates[i];
        if roll < cumulative {
            return *outcome;
        }
    }
    // Floating-point edge: the roll landed exactly on the upper bound.
    PaOutcome::InPlayOut
}

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use itertools::Itertools;
use log::warn;
use uuid::Uuid;

use crate::db_types::RunStatus;
use crate::error::{SimError, SimResult};
use crate::schema::{games, players, simulation_aggregates, simulation_results, simulation_runs, stadiums, teams, umpires};
use crate::sim::context::{GameRecord, RoofType, Stadium, TeamInfo, Umpire, UmpireTendencies};
use crate::sim::player::{Handedness, Player, PlayerRole, RateBlock};
use crate::sim::roster::Roster;
use crate::state::models::{AggregateRow, GameRow, PlayerRow, Run, StadiumRow, TeamRow, TrialRow, UmpireRow};

/// Trial inserts are chunked to bound round-trips. Callers never mix
/// runs within one `persist_trial_results` call, so batches can't cross
/// runs either.
pub const TRIAL_INSERT_BATCH: usize = 100;

/// Typed access to everything the simulator reads and writes. Wraps one
/// checked-out connection; obtained inside `SimDb::run` closures.
pub struct StateInterface<'conn> {
    conn: &'conn mut PgConnection,
}

impl<'conn> StateInterface<'conn> {
    pub fn new(conn: &'conn mut PgConnection) -> StateInterface<'conn> {
        StateInterface { conn }
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn ping(&mut self) -> SimResult<()> {
        diesel::sql_query("SELECT 1")
            .execute(&mut *self.conn)
            .map_err(|err| SimError::Unavailable(err.to_string()))?;
        Ok(())
    }

    /// Resolves a scheduled game into its teams, stadium, and umpire.
    pub fn load_game(&mut self, game_id: &str) -> SimResult<GameRecord> {
        let game: GameRow = games::table
            .find(game_id)
            .first(&mut *self.conn)
            .optional()?
            .ok_or_else(|| SimError::not_found(format!("game {}", game_id)))?;

        let home_team = self.load_team(game.home_team_id)?;
        let away_team = self.load_team(game.away_team_id)?;

        let stadium_row: StadiumRow = stadiums::table
            .find(game.stadium_id)
            .first(&mut *self.conn)
            .optional()?
            .ok_or_else(|| {
                SimError::DataCorrupt(format!("game {} references a missing stadium", game.id))
            })?;
        let stadium = stadium_from_row(stadium_row)?;

        let umpire = match game.umpire_id {
            Some(umpire_id) => {
                let row: Option<UmpireRow> = umpires::table
                    .find(umpire_id)
                    .first(&mut *self.conn)
                    .optional()?;
                match row {
                    Some(row) => umpire_from_row(row)?,
                    None => Umpire::neutral(),
                }
            }
            None => Umpire::neutral(),
        };

        Ok(GameRecord {
            id: game.id,
            home_team,
            away_team,
            stadium,
            umpire,
            scheduled_at: game.scheduled_at,
        })
    }

    fn load_team(&mut self, team_id: Uuid) -> SimResult<TeamInfo> {
        let team: TeamRow = teams::table
            .find(team_id)
            .first(&mut *self.conn)
            .optional()?
            .ok_or_else(|| SimError::not_found(format!("team {}", team_id)))?;
        Ok(TeamInfo {
            id: team.id,
            name: team.name,
            abbreviation: team.abbreviation,
        })
    }

    /// Loads the batting order and starter for a team. Players with no
    /// seasonal rates get the league-average block and are marked
    /// `defaulted`.
    pub fn load_roster(&mut self, team_id: Uuid) -> SimResult<Roster> {
        let team: TeamRow = teams::table
            .find(team_id)
            .first(&mut *self.conn)
            .optional()?
            .ok_or_else(|| SimError::not_found(format!("team {}", team_id)))?;

        let rows: Vec<PlayerRow> = players::table
            .filter(players::team_id.eq(team_id))
            .load(&mut *self.conn)?;

        let batters: Vec<Player> = rows
            .iter()
            .filter_map(|row| row.lineup_slot.map(|slot| (slot, row)))
            .sorted_by_key(|(slot, _)| *slot)
            .map(|(_, row)| player_from_row(row))
            .collect::<SimResult<_>>()?;

        let starter_row = rows
            .iter()
            .find(|row| row.is_starting_pitcher)
            .ok_or_else(|| {
                SimError::DataCorrupt(format!("team {} has no starting pitcher", team.name))
            })?;
        let starter = player_from_row(starter_row)?;

        let bullpen = rows
            .iter()
            .filter(|row| {
                row.role == "pitcher" && !row.is_starting_pitcher && row.lineup_slot.is_none()
            })
            .map(player_from_row)
            .collect::<SimResult<_>>()?;

        let roster = Roster {
            team_id,
            team_name: team.name,
            batters,
            starter,
            bullpen,
        };
        roster.validate()?;
        if roster.any_defaulted() {
            warn!(
                "roster for {} includes players with league-average default rates",
                roster.team_name
            );
        }
        Ok(roster)
    }

    /// Inserts a `pending` run record. A duplicate run id is a
    /// `Conflict` and leaves the original untouched.
    pub fn create_run(&mut self, run: &Run) -> SimResult<()> {
        match diesel::insert_into(simulation_runs::table)
            .values(run)
            .execute(&mut *self.conn)
        {
            Ok(_) => Ok(()),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(SimError::Conflict(run.run_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies a status transition, rejecting anything non-monotonic.
    /// Terminal transitions stamp `completed_at`.
    pub fn update_run_status(&mut self, run_id: Uuid, next: RunStatus) -> SimResult<()> {
        self.conn.transaction::<_, SimError, _>(|conn| {
            let current: RunStatus = simulation_runs::table
                .find(run_id)
                .select(simulation_runs::status)
                .for_update()
                .first(conn)
                .optional()?
                .ok_or_else(|| SimError::not_found(format!("simulation run {}", run_id)))?;

            if !current.can_transition_to(next) {
                return Err(SimError::Internal(format!(
                    "illegal run status transition {} -> {}",
                    current, next
                )));
            }

            if next.is_terminal() {
                diesel::update(simulation_runs::table.find(run_id))
                    .set((
                        simulation_runs::status.eq(next),
                        simulation_runs::completed_at.eq(Some(Utc::now())),
                    ))
                    .execute(conn)?;
            } else {
                diesel::update(simulation_runs::table.find(run_id))
                    .set(simulation_runs::status.eq(next))
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    /// Bumps the completed-trial counter without touching status.
    pub fn update_progress(&mut self, run_id: Uuid, completed: i32) -> SimResult<()> {
        diesel::update(simulation_runs::table.find(run_id))
            .set(simulation_runs::completed_runs.eq(completed))
            .execute(&mut *self.conn)?;
        Ok(())
    }

    /// Append-only, idempotent on `(run_id, trial_number)`: replayed
    /// batches after a retry are absorbed by the conflict target.
    pub fn persist_trial_results(&mut self, rows: &[TrialRow]) -> SimResult<()> {
        for chunk in rows.chunks(TRIAL_INSERT_BATCH) {
            diesel::insert_into(simulation_results::table)
                .values(chunk)
                .on_conflict((
                    simulation_results::run_id,
                    simulation_results::trial_number,
                ))
                .do_nothing()
                .execute(&mut *self.conn)?;
        }
        Ok(())
    }

    /// One aggregate per run; a retried write after a partial failure is
    /// a no-op.
    pub fn persist_aggregate(&mut self, row: &AggregateRow) -> SimResult<()> {
        diesel::insert_into(simulation_aggregates::table)
            .values(row)
            .on_conflict(simulation_aggregates::run_id)
            .do_nothing()
            .execute(&mut *self.conn)?;
        Ok(())
    }

    pub fn get_run(&mut self, run_id: Uuid) -> SimResult<Run> {
        simulation_runs::table
            .find(run_id)
            .first(&mut *self.conn)
            .optional()?
            .ok_or_else(|| SimError::not_found(format!("simulation run {}", run_id)))
    }

    pub fn get_aggregate(&mut self, run_id: Uuid) -> SimResult<AggregateRow> {
        simulation_aggregates::table
            .filter(simulation_aggregates::run_id.eq(run_id))
            .first(&mut *self.conn)
            .optional()?
            .ok_or_else(|| SimError::not_found(format!("aggregate for run {}", run_id)))
    }

    pub fn get_trial_results(&mut self, run_id: Uuid) -> SimResult<Vec<TrialRow>> {
        Ok(simulation_results::table
            .filter(simulation_results::run_id.eq(run_id))
            .order(simulation_results::trial_number.asc())
            .load(&mut *self.conn)?)
    }

    /// Game ids scheduled on a calendar day, in first-pitch order.
    pub fn list_scheduled_games(&mut self, date: NaiveDate) -> SimResult<Vec<String>> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc();
        let end = start + chrono::Duration::days(1);
        Ok(games::table
            .filter(games::scheduled_at.ge(start))
            .filter(games::scheduled_at.lt(end))
            .order(games::scheduled_at.asc())
            .select(games::id)
            .load(&mut *self.conn)?)
    }
}

fn stadium_from_row(row: StadiumRow) -> SimResult<Stadium> {
    Ok(Stadium {
        id: row.id,
        name: row.name,
        latitude: row.latitude,
        longitude: row.longitude,
        altitude_feet: row.altitude_feet,
        roof: RoofType::parse(&row.roof_type)?,
        park_factors: serde_json::from_value(row.park_factors)?,
    })
}

fn umpire_from_row(row: UmpireRow) -> SimResult<Umpire> {
    let tendencies: UmpireTendencies = serde_json::from_value(row.tendencies)?;
    Ok(Umpire {
        id: row.id,
        name: row.name,
        tendencies,
    })
}

fn player_from_row(row: &PlayerRow) -> SimResult<Player> {
    let bats = Handedness::parse(&row.bats)?;
    let throws = Handedness::parse(&row.throws)?;
    if throws == Handedness::Switch {
        return Err(SimError::DataCorrupt(format!(
            "player {} throws with both hands",
            row.name
        )));
    }
    let role = PlayerRole::parse(&row.role)?;

    let mut defaulted = false;
    let rates = match &row.rates {
        Some(value) => {
            let block: RateBlock = serde_json::from_value(value.clone())?;
            block.validate().map_err(|err| {
                SimError::DataCorrupt(format!("{}: {}", row.name, err))
            })?;
            block.normalized()
        }
        None => {
            if role != PlayerRole::Pitcher {
                defaulted = true;
            }
            RateBlock::league_average()
        }
    };

    let pitching = match &row.pitching_rates {
        Some(value) => Some(serde_json::from_value(value.clone())?),
        None => {
            if role != PlayerRole::Batter {
                defaulted = true;
            }
            None
        }
    };

    Ok(Player {
        id: row.id,
        name: row.name.clone(),
        bats,
        throws,
        position: row.position.clone(),
        role,
        rates,
        pitching,
        defaulted,
    })
}

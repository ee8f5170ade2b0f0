use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use log::{error, info, warn};
use rocket::{Orbit, Rocket};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::coordinator::aggregate::{Aggregate, AggregateAccumulator};
use crate::db::SimDb;
use crate::db_types::RunStatus;
use crate::error::{SimError, SimResult};
use crate::sim::context::{GameContext, ParkFactors, TeamInfo, UmpireTendencies};
use crate::sim::trial::{run_trial, trial_rng, TrialResult};
use crate::state::models::{AggregateRow, Run, TrialRow};
use crate::state::StateInterface;
use crate::weather::{Weather, WeatherService};

pub mod aggregate;

/// Request-scoped deadlines per call class.
pub const HEALTH_DEADLINE: Duration = Duration::from_secs(2);
const LOAD_DEADLINE: Duration = Duration::from_secs(10);
const WRITE_DEADLINE: Duration = Duration::from_secs(60);

/// Write-behind buffer flushes at whichever of these trips first.
const FLUSH_THRESHOLD: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

const WRITE_RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(400),
    Duration::from_millis(1600),
];

const MAX_TRIALS_PER_RUN: u32 = 100_000;

/// Per-run knobs accepted on the `config` request field. Unknown keys
/// are ignored for forward compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub trial_cap_innings: u32,
    pub error_rate_tolerance: f64,
    pub persist_trials: bool,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            trial_cap_innings: 30,
            error_rate_tolerance: 0.10,
            persist_trials: true,
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn from_value(value: Option<&serde_json::Value>) -> SimResult<RunConfig> {
        match value {
            None => Ok(RunConfig::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| SimError::Validation(format!("bad config: {}", err))),
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.trial_cap_innings < 9 {
            return Err(SimError::Validation(
                "trial_cap_innings must be at least 9".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.error_rate_tolerance) {
            return Err(SimError::Validation(
                "error_rate_tolerance must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn validate_trial_count(total_trials: u32) -> SimResult<()> {
    if total_trials == 0 {
        return Err(SimError::Validation(
            "simulation_runs must be positive".to_string(),
        ));
    }
    if total_trials > MAX_TRIALS_PER_RUN {
        return Err(SimError::Validation(format!(
            "simulation_runs must be at most {}",
            MAX_TRIALS_PER_RUN
        )));
    }
    Ok(())
}

/// Live view of one run. The completed counter is bumped by the
/// aggregator; everything else changes only at status transitions.
pub struct RunProgress {
    pub run_id: Uuid,
    pub game_id: String,
    pub total: u32,
    pub completed: AtomicU32,
    status: StdMutex<RunStatus>,
    pub created_at: DateTime<Utc>,
    completed_at: StdMutex<Option<DateTime<Utc>>>,
    context: StdMutex<Option<Arc<GameContext>>>,
}

impl RunProgress {
    fn new(run_id: Uuid, game_id: String, total: u32, created_at: DateTime<Utc>) -> RunProgress {
        RunProgress {
            run_id,
            game_id,
            total,
            completed: AtomicU32::new(0),
            status: StdMutex::new(RunStatus::Pending),
            created_at,
            completed_at: StdMutex::new(None),
            context: StdMutex::new(None),
        }
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock().unwrap() = status;
        if status.is_terminal() {
            *self.completed_at.lock().unwrap() = Some(Utc::now());
        }
    }

    fn set_context(&self, context: Arc<GameContext>) {
        *self.context.lock().unwrap() = Some(context);
    }

    fn context(&self) -> Option<Arc<GameContext>> {
        self.context.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let completed = self.completed.load(Ordering::SeqCst).min(self.total);
        RunSnapshot {
            run_id: self.run_id,
            game_id: self.game_id.clone(),
            status: self.status(),
            total_runs: self.total,
            completed_runs: completed,
            progress: if self.total == 0 {
                0.0
            } else {
                completed as f64 / self.total as f64
            },
            created_at: self.created_at,
            completed_at: *self.completed_at.lock().unwrap(),
        }
    }
}

/// Point-in-time status of a run, shaped for the status endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub game_id: String,
    pub status: RunStatus,
    pub total_runs: u32,
    pub completed_runs: u32,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    fn from_run(run: &Run) -> RunSnapshot {
        RunSnapshot {
            run_id: run.run_id,
            game_id: run.game_id.clone(),
            status: run.status,
            total_runs: run.total_runs.max(0) as u32,
            completed_runs: run.completed_runs.max(0) as u32,
            progress: if run.total_runs <= 0 {
                0.0
            } else {
                run.completed_runs.max(0) as f64 / run.total_runs as f64
            },
            created_at: run.created_at,
            completed_at: run.completed_at,
        }
    }
}

/// Context block joined onto a completed run's aggregate.
#[derive(Clone, Debug, Serialize)]
pub struct ContextView {
    pub home_team: TeamInfo,
    pub away_team: TeamInfo,
    pub stadium: String,
    pub park_factors: ParkFactors,
    pub umpire: String,
    pub umpire_tendencies: UmpireTendencies,
    pub weather: Weather,
    pub scheduled_at: DateTime<Utc>,
}

impl ContextView {
    fn from_context(context: &GameContext) -> ContextView {
        ContextView {
            home_team: context.home_team.clone(),
            away_team: context.away_team.clone(),
            stadium: context.stadium.name.clone(),
            park_factors: context.stadium.park_factors.clone(),
            umpire: context.umpire.name.clone(),
            umpire_tendencies: context.umpire.tendencies,
            weather: context.weather,
            scheduled_at: context.scheduled_at,
        }
    }
}

/// Payload for the result endpoint: the persisted aggregate plus the
/// context it was simulated under.
#[derive(Clone, Debug, Serialize)]
pub struct SimulationResult {
    pub run_id: Uuid,
    pub game_id: String,
    pub status: RunStatus,
    pub total_simulations: u32,
    pub aggregate: Aggregate,
    pub context: ContextView,
}

pub enum ResultOutcome {
    /// Run exists but hasn't completed; callers answer 202.
    NotReady(RunSnapshot),
    Ready(Box<SimulationResult>),
}

#[derive(Clone, Debug, Serialize)]
pub struct DailyEntry {
    pub game_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DailyBatch {
    pub date: String,
    pub games_count: usize,
    pub simulations: Vec<DailyEntry>,
}

/// Owns every live run: fans trials out over a worker pool, aggregates
/// results, and persists them. Managed as Rocket state; the run map and
/// the weather cache are the only process-wide mutable state.
pub struct SimCoordinator {
    runs: RwLock<HashMap<Uuid, Arc<RunProgress>>>,
    weather: Arc<WeatherService>,
    workers: usize,
    default_trials: u32,
    shutdown_tx: watch::Sender<bool>,
}

impl SimCoordinator {
    pub fn new(weather: Arc<WeatherService>, workers: usize, default_trials: u32) -> SimCoordinator {
        let (shutdown_tx, _) = watch::channel(false);
        SimCoordinator {
            runs: RwLock::new(HashMap::new()),
            weather,
            workers: workers.max(1),
            default_trials,
            shutdown_tx,
        }
    }

    pub fn default_trials(&self) -> u32 {
        self.default_trials
    }

    /// Receiver for the process-wide shutdown signal; also used by the
    /// weather cache sweeper.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Validates and registers a new run, then spawns the detached run
    /// loop and returns. The `db` handle is a pooled connection that the
    /// run loop keeps for its lifetime, the way an ingest task would.
    pub async fn start(
        &self,
        db: SimDb,
        game_id: String,
        total_trials: u32,
        config: RunConfig,
    ) -> SimResult<(Uuid, DateTime<Utc>)> {
        validate_trial_count(total_trials)?;
        config.validate()?;
        if *self.shutdown_tx.borrow() {
            return Err(SimError::Unavailable("shutting down".to_string()));
        }

        // Resolve the game first so an unknown id leaves no residue.
        let record = {
            let game_id = game_id.clone();
            run_with_deadline(&db, LOAD_DEADLINE, move |mut state| state.load_game(&game_id)).await?
        };

        let run_id = Uuid::new_v4();
        let created_at = Utc::now();
        let run_row = Run {
            run_id,
            game_id: game_id.clone(),
            config: serde_json::to_value(config).unwrap_or(serde_json::Value::Null),
            total_runs: total_trials as i32,
            completed_runs: 0,
            status: RunStatus::Pending,
            created_at,
            completed_at: None,
        };
        run_with_deadline(&db, WRITE_DEADLINE, move |mut state| state.create_run(&run_row)).await?;

        let progress = Arc::new(RunProgress::new(run_id, game_id.clone(), total_trials, created_at));
        self.runs
            .write()
            .unwrap()
            .insert(run_id, progress.clone());

        let home_team_id = record.home_team.id;
        let away_team_id = record.away_team.id;
        let rosters = run_with_deadline(&db, LOAD_DEADLINE, move |mut state| {
            let home = state.load_roster(home_team_id)?;
            let away = state.load_roster(away_team_id)?;
            Ok((home, away))
        })
        .await;
        let (home_roster, away_roster) = match rosters {
            Ok(rosters) => rosters,
            Err(err) => {
                error!("run {}: context load failed: {}", run_id, err);
                self.fail_run(&db, &progress).await;
                return Err(err);
            }
        };

        run_with_deadline(&db, WRITE_DEADLINE, move |mut state| {
            state.update_run_status(run_id, RunStatus::Running)
        })
        .await?;
        progress.set_status(RunStatus::Running);

        // Weather trouble never fails a run; the service degrades to
        // seasonal defaults internally.
        let weather = self.weather.forecast(&record.stadium, record.scheduled_at).await;

        let context = Arc::new(GameContext::from_parts(
            record,
            home_roster,
            away_roster,
            weather,
        ));
        progress.set_context(context.clone());

        let master_seed = config.seed.unwrap_or_else(rand::random);
        info!(
            "run {}: starting {} trials of {} with {} workers (seed {})",
            run_id, total_trials, game_id, self.workers, master_seed
        );

        let workers = self.workers;
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(run_loop(
            db,
            context,
            progress,
            config,
            master_seed,
            workers,
            shutdown_rx,
        ));

        Ok((run_id, created_at))
    }

    /// In-memory snapshot when the run is live in this process, with a
    /// repository fallback so status survives restarts.
    pub async fn get_status(&self, db: &SimDb, run_id: Uuid) -> SimResult<RunSnapshot> {
        if let Some(progress) = self.runs.read().unwrap().get(&run_id).cloned() {
            return Ok(progress.snapshot());
        }
        let run = run_with_deadline(db, LOAD_DEADLINE, move |mut state| state.get_run(run_id)).await?;
        Ok(RunSnapshot::from_run(&run))
    }

    /// The persisted aggregate, enriched with game context. A run that
    /// exists but hasn't completed reports `NotReady`.
    pub async fn get_result(&self, db: &SimDb, run_id: Uuid) -> SimResult<ResultOutcome> {
        let snapshot = self.get_status(db, run_id).await?;
        match snapshot.status {
            RunStatus::Pending | RunStatus::Running => {
                return Ok(ResultOutcome::NotReady(snapshot))
            }
            RunStatus::Error => {
                return Err(SimError::Internal(format!(
                    "simulation run {} failed",
                    run_id
                )))
            }
            RunStatus::Completed => {}
        }

        let aggregate_row =
            run_with_deadline(db, LOAD_DEADLINE, move |mut state| state.get_aggregate(run_id))
                .await
                .map_err(|err| match err {
                    // Completed without an aggregate is an internal
                    // inconsistency, not a client error.
                    SimError::NotFound(what) => SimError::Internal(format!("{} is missing", what)),
                    other => other,
                })?;
        let aggregate = aggregate_row.into_aggregate()?;

        let context_view = match self.cached_context(run_id) {
            Some(context) => ContextView::from_context(&context),
            None => self.rebuild_context_view(db, &snapshot.game_id).await?,
        };

        Ok(ResultOutcome::Ready(Box::new(SimulationResult {
            run_id,
            game_id: snapshot.game_id,
            status: RunStatus::Completed,
            total_simulations: aggregate.stats.total_simulations,
            aggregate,
            context: context_view,
        })))
    }

    fn cached_context(&self, run_id: Uuid) -> Option<Arc<GameContext>> {
        self.runs
            .read()
            .unwrap()
            .get(&run_id)
            .and_then(|progress| progress.context())
    }

    /// After a restart the in-memory context is gone; rebuild the view
    /// from the store. Dome weather re-derives identically, outdoor
    /// weather is re-forecast best-effort.
    async fn rebuild_context_view(&self, db: &SimDb, game_id: &str) -> SimResult<ContextView> {
        let record = {
            let game_id = game_id.to_string();
            run_with_deadline(db, LOAD_DEADLINE, move |mut state| state.load_game(&game_id)).await?
        };
        let weather = self.weather.forecast(&record.stadium, record.scheduled_at).await;
        Ok(ContextView {
            home_team: record.home_team,
            away_team: record.away_team,
            stadium: record.stadium.name,
            park_factors: record.stadium.park_factors,
            umpire: record.umpire.name,
            umpire_tendencies: record.umpire.tendencies,
            weather,
            scheduled_at: record.scheduled_at,
        })
    }

    /// One `start` per game scheduled on `date`. Individual failures are
    /// reported per entry without failing the batch.
    pub async fn start_daily(
        &self,
        rocket: &Rocket<Orbit>,
        date: NaiveDate,
        total_trials: u32,
        config: RunConfig,
    ) -> SimResult<DailyBatch> {
        validate_trial_count(total_trials)?;
        config.validate()?;

        let db = SimDb::get_one(rocket)
            .await
            .ok_or_else(|| SimError::Unavailable("no database connection available".to_string()))?;
        let game_ids =
            run_with_deadline(&db, LOAD_DEADLINE, move |mut state| state.list_scheduled_games(date))
                .await?;
        drop(db);

        let starts = game_ids.into_iter().map(|game_id| async move {
            let db = match SimDb::get_one(rocket).await {
                Some(db) => db,
                None => {
                    return DailyEntry {
                        game_id,
                        run_id: None,
                        status: "error".to_string(),
                        error: Some("no database connection available".to_string()),
                    }
                }
            };
            match self.start(db, game_id.clone(), total_trials, config).await {
                Ok((run_id, _)) => DailyEntry {
                    game_id,
                    run_id: Some(run_id),
                    status: "started".to_string(),
                    error: None,
                },
                Err(err) => {
                    warn!("daily batch: {} failed to start: {}", game_id, err);
                    DailyEntry {
                        game_id,
                        run_id: None,
                        status: "error".to_string(),
                        error: Some(err.to_string()),
                    }
                }
            }
        });
        let simulations = join_all(starts).await;

        Ok(DailyBatch {
            date: date.to_string(),
            games_count: simulations.len(),
            simulations,
        })
    }

    /// Signals workers to stop pulling trials and waits for live runs to
    /// drain, up to `deadline`. Runs still going are left `running` for
    /// a recovery pass on next start.
    pub async fn shutdown(&self, deadline: Duration) {
        let _ = self.shutdown_tx.send(true);
        let give_up = tokio::time::Instant::now() + deadline;
        loop {
            let live = {
                let runs = self.runs.read().unwrap();
                runs.values()
                    .filter(|progress| !progress.status().is_terminal())
                    .count()
            };
            if live == 0 {
                info!("coordinator drained cleanly");
                return;
            }
            if tokio::time::Instant::now() >= give_up {
                warn!("shutdown deadline reached with {} runs still live", live);
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn fail_run(&self, db: &SimDb, progress: &RunProgress) {
        progress.set_status(RunStatus::Error);
        let run_id = progress.run_id;
        if let Err(err) =
            run_with_deadline(db, WRITE_DEADLINE, move |mut state| {
                state.update_run_status(run_id, RunStatus::Error)
            })
            .await
        {
            error!("run {}: could not record error status: {}", run_id, err);
        }
    }
}

/// Runs a repository closure on the pooled connection under a deadline.
/// A blown deadline surfaces as `Unavailable`.
async fn run_with_deadline<T, F>(db: &SimDb, deadline: Duration, op: F) -> SimResult<T>
where
    T: Send + 'static,
    F: FnOnce(StateInterface<'_>) -> SimResult<T> + Send + 'static,
{
    tokio::time::timeout(deadline, db.run(move |conn| op(StateInterface::new(conn))))
        .await
        .map_err(|_| SimError::Unavailable("repository deadline exceeded".to_string()))?
}

/// The detached per-run task: spawns the worker pool, aggregates
/// results, maintains the write-behind buffer, and lands the final
/// aggregate.
async fn run_loop(
    db: SimDb,
    context: Arc<GameContext>,
    progress: Arc<RunProgress>,
    config: RunConfig,
    master_seed: u64,
    workers: usize,
    shutdown_rx: watch::Receiver<bool>,
) {
    let run_id = progress.run_id;
    match drive_run(
        &db,
        context,
        &progress,
        config,
        master_seed,
        workers,
        shutdown_rx,
    )
    .await
    {
        Ok(RunVerdict::Completed) => {
            progress.set_status(RunStatus::Completed);
            info!("run {}: completed", run_id);
        }
        Ok(RunVerdict::TooManyErrors) => {
            progress.set_status(RunStatus::Error);
            error!("run {}: errored trial share exceeded tolerance", run_id);
        }
        Ok(RunVerdict::Interrupted) => {
            // Shutdown mid-run: leave the run `running` for recovery.
            warn!("run {}: interrupted by shutdown", run_id);
        }
        Err(err) => {
            error!("run {}: failed: {}", run_id, err);
            progress.set_status(RunStatus::Error);
            let status_write = run_with_deadline(&db, WRITE_DEADLINE, move |mut state| {
                state.update_run_status(run_id, RunStatus::Error)
            })
            .await;
            if let Err(err) = status_write {
                error!("run {}: could not record error status: {}", run_id, err);
            }
        }
    }
}

enum RunVerdict {
    Completed,
    TooManyErrors,
    Interrupted,
}

async fn drive_run(
    db: &SimDb,
    context: Arc<GameContext>,
    progress: &Arc<RunProgress>,
    config: RunConfig,
    master_seed: u64,
    workers: usize,
    shutdown_rx: watch::Receiver<bool>,
) -> SimResult<RunVerdict> {
    let run_id = progress.run_id;
    let total = progress.total;

    // Workers pull the next trial number from a shared counter, so
    // numbering is assigned on dequeue and stays stable however results
    // interleave.
    let next_trial = Arc::new(AtomicU32::new(0));
    let (result_tx, mut result_rx) = mpsc::channel::<TrialResult>(workers * 4);

    for _ in 0..workers {
        let context = context.clone();
        let next_trial = next_trial.clone();
        let result_tx = result_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                let trial = next_trial.fetch_add(1, Ordering::SeqCst) + 1;
                if trial > total {
                    break;
                }
                // A panicking trial must not take the whole run down; it
                // becomes an errored 0-0 tie.
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let mut rng = trial_rng(master_seed, trial);
                    run_trial(&context, run_id, trial, config.trial_cap_innings, &mut rng)
                }))
                .unwrap_or_else(|_| {
                    warn!("run {}: trial {} panicked", run_id, trial);
                    TrialResult::errored(run_id, trial)
                });
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    let mut accumulator = AggregateAccumulator::new();
    let mut buffer: Vec<TrialRow> = Vec::new();
    let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = result_rx.recv() => match received {
                Some(result) => {
                    if config.persist_trials {
                        match TrialRow::from_result(&result) {
                            Ok(row) => buffer.push(row),
                            Err(err) => error!(
                                "run {}: trial {} not persistable: {}",
                                run_id, result.trial_number, err
                            ),
                        }
                    }
                    accumulator.merge(&result);
                    let done = progress.completed.fetch_add(1, Ordering::SeqCst) + 1;

                    if buffer.len() >= FLUSH_THRESHOLD {
                        flush_buffer(db, run_id, &mut buffer, done).await?;
                    }
                    if done >= total {
                        break;
                    }
                }
                // All workers gone before the count was reached: shutdown.
                None => return Ok(RunVerdict::Interrupted),
            },
            _ = flush_tick.tick() => {
                if !buffer.is_empty() {
                    let done = progress.completed.load(Ordering::SeqCst);
                    flush_buffer(db, run_id, &mut buffer, done).await?;
                }
            }
        }
    }

    let done = progress.completed.load(Ordering::SeqCst);
    flush_buffer(db, run_id, &mut buffer, done).await?;

    if accumulator.errored_fraction() > config.error_rate_tolerance {
        run_with_retry(db, move |mut state| state.update_run_status(run_id, RunStatus::Error)).await?;
        return Ok(RunVerdict::TooManyErrors);
    }

    let aggregate = accumulator.finalize(run_id);
    let row = AggregateRow::from_aggregate(&aggregate, Utc::now())?;
    run_with_retry(db, move |mut state| state.persist_aggregate(&row)).await?;
    run_with_retry(db, move |mut state| {
        state.update_run_status(run_id, RunStatus::Completed)
    })
    .await?;

    Ok(RunVerdict::Completed)
}

/// Drains the write-behind buffer with retry, also landing the current
/// completed count.
async fn flush_buffer(
    db: &SimDb,
    run_id: Uuid,
    buffer: &mut Vec<TrialRow>,
    completed: u32,
) -> SimResult<()> {
    if buffer.is_empty() {
        return run_with_retry(db, move |mut state| {
            state.update_progress(run_id, completed as i32)
        })
        .await;
    }
    let rows = std::mem::take(buffer);
    run_with_retry(db, move |mut state| {
        state.persist_trial_results(&rows)?;
        state.update_progress(run_id, completed as i32)
    })
    .await
}

/// Write with up to three retries on transient errors, backing off
/// 100ms / 400ms / 1.6s. Trial inserts are idempotent, so replays after
/// a partial failure are safe.
async fn run_with_retry<F>(db: &SimDb, op: F) -> SimResult<()>
where
    F: Fn(StateInterface<'_>) -> SimResult<()> + Send + Sync + Clone + 'static,
{
    let mut attempt = 0;
    loop {
        let op = op.clone();
        let result = run_with_deadline(db, WRITE_DEADLINE, move |state| op(state)).await;
        match result {
            Ok(()) => return Ok(()),
            Err(err) if attempt < WRITE_RETRY_BACKOFF.len() && err.is_transient() => {
                warn!(
                    "repository write failed (attempt {}), retrying: {}",
                    attempt + 1,
                    err
                );
                tokio::time::sleep(WRITE_RETRY_BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.trial_cap_innings, 30);
        assert!((config.error_rate_tolerance - 0.10).abs() < 1e-12);
        assert!(config.persist_trials);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn config_parses_partial_bodies() {
        let value = serde_json::json!({ "seed": 42, "persist_trials": false });
        let config = RunConfig::from_value(Some(&value)).unwrap();
        assert_eq!(config.seed, Some(42));
        assert!(!config.persist_trials);
        assert_eq!(config.trial_cap_innings, 30);
    }

    #[test]
    fn config_ignores_unknown_keys() {
        let value = serde_json::json!({
            "trial_cap_innings": 12,
            "pitch_clock_seconds": 15,
            "mascot": "Wally"
        });
        let config = RunConfig::from_value(Some(&value)).unwrap();
        assert_eq!(config.trial_cap_innings, 12);
    }

    #[test]
    fn config_bounds() {
        assert!(RunConfig {
            trial_cap_innings: 8,
            ..RunConfig::default()
        }
        .validate()
        .is_err());
        assert!(RunConfig {
            error_rate_tolerance: 1.5,
            ..RunConfig::default()
        }
        .validate()
        .is_err());
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn trial_count_bounds() {
        assert!(matches!(
            validate_trial_count(0),
            Err(SimError::Validation(_))
        ));
        assert!(validate_trial_count(1).is_ok());
        assert!(validate_trial_count(MAX_TRIALS_PER_RUN).is_ok());
        assert!(validate_trial_count(MAX_TRIALS_PER_RUN + 1).is_err());
    }

    #[test]
    fn progress_snapshot_tracks_completion() {
        let progress = RunProgress::new(Uuid::new_v4(), "G-1".to_string(), 200, Utc::now());
        progress.set_status(RunStatus::Running);
        progress.completed.store(50, Ordering::SeqCst);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.status, RunStatus::Running);
        assert_eq!(snapshot.completed_runs, 50);
        assert!((snapshot.progress - 0.25).abs() < 1e-12);
        assert!(snapshot.completed_at.is_none());
    }

    #[test]
    fn terminal_status_stamps_completed_at() {
        let progress = RunProgress::new(Uuid::new_v4(), "G-1".to_string(), 10, Utc::now());
        progress.set_status(RunStatus::Running);
        assert!(progress.snapshot().completed_at.is_none());
        progress.set_status(RunStatus::Completed);
        assert!(progress.snapshot().completed_at.is_some());
    }

}

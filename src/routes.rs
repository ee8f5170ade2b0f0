use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Data, Orbit, Response, Rocket, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fungo::coordinator::{
    DailyBatch, ResultOutcome, RunConfig, RunSnapshot, SimCoordinator, SimulationResult,
    HEALTH_DEADLINE,
};
use fungo::db::SimDb;
use fungo::error::SimError;
use fungo::state::StateInterface;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: message.into(),
    })
}

/// Central mapping from the error taxonomy to HTTP statuses.
#[derive(rocket::Responder)]
pub enum ApiError {
    #[response(status = 400, content_type = "json")]
    BadRequest(Json<ErrorBody>),
    #[response(status = 404, content_type = "json")]
    NotFound(Json<ErrorBody>),
    #[response(status = 409, content_type = "json")]
    Conflict(Json<ErrorBody>),
    #[response(status = 500, content_type = "json")]
    Internal(Json<ErrorBody>),
    #[response(status = 503, content_type = "json")]
    Unavailable(Json<ErrorBody>),
}

/// "game G-123 not found" -> "Game not found".
fn not_found_message(what: &str) -> String {
    let noun = what.split_whitespace().next().unwrap_or("resource");
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => format!("{}{} not found", first.to_uppercase(), chars.as_str()),
        None => "Not found".to_string(),
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> ApiError {
        match err {
            SimError::Validation(message) => ApiError::BadRequest(body(message)),
            SimError::NotFound(what) => ApiError::NotFound(body(not_found_message(&what))),
            SimError::Conflict(run_id) => {
                ApiError::Conflict(body(format!("simulation run {} already exists", run_id)))
            }
            SimError::Unavailable(message) => {
                ApiError::Unavailable(body(format!("service unavailable: {}", message)))
            }
            SimError::DataCorrupt(message) => {
                // Corrupt context data reads as an absent resource to
                // clients; the details go to the log.
                error!("corrupt data surfaced at endpoint: {}", message);
                ApiError::NotFound(body(not_found_message(&message)))
            }
            SimError::Internal(message) => {
                error!("internal error surfaced at endpoint: {}", message);
                ApiError::Internal(body("internal server error".to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub game_id: String,
    pub simulation_runs: Option<u32>,
    pub config: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SimulateResponse {
    pub run_id: Uuid,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

#[rocket::post("/simulate", format = "json", data = "<request>")]
pub async fn simulate(
    db: SimDb,
    coordinator: &State<SimCoordinator>,
    request: Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    let request = request.into_inner();
    if request.game_id.trim().is_empty() {
        return Err(ApiError::BadRequest(body("game_id is required")));
    }
    let total_trials = request
        .simulation_runs
        .unwrap_or_else(|| coordinator.default_trials());
    let config = RunConfig::from_value(request.config.as_ref())?;

    let (run_id, created_at) = coordinator
        .start(db, request.game_id, total_trials, config)
        .await?;
    Ok(Json(SimulateResponse {
        run_id,
        status: "started",
        created_at,
    }))
}

#[rocket::get("/simulation/<id>/status")]
pub async fn simulation_status(
    db: SimDb,
    coordinator: &State<SimCoordinator>,
    id: Uuid,
) -> Result<Json<RunSnapshot>, ApiError> {
    Ok(Json(coordinator.get_status(&db, id).await?))
}

#[derive(rocket::Responder)]
pub enum ResultResponse {
    #[response(status = 200, content_type = "json")]
    Ready(Json<SimulationResult>),
    /// The run exists but hasn't finished; poll the status endpoint.
    #[response(status = 202, content_type = "json")]
    NotReady(Json<RunSnapshot>),
}

#[rocket::get("/simulation/<id>/result")]
pub async fn simulation_result(
    db: SimDb,
    coordinator: &State<SimCoordinator>,
    id: Uuid,
) -> Result<ResultResponse, ApiError> {
    match coordinator.get_result(&db, id).await? {
        ResultOutcome::Ready(result) => Ok(ResultResponse::Ready(Json(*result))),
        ResultOutcome::NotReady(snapshot) => Ok(ResultResponse::NotReady(Json(snapshot))),
    }
}

#[derive(Debug, Deserialize)]
pub struct DailyRequest {
    pub date: Option<String>,
    pub simulation_runs: Option<u32>,
    pub config: Option<serde_json::Value>,
}

/// Request guard exposing the running `Rocket<Orbit>` instance, which isn't
/// itself a `FromRequest` type but is reachable via `Request::rocket()`.
pub struct RocketHandle<'r>(pub &'r Rocket<Orbit>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RocketHandle<'r> {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RocketHandle(req.rocket()))
    }
}

#[rocket::post("/simulate/daily", format = "json", data = "<request>")]
pub async fn simulate_daily(
    rocket: RocketHandle<'_>,
    coordinator: &State<SimCoordinator>,
    request: Json<DailyRequest>,
) -> Result<Json<DailyBatch>, ApiError> {
    let rocket = rocket.0;
    let request = request.into_inner();
    let date = match &request.date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ApiError::BadRequest(body(format!("invalid date {:?}, expected YYYY-MM-DD", raw)))
        })?,
        None => Utc::now().date_naive(),
    };
    let total_trials = request
        .simulation_runs
        .unwrap_or_else(|| coordinator.default_trials());
    let config = RunConfig::from_value(request.config.as_ref())?;

    let batch = coordinator
        .start_daily(rocket, date, total_trials, config)
        .await?;
    info!(
        "daily batch for {}: {} games scheduled",
        batch.date, batch.games_count
    );
    Ok(Json(batch))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

#[rocket::get("/health")]
pub async fn health(db: SimDb) -> Result<Json<HealthResponse>, ApiError> {
    tokio::time::timeout(HEALTH_DEADLINE, db.run(|conn| StateInterface::new(conn).ping()))
        .await
        .map_err(|_| SimError::Unavailable("repository ping timed out".to_string()))??;
    Ok(Json(HealthResponse {
        status: "ok",
        database: "ok",
    }))
}

// Catchers keep error bodies JSON even when no route was reached.

#[rocket::catch(404)]
pub fn not_found() -> status::Custom<Json<ErrorBody>> {
    status::Custom(Status::NotFound, body("Not found"))
}

#[rocket::catch(400)]
pub fn bad_request() -> status::Custom<Json<ErrorBody>> {
    status::Custom(Status::BadRequest, body("Malformed request"))
}

/// Rocket reports body deserialization failures as 422; this API's
/// contract is 400 for malformed bodies.
#[rocket::catch(422)]
pub fn unprocessable() -> status::Custom<Json<ErrorBody>> {
    status::Custom(Status::BadRequest, body("Malformed request body"))
}

#[rocket::catch(500)]
pub fn internal_error() -> status::Custom<Json<ErrorBody>> {
    status::Custom(Status::InternalServerError, body("internal server error"))
}

/// Logs method, path, status, and duration for every request.
pub struct RequestTimer;

#[derive(Clone, Copy)]
struct TimerStart(Option<Instant>);

#[rocket::async_trait]
impl Fairing for RequestTimer {
    fn info(&self) -> Info {
        Info {
            name: "Request Timer",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut Data<'_>) {
        request.local_cache(|| TimerStart(Some(Instant::now())));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let start = request.local_cache(|| TimerStart(None));
        match start.0 {
            Some(start) => info!(
                "{} {} -> {} ({:.1?})",
                request.method(),
                request.uri().path(),
                response.status(),
                start.elapsed()
            ),
            None => info!(
                "{} {} -> {}",
                request.method(),
                request.uri().path(),
                response.status()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_read_naturally() {
        assert_eq!(not_found_message("game G-NOPE not found"), "Game not found");
        assert_eq!(
            not_found_message("simulation run 123 not found"),
            "Simulation not found"
        );
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let err: ApiError = SimError::Validation("simulation_runs must be positive".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn conflict_maps_to_conflict() {
        let err: ApiError = SimError::Conflict(Uuid::nil()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn data_corrupt_reads_as_not_found() {
        let err: ApiError = SimError::DataCorrupt("roster for X has 8 batters".into()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}

use std::sync::Arc;
use std::time::Duration;

use rocket::fairing::AdHoc;

use fungo::config::AppConfig;
use fungo::coordinator::SimCoordinator;
use fungo::db::SimDb;
use fungo::weather::{self, WeatherService};
use routes::{
    bad_request, health, internal_error, not_found, simulate, simulate_daily, simulation_result,
    simulation_status, unprocessable, RequestTimer,
};

mod routes;

/// How long shutdown waits for in-flight runs to drain.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    env_logger::init();
    let config = AppConfig::from_env();

    let figment = rocket::Config::figment()
        .merge(("port", config.port))
        .merge(("databases.fungo.url", config.database_url()))
        .merge(("databases.fungo.pool_size", config.pool_size()));

    let weather_service = Arc::new(WeatherService::new(config.openweather_api_key.clone()));
    let sweeper_service = weather_service.clone();
    let coordinator = SimCoordinator::new(weather_service, config.workers, config.simulation_runs);

    rocket::custom(figment)
        .mount(
            "/",
            rocket::routes![
                simulate,
                simulation_status,
                simulation_result,
                simulate_daily,
                health
            ],
        )
        .register(
            "/",
            rocket::catchers![not_found, bad_request, unprocessable, internal_error],
        )
        .attach(SimDb::fairing())
        .attach(RequestTimer)
        .manage(coordinator)
        .attach(AdHoc::on_liftoff("Weather Sweeper", move |rocket| {
            Box::pin(async move {
                let coordinator: &SimCoordinator = rocket
                    .state()
                    .expect("coordinator is managed before liftoff");
                tokio::spawn(weather::run_sweeper(
                    sweeper_service,
                    coordinator.subscribe_shutdown(),
                ));
            })
        }))
        .attach(AdHoc::on_shutdown("Coordinator Drain", |rocket| {
            Box::pin(async {
                if let Some(coordinator) = rocket.state::<SimCoordinator>() {
                    coordinator.shutdown(DRAIN_DEADLINE).await;
                }
            })
        }))
        .launch()
        .await?;

    Ok(())
}

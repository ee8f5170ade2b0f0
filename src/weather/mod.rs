use chrono::{DateTime, Datelike, DurationRound, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::sim::context::Stadium;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindDirection {
    Out,
    In,
    Left,
    Right,
    Calm,
    Varies,
}

/// Game-time conditions, imperial units throughout.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Degrees Fahrenheit.
    pub temperature: f64,
    /// Miles per hour.
    pub wind_speed: f64,
    pub wind_direction: WindDirection,
    /// Percent relative humidity.
    pub humidity: f64,
    /// Inches of mercury.
    pub pressure: f64,
}

const SEA_LEVEL_PRESSURE_INHG: f64 = 29.92;
/// Pressure drops roughly one inHg per thousand feet of altitude.
const INHG_PER_THOUSAND_FEET: f64 = 1.0;
const HPA_TO_INHG: f64 = 0.029_53;

impl Weather {
    /// Conditions inside a dome, by definition.
    pub fn controlled() -> Weather {
        Weather {
            temperature: 72.0,
            wind_speed: 0.0,
            wind_direction: WindDirection::Calm,
            humidity: 50.0,
            pressure: SEA_LEVEL_PRESSURE_INHG,
        }
    }

    /// Season-adjusted fallback when no forecast is available: warm
    /// season (Apr-Sep) 75F, cold season 55F, pressure adjusted for the
    /// park's altitude.
    pub fn seasonal_default(game_time: DateTime<Utc>, altitude_feet: f64) -> Weather {
        let temperature = if (4..=9).contains(&game_time.month()) {
            75.0
        } else {
            55.0
        };
        Weather {
            temperature,
            wind_speed: 5.0,
            wind_direction: WindDirection::Varies,
            humidity: 55.0,
            pressure: altitude_adjusted_pressure(SEA_LEVEL_PRESSURE_INHG, altitude_feet),
        }
    }
}

pub fn altitude_adjusted_pressure(pressure_inhg: f64, altitude_feet: f64) -> f64 {
    pressure_inhg - INHG_PER_THOUSAND_FEET * (altitude_feet / 1000.0)
}

/// Buckets meteorological wind degrees into stadium-relative directions.
/// The mapping assumes the standard park orientation (home plate in the
/// southwest corner).
pub fn bucket_wind(degrees: f64, speed_mph: f64) -> WindDirection {
    if speed_mph < 1.0 {
        return WindDirection::Calm;
    }
    let deg = degrees.rem_euclid(360.0);
    match deg {
        d if d >= 338.0 || d <= 22.0 => WindDirection::Out,
        d if d <= 112.0 => WindDirection::Right,
        d if d <= 202.0 => WindDirection::In,
        d if d <= 292.0 => WindDirection::Left,
        _ => WindDirection::Out,
    }
}

/// Cache key: stadium name plus the forecast hour. Requests for the same
/// park within the same hour share an entry.
type CacheKey = (String, DateTime<Utc>);

struct CachedForecast {
    weather: Weather,
    fetched_at: Instant,
}

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Forecast lookup with a time-bucketed cache and default-on-failure.
/// Safe to share across coordinators behind an `Arc`; the cache lock is
/// only held for map operations, never across awaits.
pub struct WeatherService {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    cache: RwLock<HashMap<CacheKey, CachedForecast>>,
    ttl: Duration,
}

impl WeatherService {
    pub fn new(api_key: Option<String>) -> WeatherService {
        WeatherService::with_base_url(api_key, "https://api.openweathermap.org".to_string())
    }

    pub fn with_base_url(api_key: Option<String>, base_url: String) -> WeatherService {
        WeatherService {
            client: reqwest::Client::builder()
                .timeout(UPSTREAM_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
            cache: RwLock::new(HashMap::new()),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Best-effort forecast for a stadium at game time. Never errors:
    /// upstream trouble degrades to seasonal defaults, logged but not
    /// raised.
    pub async fn forecast(&self, stadium: &Stadium, game_time: DateTime<Utc>) -> Weather {
        if stadium.roof.is_controlled() {
            debug!("{}: controlled environment, skipping forecast", stadium.name);
            return Weather::controlled();
        }

        let (latitude, longitude) = match (stadium.latitude, stadium.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                debug!("{}: no coordinates, using seasonal default", stadium.name);
                return Weather::seasonal_default(game_time, stadium.altitude_feet);
            }
        };

        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => return Weather::seasonal_default(game_time, stadium.altitude_feet),
        };

        let key = cache_key(&stadium.name, game_time);
        if let Some(cached) = self.cache_get(&key) {
            return cached;
        }

        match self
            .fetch_forecast(latitude, longitude, &api_key, game_time, stadium.altitude_feet)
            .await
        {
            Ok(weather) => {
                self.cache_put(key, weather);
                weather
            }
            Err(err) => {
                warn!(
                    "forecast for {} failed, falling back to seasonal default: {:#}",
                    stadium.name, err
                );
                Weather::seasonal_default(game_time, stadium.altitude_feet)
            }
        }
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Weather> {
        let cache = self.cache.read().unwrap();
        cache
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.weather)
    }

    fn cache_put(&self, key: CacheKey, weather: Weather) {
        let mut cache = self.cache.write().unwrap();
        cache.insert(
            key,
            CachedForecast {
                weather,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drops expired entries. Called by the background sweeper.
    pub fn sweep(&self) {
        let mut cache = self.cache.write().unwrap();
        let before = cache.len();
        cache.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
        let evicted = before - cache.len();
        if evicted > 0 {
            debug!("weather cache sweep evicted {} entries", evicted);
        }
    }

    #[cfg(test)]
    fn cached_entry_count(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    async fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        api_key: &str,
        game_time: DateTime<Utc>,
        altitude_feet: f64,
    ) -> anyhow::Result<Weather> {
        let url = format!("{}/data/2.5/forecast", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("appid", api_key.to_string()),
                ("units", "imperial".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let forecast: ForecastResponse = response.json().await?;
        let entry = forecast
            .list
            .into_iter()
            .min_by_key(|entry| (entry.dt - game_time.timestamp()).abs())
            .ok_or_else(|| anyhow::anyhow!("forecast list was empty"))?;

        Ok(entry.into_weather(altitude_feet))
    }
}

fn cache_key(stadium_name: &str, game_time: DateTime<Utc>) -> CacheKey {
    let hour = game_time
        .duration_trunc(chrono::Duration::hours(1))
        .unwrap_or(game_time);
    (stadium_name.to_string(), hour)
}

/// Periodically evicts expired cache entries. Spawned once at liftoff;
/// exits when the shutdown signal flips.
pub async fn run_sweeper(
    service: std::sync::Arc<WeatherService>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    info!("weather cache sweeper started");
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tick.tick() => service.sweep(),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("weather cache sweeper stopping");
                    return;
                }
            }
        }
    }
}

// OpenWeather 5-day/3-hour forecast payload, trimmed to what we read.

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: ForecastMain,
    wind: ForecastWind,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
    humidity: f64,
    /// Always hPa, even with imperial units requested.
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastWind {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

impl ForecastEntry {
    fn into_weather(self, altitude_feet: f64) -> Weather {
        Weather {
            temperature: self.main.temp,
            wind_speed: self.wind.speed,
            wind_direction: bucket_wind(self.wind.deg, self.wind.speed),
            humidity: self.main.humidity,
            pressure: altitude_adjusted_pressure(self.main.pressure * HPA_TO_INHG, altitude_feet),
        }
    }
}

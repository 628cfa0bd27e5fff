// Weather classification and observation sources.
//
// Observations come from an Open-Meteo style forecast endpoint: the
// `current` block carries `temperature_2m`, `weather_code` (WMO
// interpretation code) and `is_day` (0 or 1), and the top level carries the
// location's `utc_offset_seconds` when `timezone=auto` is requested.
//
// This crate does not speak HTTP. `WeatherSource` is the seam: the
// installation plugs in whatever transport it has, or one of the sources
// here (`StaticWeather` for a fixed observation, `ForecastFileWeather` for
// a forecast body saved to disk).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::types::{DEFAULT_UTC_OFFSET_SECONDS, WeatherCondition};

/// Collapse a WMO weather interpretation code into one of five categories.
///
/// Total: codes outside every documented range read as clear.
pub fn map_weather_code(code: i32) -> WeatherCondition {
    match code {
        0..=1 => WeatherCondition::Clear,
        2..=3 => WeatherCondition::Cloudy,
        45..=48 => WeatherCondition::Cloudy, // fog
        51..=67 => WeatherCondition::Rain,   // drizzle, rain, freezing rain
        71..=77 => WeatherCondition::Snow,
        80..=82 => WeatherCondition::Rain, // showers
        85..=86 => WeatherCondition::Snow, // snow showers
        95..=99 => WeatherCondition::Storm,
        _ => WeatherCondition::Clear,
    }
}

/// One current-conditions reading for a location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub temperature_c: f64,
    pub weather_code: i32,
    pub is_day: bool,
    pub utc_offset_seconds: i32,
}

impl WeatherObservation {
    pub fn clear_day() -> Self {
        Self {
            temperature_c: 20.0,
            weather_code: 0,
            is_day: true,
            utc_offset_seconds: DEFAULT_UTC_OFFSET_SECONDS,
        }
    }
}

#[derive(Deserialize)]
struct ForecastBody {
    current: CurrentBlock,
    #[serde(default)]
    utc_offset_seconds: Option<i32>,
}

#[derive(Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    weather_code: i32,
    is_day: i64,
}

/// Decode a forecast response body.
///
/// A missing `utc_offset_seconds` falls back to the default location's
/// offset.
pub fn parse_forecast(body: &str) -> Result<WeatherObservation, EnvError> {
    let parsed: ForecastBody = serde_json::from_str(body)?;
    Ok(WeatherObservation {
        temperature_c: parsed.current.temperature_2m,
        weather_code: parsed.current.weather_code,
        is_day: parsed.current.is_day == 1,
        utc_offset_seconds: parsed
            .utc_offset_seconds
            .unwrap_or(DEFAULT_UTC_OFFSET_SECONDS),
    })
}

/// Request URL for current conditions at a position.
pub fn forecast_url(base: &str, latitude: f64, longitude: f64) -> String {
    format!(
        "{base}?latitude={latitude}&longitude={longitude}\
         &current=temperature_2m,weather_code,is_day&timezone=auto"
    )
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Anything that can report current conditions for a position.
///
/// Called from the monitor's background thread, so it may block.
pub trait WeatherSource: Send + Sync {
    fn fetch(&self, latitude: f64, longitude: f64) -> Result<WeatherObservation, EnvError>;
}

/// Always reports the same observation, wherever you are.
#[derive(Clone, Debug)]
pub struct StaticWeather {
    pub observation: WeatherObservation,
}

impl StaticWeather {
    pub fn new(observation: WeatherObservation) -> Self {
        Self { observation }
    }
}

impl WeatherSource for StaticWeather {
    fn fetch(&self, _latitude: f64, _longitude: f64) -> Result<WeatherObservation, EnvError> {
        Ok(self.observation.clone())
    }
}

/// Reads a saved forecast body from disk on every fetch.
#[derive(Clone, Debug)]
pub struct ForecastFileWeather {
    path: PathBuf,
}

impl ForecastFileWeather {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WeatherSource for ForecastFileWeather {
    fn fetch(&self, latitude: f64, longitude: f64) -> Result<WeatherObservation, EnvError> {
        log::debug!(
            "reading forecast for ({latitude:.4}, {longitude:.4}) from {}",
            self.path.display()
        );
        let body = std::fs::read_to_string(&self.path).map_err(|source| EnvError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_forecast(&body)
    }
}

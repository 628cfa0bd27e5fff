// Tunables for the environment monitor.
//
// Loaded as the `env` section of `InstallationConfig`. Every field has a
// default, so a partial JSON object is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::location::{Coordinates, PositionOptions, duration_millis};
use crate::types::{DEFAULT_LATITUDE, DEFAULT_LONGITUDE, DEFAULT_UTC_OFFSET_SECONDS};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Used whenever the device position is unavailable.
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
    /// Local offset assumed before the first forecast arrives.
    pub initial_utc_offset_seconds: i32,
    pub position: PositionOptions,
    /// How often `tick` re-derives the local hour without fetching.
    #[serde(with = "duration_millis")]
    pub clock_tick_interval: Duration,
    /// Endpoint handed to `forecast_url` by network-backed weather sources.
    pub forecast_base_url: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            fallback_latitude: DEFAULT_LATITUDE,
            fallback_longitude: DEFAULT_LONGITUDE,
            initial_utc_offset_seconds: DEFAULT_UTC_OFFSET_SECONDS,
            position: PositionOptions::default(),
            clock_tick_interval: Duration::from_secs(60),
            forecast_base_url: "https://api.open-meteo.com/v1/forecast".into(),
        }
    }
}

impl EnvironmentConfig {
    pub fn fallback(&self) -> Coordinates {
        Coordinates::new(self.fallback_latitude, self.fallback_longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let c: EnvironmentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, EnvironmentConfig::default());
    }

    #[test]
    fn nested_overrides_apply() {
        let c: EnvironmentConfig = serde_json::from_str(
            r#"{"clock_tick_interval": 1000, "position": {"timeout": 250}}"#,
        )
        .unwrap();
        assert_eq!(c.clock_tick_interval, Duration::from_secs(1));
        assert_eq!(c.position.timeout, Duration::from_millis(250));
        assert_eq!(c.position.maximum_age, Duration::from_secs(300));
    }
}

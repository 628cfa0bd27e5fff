// Error types for the environment crate.
//
// None of these are fatal to a running installation: the monitor converts
// every `EnvError` into the state's `error` string and keeps the previous
// sensed fields, and every `LocationError` into a fallback to the default
// coordinates with `LocationPermission::Denied`.

use std::path::PathBuf;

/// Failures while obtaining or decoding a weather observation, or loading
/// configuration.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("weather request failed: {0}")]
    WeatherRequest(String),
    #[error("malformed forecast body: {0}")]
    ForecastParse(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("background fetch worker exited without reporting")]
    WorkerLost,
}

/// Why a device position could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location capability unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
    #[error("location provider failed: {0}")]
    Provider(String),
}

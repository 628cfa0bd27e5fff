// nictia_env: the environment model and parameter mapper.
//
// Turns sensed reality (where the installation is, what time it is there,
// what the sky is doing) into the `EnvironmentParams` bundle that drives
// both the audio engine and the particle field. Everything here is plain
// data and pure functions except the monitor, which owns the background
// fetch thread.
//
// Module overview:
// - `types.rs`:    EnvironmentState, EnvironmentParams, and the small enums
//                  (TimeOfDay, WeatherCondition, Energy, WaveformType, Rgb).
// - `clock.rs`:    ClockReading (day-of-year / hour / minute) and the
//                  WallClock trait with SystemClock and FixedClock.
// - `solar.rs`:    Solar altitude/intensity and the seasonal factor.
// - `weather.rs`:  WMO code table, forecast body parsing, WeatherSource trait.
// - `location.rs`: PositionOptions, LocationProvider trait, bounded-timeout
//                  resolution with fallback coordinates.
// - `device.rs`:   DeviceSignals, the host capability snapshot used by the
//                  audio profile and the field's performance tier.
// - `mapper.rs`:   calculate_params, the staged state -> params mapping.
// - `monitor.rs`:  EnvironmentMonitor, refresh/poll/tick lifecycle with
//                  stale-response rejection.
// - `config.rs`:   EnvironmentConfig.
// - `error.rs`:    EnvError and LocationError.
//
// See also: `nictia_audio` and `nictia_field`, the two consumers of
// `EnvironmentParams`; `nictia_installation::session` which polls the
// monitor once per frame.
//
// **Critical constraint: determinism.** Given the same state, clock reading
// and rng, `calculate_params` returns the same bundle. No function here
// reads the system clock directly; time always comes through a `WallClock`.

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod location;
pub mod mapper;
pub mod monitor;
pub mod solar;
pub mod types;
pub mod weather;

pub use clock::{ClockReading, FixedClock, SystemClock, WallClock};
pub use config::EnvironmentConfig;
pub use device::DeviceSignals;
pub use error::{EnvError, LocationError};
pub use location::{
    CachedLocation, Coordinates, FixedLocation, LocationProvider, LocationResolution,
    PositionOptions, UnavailableLocation, resolve_location,
};
pub use mapper::{MAX_BPM, calculate_params, clamp_params};
pub use monitor::EnvironmentMonitor;
pub use solar::{calculate_season_factor, calculate_solar_intensity, solar_altitude};
pub use types::{
    DEFAULT_LATITUDE, DEFAULT_LONGITUDE, Energy, EnvironmentParams, EnvironmentState,
    LocationPermission, Rgb, TimeOfDay, WaveformType, WeatherCondition,
};
pub use weather::{
    ForecastFileWeather, StaticWeather, WeatherObservation, WeatherSource, forecast_url,
    map_weather_code, parse_forecast,
};

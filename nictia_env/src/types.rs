// Core environment types.
//
// `EnvironmentState` is the sensed snapshot (position, local hour, weather
// code, temperature) plus the bookkeeping of the last fetch (loading flag,
// error, location permission). `EnvironmentParams` is the control bundle
// derived from it by `mapper::calculate_params`.
//
// The categorical views of a state (`time_of_day()`, `weather()`) are
// computed on every read from `hour` and `weather_code`. They are never
// stored, so a state cannot carry a time-of-day that disagrees with its hour.
//
// See also: `mapper.rs` for how params are derived, `monitor.rs` for the
// state's lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::weather::map_weather_code;

/// Fallback latitude (Tokyo) used when no device position is available.
pub const DEFAULT_LATITUDE: f64 = 35.6895;
/// Fallback longitude (Tokyo).
pub const DEFAULT_LONGITUDE: f64 = 139.6917;
/// Tokyo is UTC+9 and observes no daylight saving time.
pub const DEFAULT_UTC_OFFSET_SECONDS: i32 = 9 * 3600;

/// First local hour counted as day.
pub const DAY_START_HOUR: u32 = 6;
/// First local hour counted as night again.
pub const DAY_END_HOUR: u32 = 18;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Day,
    Night,
}

impl TimeOfDay {
    /// Day iff the local hour lies in [6, 18).
    pub fn from_hour(hour: u32) -> Self {
        if (DAY_START_HOUR..DAY_END_HOUR).contains(&hour) {
            TimeOfDay::Day
        } else {
            TimeOfDay::Night
        }
    }
}

/// Five-way sky classification collapsed from WMO weather codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Cloudy,
    Rain,
    Snow,
    Storm,
}

impl WeatherCondition {
    pub const ALL: [WeatherCondition; 5] = [
        WeatherCondition::Clear,
        WeatherCondition::Cloudy,
        WeatherCondition::Rain,
        WeatherCondition::Snow,
        WeatherCondition::Storm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::Cloudy => "cloudy",
            WeatherCondition::Rain => "rain",
            WeatherCondition::Snow => "snow",
            WeatherCondition::Storm => "storm",
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Energy {
    High,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformType {
    Sine,
    Triangle,
    Square,
}

/// Outcome of the last location request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPermission {
    Granted,
    Denied,
    /// No request has completed yet.
    Prompt,
}

/// 8-bit sRGB colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(v: u8) -> Self {
        Self { r: v, g: v, b: v }
    }

    /// `#rrggbb`, lowercase.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Linear components in [0, 1], for renderers that want floats.
    pub fn to_unit(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

// ---------------------------------------------------------------------------
// EnvironmentState
// ---------------------------------------------------------------------------

/// Snapshot of sensed reality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
    /// Local hour of day, 0-23.
    pub hour: u32,
    /// WMO weather interpretation code as reported by the forecast.
    pub weather_code: i32,
    pub is_day: bool,
    pub temperature_c: f64,
    /// Offset of the location's local time from UTC.
    pub utc_offset_seconds: i32,
    pub is_loading: bool,
    pub error: Option<String>,
    pub location_permission: LocationPermission,
}

impl EnvironmentState {
    /// The startup state: Tokyo, clear, loading, permission not yet asked.
    pub fn initial(hour: u32) -> Self {
        Self {
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            hour,
            weather_code: 0,
            is_day: true,
            temperature_c: 20.0,
            utc_offset_seconds: DEFAULT_UTC_OFFSET_SECONDS,
            is_loading: true,
            error: None,
            location_permission: LocationPermission::Prompt,
        }
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.hour)
    }

    pub fn weather(&self) -> WeatherCondition {
        map_weather_code(self.weather_code)
    }
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self::initial(12)
    }
}

// ---------------------------------------------------------------------------
// EnvironmentParams
// ---------------------------------------------------------------------------

/// Control bundle consumed by the audio engine and the particle field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentParams {
    // Audio
    pub bpm: f64,
    pub reverb_wet: f64,
    pub filter_frequency: f64,
    pub noise_level: f64,
    pub energy: Energy,

    // Visual
    pub background_color: Rgb,
    pub particle_speed: f64,
    pub bloom_intensity: f64,
    pub noise_intensity: f64,
    pub glitch_intensity: f64,
    pub waveform_type: WaveformType,

    // Lenia ecosystem
    pub neighbor_radius: f64,
    pub attraction_force: f64,
    pub repulsion_force: f64,
    pub cohesion_strength: f64,
    pub separation_strength: f64,
    pub activity_threshold: f64,
    pub solar_intensity: f64,
}

impl Default for EnvironmentParams {
    /// The neutral bundle the mapper starts from and the visualiser uses
    /// before any environment has been sensed.
    fn default() -> Self {
        Self {
            bpm: 120.0,
            reverb_wet: 0.5,
            filter_frequency: 2000.0,
            noise_level: 0.0,
            energy: Energy::High,
            background_color: Rgb::gray(0x0a),
            particle_speed: 1.0,
            bloom_intensity: 0.5,
            noise_intensity: 0.0,
            glitch_intensity: 0.0,
            waveform_type: WaveformType::Sine,
            neighbor_radius: 1.0,
            attraction_force: 0.5,
            repulsion_force: 0.5,
            cohesion_strength: 0.5,
            separation_strength: 0.5,
            activity_threshold: 0.5,
            solar_intensity: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_of_day_boundaries() {
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Day);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Day);
        assert_eq!(TimeOfDay::from_hour(18), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::Night);
    }

    #[test]
    fn derived_fields_follow_raw_fields() {
        let mut state = EnvironmentState::initial(14);
        assert_eq!(state.time_of_day(), TimeOfDay::Day);
        assert_eq!(state.weather(), WeatherCondition::Clear);

        state.hour = 2;
        state.weather_code = 96;
        assert_eq!(state.time_of_day(), TimeOfDay::Night);
        assert_eq!(state.weather(), WeatherCondition::Storm);
    }

    #[test]
    fn initial_state_is_tokyo_and_loading() {
        let state = EnvironmentState::initial(9);
        assert_eq!(state.latitude, DEFAULT_LATITUDE);
        assert_eq!(state.longitude, DEFAULT_LONGITUDE);
        assert!(state.is_loading);
        assert_eq!(state.location_permission, LocationPermission::Prompt);
        assert!(state.error.is_none());
    }

    #[test]
    fn rgb_hex_is_lowercase_and_padded() {
        assert_eq!(Rgb::gray(0x0a).to_hex(), "#0a0a0a");
        assert_eq!(Rgb::new(255, 0, 171).to_hex(), "#ff00ab");
    }

    #[test]
    fn params_serialize_with_snake_case_enums() {
        let json = serde_json::to_string(&EnvironmentParams::default()).unwrap();
        assert!(json.contains("\"energy\":\"high\""));
        assert!(json.contains("\"waveform_type\":\"sine\""));
    }
}

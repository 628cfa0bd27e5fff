// Environment state -> control parameters.
//
// `calculate_params` runs six stages in a fixed order. Each stage adjusts
// the output of the previous one, and the later stages are tuned assuming
// the earlier baselines, so the order is part of the contract:
//
// 1. Defaults       (`EnvironmentParams::default()` with the current solar
//                    intensity filled in).
// 2. Time of day    sets the tempo range, energy, palette, and the Lenia
//                    baseline (day: wide and attractive, scaled by solar
//                    intensity; night: tight and cohesive).
// 3. Latitude band  polar (|lat| > 60) or tropical (|lat| < 23.5) tweaks.
// 4. Season         radius and attraction scale with the seasonal factor.
// 5. Weather        exactly one of five branches: timbre, filter, noise,
//                    glitch, and a multiplicative Lenia adjustment.
// 6. Clamp          bounds every Lenia parameter and caps tempo at MAX_BPM.
//
// The clamp must run last. Stages 3-5 multiply, and a storm over a polar
// summer would otherwise push radius and repulsion well out of range.
//
// See also: `solar.rs` for the intensity and season inputs, `types.rs` for
// the `EnvironmentParams` fields, `nictia_audio::engine` and
// `nictia_field::sim` for the consumers.
//
// **Critical constraint: determinism.** The only randomness is the tempo
// jitter in stage 2, drawn from the caller's `FieldRng`.

use nictia_prng::FieldRng;

use crate::clock::ClockReading;
use crate::solar::{calculate_season_factor, calculate_solar_intensity};
use crate::types::{
    Energy, EnvironmentParams, EnvironmentState, Rgb, TimeOfDay, WaveformType, WeatherCondition,
};

/// Tempo ceiling. With the current tables the fastest reachable tempo is a
/// stormy day at 130 + 10, so the cap only guards future table edits.
pub const MAX_BPM: f64 = 140.0;

const POLAR_LATITUDE: f64 = 60.0;
const TROPICAL_LATITUDE: f64 = 23.5;

const NEIGHBOR_RADIUS_RANGE: (f64, f64) = (0.3, 2.5);
const ACTIVITY_THRESHOLD_RANGE: (f64, f64) = (0.1, 0.9);
const RAIN_REVERB_CEILING: f64 = 0.9;

/// Derive the full control bundle for `state` at local time `clock`.
pub fn calculate_params(
    state: &EnvironmentState,
    clock: &ClockReading,
    rng: &mut FieldRng,
) -> EnvironmentParams {
    let solar = calculate_solar_intensity(state.latitude, state.longitude, clock);
    let season = calculate_season_factor(state.latitude, clock);

    let mut p = EnvironmentParams {
        solar_intensity: solar,
        ..EnvironmentParams::default()
    };

    apply_time_of_day(&mut p, state.time_of_day(), solar, rng);
    apply_latitude_band(&mut p, state.latitude);
    apply_season(&mut p, season);
    apply_weather(&mut p, state.weather());
    clamp_params(&mut p);
    p
}

fn apply_time_of_day(p: &mut EnvironmentParams, time: TimeOfDay, solar: f64, rng: &mut FieldRng) {
    match time {
        TimeOfDay::Day => {
            p.bpm = 125.0 + rng.next_f64() * 5.0;
            p.energy = Energy::High;
            p.background_color = Rgb::gray(0x1a);
            p.particle_speed = 1.3;
            p.bloom_intensity = 0.4;
            p.reverb_wet = 0.4;

            p.neighbor_radius = 1.2 + solar * 0.6;
            p.attraction_force = 0.4 + solar * 0.4;
            p.repulsion_force = 0.3 + (1.0 - solar) * 0.2;
            p.cohesion_strength = 0.5 + solar * 0.3;
            p.separation_strength = 0.3 + (1.0 - solar) * 0.3;
            p.activity_threshold = 0.3;
        }
        TimeOfDay::Night => {
            p.bpm = 110.0 + rng.next_f64() * 10.0;
            p.energy = Energy::Low;
            p.background_color = Rgb::gray(0x00);
            p.particle_speed = 0.7;
            p.bloom_intensity = 0.8;
            p.reverb_wet = 0.7;

            p.neighbor_radius = 0.6 + solar * 0.4;
            p.attraction_force = 0.6 + solar * 0.2;
            p.repulsion_force = 0.2;
            p.cohesion_strength = 0.7;
            p.separation_strength = 0.2;
            p.activity_threshold = 0.6;
        }
    }
}

fn apply_latitude_band(p: &mut EnvironmentParams, latitude: f64) {
    let abs_lat = latitude.abs();
    if abs_lat > POLAR_LATITUDE {
        p.neighbor_radius *= 1.3;
        p.activity_threshold *= 1.2;
        p.cohesion_strength += 0.2;
    } else if abs_lat < TROPICAL_LATITUDE {
        p.neighbor_radius *= 0.9;
        p.attraction_force *= 1.1;
        p.activity_threshold *= 0.8;
        p.particle_speed *= 1.1;
    }
}

fn apply_season(p: &mut EnvironmentParams, season: f64) {
    p.neighbor_radius *= 0.8 + season * 0.4;
    p.attraction_force *= 0.9 + season * 0.2;
}

fn apply_weather(p: &mut EnvironmentParams, weather: WeatherCondition) {
    match weather {
        WeatherCondition::Clear => {
            p.waveform_type = WaveformType::Sine;
            p.filter_frequency = 3000.0;
            p.noise_intensity = 0.0;
            p.glitch_intensity = 0.0;
        }
        WeatherCondition::Cloudy => {
            p.waveform_type = WaveformType::Triangle;
            p.filter_frequency = 1500.0;
            p.noise_intensity = 0.05;
            p.glitch_intensity = 0.0;
            p.bloom_intensity += 0.1;

            p.neighbor_radius *= 1.15;
            p.cohesion_strength *= 0.9;
            p.separation_strength *= 1.1;
        }
        WeatherCondition::Rain => {
            p.waveform_type = WaveformType::Triangle;
            p.filter_frequency = 800.0;
            p.noise_level = 0.15;
            p.noise_intensity = 0.12;
            p.glitch_intensity = 0.02;
            p.reverb_wet = (p.reverb_wet + 0.2).min(RAIN_REVERB_CEILING);

            p.neighbor_radius *= 1.3;
            p.attraction_force *= 0.7;
            p.repulsion_force *= 1.2;
            p.cohesion_strength *= 0.6;
            p.activity_threshold *= 0.9;
        }
        WeatherCondition::Snow => {
            p.waveform_type = WaveformType::Sine;
            p.filter_frequency = 600.0;
            p.noise_level = 0.08;
            p.noise_intensity = 0.15;
            p.glitch_intensity = 0.0;
            p.particle_speed *= 0.5;
            p.bloom_intensity += 0.2;

            p.neighbor_radius *= 0.7;
            p.attraction_force *= 1.3;
            p.cohesion_strength *= 1.4;
            p.separation_strength *= 0.5;
            p.activity_threshold *= 1.3;
        }
        WeatherCondition::Storm => {
            p.waveform_type = WaveformType::Square;
            p.filter_frequency = 1200.0;
            p.noise_level = 0.25;
            p.noise_intensity = 0.2;
            p.glitch_intensity = 0.15;
            p.bpm += 10.0;

            p.neighbor_radius *= 1.5;
            p.attraction_force *= 0.5;
            p.repulsion_force *= 1.8;
            p.cohesion_strength *= 0.4;
            p.separation_strength *= 1.6;
            p.activity_threshold *= 0.6;
        }
    }
}

/// Final stage: bound the Lenia parameters and cap the tempo. Idempotent.
pub fn clamp_params(p: &mut EnvironmentParams) {
    p.neighbor_radius = p
        .neighbor_radius
        .clamp(NEIGHBOR_RADIUS_RANGE.0, NEIGHBOR_RADIUS_RANGE.1);
    p.attraction_force = p.attraction_force.clamp(0.0, 1.0);
    p.repulsion_force = p.repulsion_force.clamp(0.0, 1.0);
    p.cohesion_strength = p.cohesion_strength.clamp(0.0, 1.0);
    p.separation_strength = p.separation_strength.clamp(0.0, 1.0);
    p.activity_threshold = p
        .activity_threshold
        .clamp(ACTIVITY_THRESHOLD_RANGE.0, ACTIVITY_THRESHOLD_RANGE.1);
    p.bpm = p.bpm.min(MAX_BPM);
}

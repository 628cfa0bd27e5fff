// Audio engine tunables.
//
// Loaded as the `audio` section of `InstallationConfig`. Defaults reproduce
// the installation's reference sound: an 8 s hall at 60 % wet, a dotted
// eighth echo, a 2 kHz lowpass on the synth bus. Partial JSON objects are
// valid; missing fields take these defaults.
//
// The reverb tap density is the main cost knob: the reverb does one
// multiply-add per tap per sample.

use std::time::Duration;

use nictia_env::location::duration_millis;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Reverb tail length in seconds (time to fall 60 dB).
    pub reverb_decay: f32,
    pub reverb_pre_delay: f32,
    /// Impulses per second in the generated response.
    pub reverb_density: f32,
    /// Wet level the reverb fades up to once installed.
    pub reverb_wet: f32,
    #[serde(with = "duration_millis")]
    pub reverb_fade_in: Duration,
    /// Background generation longer than this disables the reverb.
    #[serde(with = "duration_millis")]
    pub reverb_timeout: Duration,
    pub delay_feedback: f32,
    pub delay_wet: f32,
    pub filter_frequency: f32,
    pub filter_q: f32,
    pub drone_voices: usize,
    /// Tempo range drawn from on the first start, before any environment
    /// bundle overrides it.
    pub start_bpm_min: f32,
    pub start_bpm_max: f32,
    /// Initial master volume, 0..=100.
    pub volume: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            reverb_decay: 8.0,
            reverb_pre_delay: 0.2,
            reverb_density: 2000.0,
            reverb_wet: 0.6,
            reverb_fade_in: Duration::from_secs(3),
            reverb_timeout: Duration::from_millis(2500),
            delay_feedback: 0.4,
            delay_wet: 0.3,
            filter_frequency: 2000.0,
            filter_q: 1.0,
            drone_voices: 8,
            start_bpm_min: 60.0,
            start_bpm_max: 90.0,
            volume: 100,
        }
    }
}

impl AudioConfig {
    pub fn sample_rate_f32(&self) -> f32 {
        self.sample_rate as f32
    }

    /// Reject values the engine cannot run with. Returns the first problem
    /// found.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("audio.sample_rate must be positive".into());
        }
        for (name, value) in [
            ("reverb_decay", self.reverb_decay),
            ("reverb_density", self.reverb_density),
            ("filter_frequency", self.filter_frequency),
            ("filter_q", self.filter_q),
            ("start_bpm_min", self.start_bpm_min),
            ("start_bpm_max", self.start_bpm_max),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("audio.{name} must be positive, got {value}"));
            }
        }
        if self.start_bpm_min > self.start_bpm_max {
            return Err(format!(
                "audio.start_bpm_min ({}) is above start_bpm_max ({})",
                self.start_bpm_min, self.start_bpm_max
            ));
        }
        if !(0.0..1.0).contains(&self.delay_feedback) {
            return Err(format!(
                "audio.delay_feedback must be in [0, 1), got {}",
                self.delay_feedback
            ));
        }
        for (name, value) in [("reverb_wet", self.reverb_wet), ("delay_wet", self.delay_wet)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("audio.{name} must be in [0, 1], got {value}"));
            }
        }
        if !self.reverb_pre_delay.is_finite() || self.reverb_pre_delay < 0.0 {
            return Err(format!(
                "audio.reverb_pre_delay must not be negative, got {}",
                self.reverb_pre_delay
            ));
        }
        if self.drone_voices == 0 {
            return Err("audio.drone_voices must be at least 1".into());
        }
        Ok(())
    }

    /// A cheap configuration for tests: low sample rate, short sparse tail.
    pub fn lightweight() -> Self {
        Self {
            sample_rate: 8000,
            reverb_decay: 0.5,
            reverb_pre_delay: 0.01,
            reverb_density: 200.0,
            ..Self::default()
        }
    }
}

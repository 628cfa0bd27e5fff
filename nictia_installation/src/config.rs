// Installation configuration.
//
// One JSON document with a section per crate plus the session knobs:
//
//   {
//     "env":     { ...EnvironmentConfig... },
//     "audio":   { ...AudioConfig... },
//     "field":   { ...FieldConfig... },
//     "session": { "seed": 7, "frame_rate": 60, "block_size": 512 }
//   }
//
// Every section and every field is optional. An empty object is the
// reference installation.

use std::path::{Path, PathBuf};

use nictia_audio::AudioConfig;
use nictia_env::{DeviceSignals, EnvironmentConfig};
use nictia_field::FieldConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root seed. The monitor and the engine each get their own fork.
    pub seed: u64,
    /// Visual frames per second of simulated time.
    pub frame_rate: f64,
    /// Audio is rendered in chunks of at most this many samples.
    pub block_size: usize,
    /// Kick off an environment fetch as part of `start`.
    pub refresh_on_start: bool,
    /// Pin the host description instead of probing. Drives both the audio
    /// profile and the field tier.
    pub device: Option<DeviceSignals>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(format!(
                "session.frame_rate must be positive, got {}",
                self.frame_rate
            ));
        }
        if self.block_size == 0 {
            return Err("session.block_size must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0x4e49_4354,
            frame_rate: 60.0,
            block_size: 512,
            refresh_on_start: true,
            device: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    pub env: EnvironmentConfig,
    pub audio: AudioConfig,
    pub field: FieldConfig,
    pub session: SessionConfig,
}

impl InstallationConfig {
    /// Parse and validate. Values that would stall or crash the session
    /// are errors here rather than at `start`.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.audio.validate()?;
        self.field.validate()?;
        self.session.validate()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(path, &text)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

// Device-tier audio profile.
//
// Decides, once per engine, how much work the audio side may do: analyser
// resolution, how often the loops fire, and whether the background reverb
// is attempted at all. The decision comes from a `ProfileStrategy` so tests
// can hand the engine a fixed profile instead of depending on the host.
//
// Tiers:
// - full:         64 analyser bins, 256 waveform samples, drone every 2
//                 measures, pulse every eighth, noise every quarter.
// - conservative: 32 bins, 128 samples, drone every 4 measures, pulse every
//                 quarter, noise every half note.
//
// Conservative applies to handhelds and to hosts under 4 cores or 4 GB.
// Reverb is skipped for save-data, reduced-motion, and for Safari on a
// handheld with at most 4 cores or at most 4 GB.

use std::sync::OnceLock;

use nictia_env::DeviceSignals;
use serde::{Deserialize, Serialize};

use crate::transport::{LoopKind, NoteValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioProfile {
    pub analyser_bins: usize,
    pub waveform_samples: usize,
    pub drone_interval: NoteValue,
    pub pulse_interval: NoteValue,
    pub noise_interval: NoteValue,
    pub skip_reverb: bool,
}

impl AudioProfile {
    pub fn full() -> Self {
        Self {
            analyser_bins: 64,
            waveform_samples: 256,
            drone_interval: NoteValue::Measures(2),
            pulse_interval: NoteValue::Eighth,
            noise_interval: NoteValue::Quarter,
            skip_reverb: false,
        }
    }

    pub fn conservative() -> Self {
        Self {
            analyser_bins: 32,
            waveform_samples: 128,
            drone_interval: NoteValue::Measures(4),
            pulse_interval: NoteValue::Quarter,
            noise_interval: NoteValue::Half,
            skip_reverb: false,
        }
    }

    pub fn interval(&self, kind: LoopKind) -> NoteValue {
        match kind {
            LoopKind::Drone => self.drone_interval,
            LoopKind::Pulse => self.pulse_interval,
            LoopKind::Noise => self.noise_interval,
        }
    }

    /// Heuristic tier selection from host signals.
    pub fn from_signals(signals: &DeviceSignals) -> Self {
        let mobile = signals.is_mobile();
        let weak = signals.cores < 4 || signals.memory_gb < 4.0;
        let mut profile = if mobile || weak {
            Self::conservative()
        } else {
            Self::full()
        };
        let constrained_safari = mobile
            && signals.is_safari()
            && (signals.cores <= 4 || signals.memory_gb <= 4.0);
        profile.skip_reverb =
            signals.save_data || signals.prefers_reduced_motion || constrained_safari;
        profile
    }
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self::full()
    }
}

/// Source of the engine's profile. Consulted at most once per engine.
pub trait ProfileStrategy: Send + Sync {
    fn detect(&self) -> AudioProfile;
}

/// Derives the profile from a `DeviceSignals` snapshot.
#[derive(Clone, Debug)]
pub struct HeuristicProfile {
    pub signals: DeviceSignals,
}

impl HeuristicProfile {
    pub fn new(signals: DeviceSignals) -> Self {
        Self { signals }
    }
}

impl ProfileStrategy for HeuristicProfile {
    fn detect(&self) -> AudioProfile {
        let profile = AudioProfile::from_signals(&self.signals);
        log::debug!("audio profile from {:?}: {profile:?}", self.signals);
        profile
    }
}

/// Always returns the same profile.
#[derive(Clone, Copy, Debug)]
pub struct FixedProfile(pub AudioProfile);

impl ProfileStrategy for FixedProfile {
    fn detect(&self) -> AudioProfile {
        self.0
    }
}

/// Defers to `process_profile()`, so every engine in the process shares one
/// probe of the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbedProfile;

impl ProfileStrategy for ProbedProfile {
    fn detect(&self) -> AudioProfile {
        process_profile()
    }
}

/// Profile for this process, probed from the host on first call.
pub fn process_profile() -> AudioProfile {
    static PROFILE: OnceLock<AudioProfile> = OnceLock::new();
    *PROFILE.get_or_init(|| HeuristicProfile::new(DeviceSignals::probe()).detect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> DeviceSignals {
        DeviceSignals {
            cores: 8,
            memory_gb: 16.0,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0".into(),
            ..DeviceSignals::default()
        }
    }

    #[test]
    fn desktop_gets_full_profile_with_reverb() {
        let p = AudioProfile::from_signals(&desktop());
        assert_eq!(p, AudioProfile::full());
        assert!(!p.skip_reverb);
    }

    #[test]
    fn constrained_phone_is_conservative_without_reverb() {
        let p = AudioProfile::from_signals(&DeviceSignals::constrained());
        assert_eq!(p.analyser_bins, 32);
        assert_eq!(p.waveform_samples, 128);
        assert_eq!(p.drone_interval, NoteValue::Measures(4));
        assert!(p.skip_reverb);
    }

    #[test]
    fn reduced_motion_skips_reverb_only() {
        let signals = DeviceSignals {
            prefers_reduced_motion: true,
            ..desktop()
        };
        let p = AudioProfile::from_signals(&signals);
        assert_eq!(p.analyser_bins, 64);
        assert!(p.skip_reverb);
    }

    #[test]
    fn strong_iphone_keeps_reverb() {
        let signals = DeviceSignals {
            cores: 6,
            memory_gb: 6.0,
            save_data: false,
            ..DeviceSignals::constrained()
        };
        let p = AudioProfile::from_signals(&signals);
        assert_eq!(p.analyser_bins, 32);
        assert!(!p.skip_reverb);
    }

    #[test]
    fn process_profile_is_stable() {
        assert_eq!(process_profile(), process_profile());
    }
}

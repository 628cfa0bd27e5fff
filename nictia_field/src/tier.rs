// Performance tiers.
//
// One of three fixed configurations, chosen from `DeviceSignals`:
//
//   tier    particles  lenia  stride  rebuild  post     fragments
//   high    5000       on     2       2        full     12
//   medium  3000       on     4       3        medium   8
//   low     1500       off    8       4        minimal  4
//
// Reduced motion or save-data forces low. High needs at least 8 cores and
// 8 GB on a non-handheld; medium needs at least 4 cores and 4 GB.

use nictia_env::DeviceSignals;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessing {
    Full,
    Medium,
    Minimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub particle_count: usize,
    pub enable_lenia: bool,
    /// Only every `lenia_stride`-th particle computes interaction forces.
    pub lenia_stride: usize,
    /// The grid is rebuilt (and forces computed) every this many frames.
    pub grid_rebuild_interval: u64,
    pub post_processing: PostProcessing,
    pub fragment_count: usize,
}

impl PerformanceLevel {
    pub fn detect(signals: &DeviceSignals) -> Self {
        if signals.prefers_reduced_motion || signals.save_data {
            return PerformanceLevel::Low;
        }
        if signals.cores >= 8 && signals.memory_gb >= 8.0 && !signals.is_mobile() {
            return PerformanceLevel::High;
        }
        if signals.cores >= 4 && signals.memory_gb >= 4.0 {
            return PerformanceLevel::Medium;
        }
        PerformanceLevel::Low
    }

    pub fn config(self) -> PerformanceConfig {
        match self {
            PerformanceLevel::High => PerformanceConfig {
                particle_count: 5000,
                enable_lenia: true,
                lenia_stride: 2,
                grid_rebuild_interval: 2,
                post_processing: PostProcessing::Full,
                fragment_count: 12,
            },
            PerformanceLevel::Medium => PerformanceConfig {
                particle_count: 3000,
                enable_lenia: true,
                lenia_stride: 4,
                grid_rebuild_interval: 3,
                post_processing: PostProcessing::Medium,
                fragment_count: 8,
            },
            PerformanceLevel::Low => PerformanceConfig {
                particle_count: 1500,
                enable_lenia: false,
                lenia_stride: 8,
                grid_rebuild_interval: 4,
                post_processing: PostProcessing::Minimal,
                fragment_count: 4,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(cores: u32, memory_gb: f64) -> DeviceSignals {
        DeviceSignals {
            cores,
            memory_gb,
            ..DeviceSignals::default()
        }
    }

    #[test]
    fn tiers_follow_capability() {
        assert_eq!(PerformanceLevel::detect(&signals(16, 32.0)), PerformanceLevel::High);
        assert_eq!(PerformanceLevel::detect(&signals(8, 4.0)), PerformanceLevel::Medium);
        assert_eq!(PerformanceLevel::detect(&signals(4, 4.0)), PerformanceLevel::Medium);
        assert_eq!(PerformanceLevel::detect(&signals(2, 8.0)), PerformanceLevel::Low);
    }

    #[test]
    fn preferences_force_low() {
        let d = DeviceSignals {
            prefers_reduced_motion: true,
            ..signals(16, 32.0)
        };
        assert_eq!(PerformanceLevel::detect(&d), PerformanceLevel::Low);
        assert_eq!(
            PerformanceLevel::detect(&DeviceSignals::constrained()),
            PerformanceLevel::Low
        );
    }

    #[test]
    fn strong_phone_is_at_most_medium() {
        let d = DeviceSignals {
            cores: 8,
            memory_gb: 8.0,
            save_data: false,
            ..DeviceSignals::constrained()
        };
        assert_eq!(PerformanceLevel::detect(&d), PerformanceLevel::Medium);
    }

    #[test]
    fn table_matches_tiers() {
        let low = PerformanceLevel::Low.config();
        assert!(!low.enable_lenia);
        assert_eq!(low.particle_count, 1500);
        assert_eq!(PerformanceLevel::High.config().fragment_count, 12);
        assert_eq!(PerformanceLevel::Medium.config().lenia_stride, 4);
    }
}

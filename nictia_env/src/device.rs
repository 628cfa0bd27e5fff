// Host capability snapshot.
//
// The signals a browser would expose through `navigator`: logical core
// count, device memory, user agent, and the reduced-motion and save-data
// preferences. Both the audio engine's `AudioProfile` and the field's
// `PerformanceLevel` are decided from one `DeviceSignals` value, so a test
// can describe a constrained phone once and hand it to both.

use serde::{Deserialize, Serialize};

/// Core count assumed when the host will not say.
const FALLBACK_CORES: u32 = 4;
/// Memory assumed when the host will not say, in GB.
const FALLBACK_MEMORY_GB: f64 = 4.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSignals {
    pub cores: u32,
    pub memory_gb: f64,
    pub user_agent: String,
    pub prefers_reduced_motion: bool,
    pub save_data: bool,
}

impl Default for DeviceSignals {
    fn default() -> Self {
        Self {
            cores: FALLBACK_CORES,
            memory_gb: FALLBACK_MEMORY_GB,
            user_agent: String::new(),
            prefers_reduced_motion: false,
            save_data: false,
        }
    }
}

impl DeviceSignals {
    /// Fill in what the host exposes. Only the core count is discoverable
    /// from std; memory and preferences keep their defaults.
    pub fn probe() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(FALLBACK_CORES);
        let signals = Self {
            cores,
            user_agent: format!("nictia/{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
            ..Self::default()
        };
        log::debug!("probed device signals: {signals:?}");
        signals
    }

    /// A low-end phone on a metered connection.
    pub fn constrained() -> Self {
        Self {
            cores: 2,
            memory_gb: 2.0,
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 \
                         Mobile/15E148 Safari/604.1"
                .into(),
            prefers_reduced_motion: false,
            save_data: true,
        }
    }

    /// Case-insensitive match against the usual handheld user-agent tokens.
    pub fn is_mobile(&self) -> bool {
        const TOKENS: [&str; 7] = [
            "iphone",
            "ipad",
            "android",
            "webos",
            "blackberry",
            "iemobile",
            "opera mini",
        ];
        let ua = self.user_agent.to_lowercase();
        TOKENS.iter().any(|token| ua.contains(token))
    }

    /// Safari proper; Chrome and Android browsers also advertise "Safari".
    pub fn is_safari(&self) -> bool {
        self.user_agent.contains("Safari")
            && !self.user_agent.contains("Chrome")
            && !self.user_agent.contains("Android")
    }
}

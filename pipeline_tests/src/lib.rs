// Test-only sources for end-to-end installation tests.
//
// Scripted stand-ins for the outside world: a weather source that replays a
// queue of observations and failures with per-call delays, a location
// provider that always refuses, and reverb builders that are slow or broken.
// Everything else in the tests runs the real monitor, engine, field and
// session code.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nictia_audio::dsp::Tap;
use nictia_audio::{AudioConfig, AudioError, ReverbBuilder, ReverbSpec, VelvetReverbBuilder};
use nictia_env::{
    EnvError, LocationError, LocationProvider, PositionOptions, WeatherObservation,
    WeatherSource,
};
use nictia_field::PerformanceLevel;
use nictia_installation::{InstallationConfig, Sources};

pub use nictia_env::FixedClock;

/// 2024-06-21 05:00 UTC: 14:00 in Tokyo, 05:00 at UTC+0.
pub const SOLSTICE_0500_UTC: i64 = 1_718_946_000;

/// 2024-06-21 02:00 UTC.
pub const SOLSTICE_0200_UTC: i64 = 1_718_935_200;

/// Default timeout for blocking waits.
pub const WAIT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Spin until `done` holds, panicking after `WAIT`.
pub fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < WAIT, "timed out waiting for {what}");
        thread::sleep(POLL_INTERVAL);
    }
}

pub fn observation(weather_code: i32, is_day: bool, utc_offset_seconds: i32) -> WeatherObservation {
    WeatherObservation {
        temperature_c: if is_day { 24.0 } else { -3.0 },
        weather_code,
        is_day,
        utc_offset_seconds,
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// One scripted reply: wait `delay`, then return `result`.
#[derive(Clone, Debug)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<WeatherObservation, String>,
}

impl Reply {
    pub fn ok(obs: WeatherObservation) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(obs),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(message.into()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Replays replies in call order. Once the script runs out, the last reply
/// repeats.
pub struct ScriptedWeather {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedWeather {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WeatherSource for ScriptedWeather {
    fn fetch(&self, _latitude: f64, _longitude: f64) -> Result<WeatherObservation, EnvError> {
        let next = self.script.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Reply::fail("script is empty")),
        };
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(reply.delay);
        reply.result.map_err(EnvError::WeatherRequest)
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A host whose user said no.
#[derive(Default)]
pub struct DenyingLocation {
    calls: AtomicUsize,
}

impl DenyingLocation {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LocationProvider for DenyingLocation {
    fn current_position(&self, _options: &PositionOptions) -> Result<nictia_env::Coordinates, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LocationError::PermissionDenied)
    }
}

// ---------------------------------------------------------------------------
// Reverb
// ---------------------------------------------------------------------------

/// Builds the normal reverb after sleeping.
pub struct SlowReverb(pub Duration);

impl ReverbBuilder for SlowReverb {
    fn build(&self, spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError> {
        thread::sleep(self.0);
        VelvetReverbBuilder.build(spec)
    }
}

pub struct FailingReverb;

impl ReverbBuilder for FailingReverb {
    fn build(&self, _spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError> {
        Err(AudioError::ReverbBuild("out of memory".into()))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Small, fast, deterministic installation: 8 kHz audio, a short reverb,
/// the low field tier and a pinned device description.
pub fn test_config(seed: u64) -> InstallationConfig {
    let mut config = InstallationConfig::default();
    config.audio = AudioConfig::lightweight();
    config.field.performance = Some(PerformanceLevel::Low);
    config.session.seed = seed;
    config.session.frame_rate = 30.0;
    config.session.device = Some(nictia_env::DeviceSignals::default());
    config
}

/// Sources with the given weather and location, a fixed clock and an
/// offline audio host.
pub fn test_sources(
    weather: Arc<dyn WeatherSource>,
    location: Arc<dyn LocationProvider>,
    clock: FixedClock,
) -> Sources {
    Sources {
        location,
        weather,
        clock: Arc::new(clock),
        ..Sources::offline()
    }
}

// A running installation: environment monitor, audio engine and particle
// field driven from one frame loop.
//
// Startup (`start`) follows the staged order the engine requires:
// environment refresh kicked off in the background, audio context, light
// graph, current params pushed, transport started, then the background
// reverb requested. First sound never waits on the reverb or the weather.
//
// Each `advance(dt)`:
// 1. drains finished environment fetches and re-derives the local hour;
// 2. pushes the params bundle to the engine if it changed since the last
//    push (the engine ramps toward it, so this is cheap either way);
// 3. renders `dt` worth of audio in `block_size` chunks, carrying the
//    fractional sample over to the next frame;
// 4. steps the particle field with the engine's spectrum (or none while
//    the transport is stopped) and derives the scene.
//
// See also: `nictia_env::monitor` for the fetch lifecycle,
// `nictia_audio::engine` for the audio phases, `nictia_field::sim` for
// the particle step.
//
// **Critical constraint: determinism.** Every random stream is forked from
// `session.seed`. With fixed sources and a fixed clock, two sessions with
// the same config produce the same events and the same particle arrays,
// except for where in the timeline a slow background reverb lands.

use std::sync::Arc;
use std::time::Duration;

use nictia_audio::{
    AudioEngine, AudioError, AudioHost, EnginePhase, HeuristicProfile, OfflineHost,
    ReverbBuilder, ReverbStatus,
};
use nictia_env::{
    DeviceSignals, EnvironmentMonitor, EnvironmentParams, EnvironmentState, LocationProvider,
    StaticWeather, SystemClock, UnavailableLocation, WallClock, WeatherObservation, WeatherSource,
};
use nictia_field::{FrameStats, ParticleField, PerformanceLevel, SceneFrame};
use nictia_prng::FieldRng;
use serde::Serialize;

use crate::config::InstallationConfig;

const MONITOR_STREAM: u64 = 1;
const ENGINE_STREAM: u64 = 2;

/// External collaborators of a session.
pub struct Sources {
    pub location: Arc<dyn LocationProvider>,
    pub weather: Arc<dyn WeatherSource>,
    pub clock: Arc<dyn WallClock>,
    pub audio_host: Box<dyn AudioHost>,
    /// `None` keeps the engine's default generator.
    pub reverb_builder: Option<Arc<dyn ReverbBuilder>>,
}

impl Sources {
    /// No location capability, a clear day everywhere, the system clock and
    /// an offline audio host.
    pub fn offline() -> Self {
        Self {
            location: Arc::new(UnavailableLocation),
            weather: Arc::new(StaticWeather::new(WeatherObservation::clear_day())),
            clock: Arc::new(SystemClock),
            audio_host: Box::new(OfflineHost::new()),
            reverb_builder: None,
        }
    }
}

/// What one `advance` did.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    /// The environment state or the local hour changed this frame.
    pub environment_changed: bool,
    /// A new params bundle was pushed to the engine this frame.
    pub params_pushed: bool,
    pub phase: EnginePhase,
    pub samples_rendered: usize,
    pub peak: f32,
    pub field: FrameStats,
    pub scene: SceneFrame,
}

/// End-of-run totals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub seconds: f64,
    pub samples_rendered: u64,
    pub peak: f32,
    pub events: usize,
    pub lenia_updates: u64,
    pub mean_audio_intensity: f32,
    pub phase: EnginePhase,
    pub reverb: ReverbStatus,
    pub performance: PerformanceLevel,
    pub state: EnvironmentState,
    pub params: EnvironmentParams,
}

pub struct Installation {
    config: InstallationConfig,
    monitor: EnvironmentMonitor,
    engine: AudioEngine,
    field: ParticleField,
    performance: PerformanceLevel,
    pushed_revision: Option<u64>,
    block: Vec<f32>,
    sample_carry: f64,
    frames: u64,
    samples_rendered: u64,
    peak: f32,
    lenia_updates: u64,
    intensity_sum: f64,
}

impl Installation {
    pub fn new(config: InstallationConfig, sources: Sources) -> Self {
        let mut root = FieldRng::new(config.session.seed);
        let monitor = EnvironmentMonitor::new(
            config.env.clone(),
            sources.location,
            sources.weather,
            sources.clock,
            root.fork(MONITOR_STREAM),
        );

        let device = config
            .session
            .device
            .clone()
            .unwrap_or_else(DeviceSignals::probe);

        let mut engine = AudioEngine::new(config.audio.clone(), root.fork(ENGINE_STREAM))
            .with_host(sources.audio_host);
        if config.session.device.is_some() {
            engine = engine.with_profile_strategy(Box::new(HeuristicProfile::new(device.clone())));
        }
        if let Some(builder) = sources.reverb_builder {
            engine = engine.with_reverb_builder(builder);
        }

        let performance = config
            .field
            .performance
            .unwrap_or_else(|| PerformanceLevel::detect(&device));
        let field = ParticleField::new(config.field.clone(), performance.config());
        log::info!("installation ready: seed {}, field tier {performance:?}", config.session.seed);

        Self {
            block: vec![0.0; config.session.block_size.max(1)],
            config,
            monitor,
            engine,
            field,
            performance,
            pushed_revision: None,
            sample_carry: 0.0,
            frames: 0,
            samples_rendered: 0,
            peak: 0.0,
            lenia_updates: 0,
            intensity_sum: 0.0,
        }
    }

    pub fn config(&self) -> &InstallationConfig {
        &self.config
    }

    pub fn monitor(&self) -> &EnvironmentMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut EnvironmentMonitor {
        &mut self.monitor
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn performance(&self) -> PerformanceLevel {
        self.performance
    }

    /// Staged startup. A failure to start the audio context is returned to
    /// the caller; the field and monitor keep working without audio.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.config.session.refresh_on_start {
            self.monitor.refresh();
        }
        self.engine.init_tone_context()?;
        self.engine.init_audio_light()?;
        self.push_params();
        self.engine.start_audio();
        self.engine.init_audio_full()?;
        Ok(())
    }

    /// Re-fetch the environment in the background.
    pub fn refresh(&mut self) {
        self.monitor.refresh();
    }

    /// Block until the pending environment fetch lands or `max` elapses.
    pub fn settle_environment(&mut self, max: Duration) -> bool {
        let settled = self.monitor.poll_until_settled(max);
        self.push_params();
        settled
    }

    fn push_params(&mut self) -> bool {
        let revision = self.monitor.params_revision();
        if self.pushed_revision == Some(revision) {
            return false;
        }
        self.engine.update_environment_audio(self.monitor.params());
        self.pushed_revision = Some(revision);
        true
    }

    pub fn advance(&mut self, dt: f64) -> FrameReport {
        let dt = dt.max(0.0);
        self.frames += 1;

        let fetched = self.monitor.poll();
        let ticked = self.monitor.tick();
        let params_pushed = self.push_params();

        let samples = self.render_audio(dt);

        let spectrum = self
            .engine
            .is_playing()
            .then(|| self.engine.frequency_data());
        let params = self.monitor.params();
        let stats = self.field.step(dt, spectrum.as_deref(), params);
        let scene = SceneFrame::derive(
            self.field.elapsed() as f32,
            params,
            spectrum.as_deref(),
            self.field.performance(),
        );

        self.lenia_updates += stats.lenia_updates as u64;
        self.intensity_sum += f64::from(stats.audio_intensity);

        FrameReport {
            frame: self.frames,
            environment_changed: fetched || ticked,
            params_pushed,
            phase: self.engine.phase(),
            samples_rendered: samples.0,
            peak: samples.1,
            field: stats,
            scene,
        }
    }

    /// Render `dt` seconds of audio. Returns (samples, peak).
    fn render_audio(&mut self, dt: f64) -> (usize, f32) {
        let exact = dt * f64::from(self.config.audio.sample_rate) + self.sample_carry;
        let total = exact.floor().max(0.0) as usize;
        self.sample_carry = exact - total as f64;

        let mut remaining = total;
        let mut peak = 0.0f32;
        while remaining > 0 {
            let n = remaining.min(self.block.len());
            let block = &mut self.block[..n];
            self.engine.render(block);
            peak = block.iter().fold(peak, |p, s| p.max(s.abs()));
            remaining -= n;
        }
        self.samples_rendered += total as u64;
        self.peak = self.peak.max(peak);
        (total, peak)
    }

    /// Advance frame by frame for `seconds` of simulated time.
    pub fn run_for(&mut self, seconds: f64) -> SessionSummary {
        let frame_rate = self.config.session.frame_rate.max(1.0);
        let frames = (seconds.max(0.0) * frame_rate).round() as u64;
        let dt = 1.0 / frame_rate;
        for _ in 0..frames {
            self.advance(dt);
        }
        self.summary()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames: self.frames,
            seconds: self.field.elapsed(),
            samples_rendered: self.samples_rendered,
            peak: self.peak,
            events: self.engine.events().len(),
            lenia_updates: self.lenia_updates,
            mean_audio_intensity: if self.frames == 0 {
                0.0
            } else {
                (self.intensity_sum / self.frames as f64) as f32
            },
            phase: self.engine.phase(),
            reverb: self.engine.reverb_status().clone(),
            performance: self.performance,
            state: self.monitor.state().clone(),
            params: self.monitor.params().clone(),
        }
    }
}

// The audio engine: one object owning the whole signal graph.
//
// Startup is staged so the first sound never waits on the expensive part:
//
//   Uninitialized -> ContextStarted -> LightReady -> FullReady
//
// - `init_tone_context()` asks the host to start (the user-gesture step).
// - `init_audio_light()` builds the synths, the filter -> delay chain and
//   the three loops, with the delay and noise synth feeding the output
//   directly. Runs once; later calls do nothing.
// - `init_audio_full()` starts reverb generation on a worker thread and
//   returns immediately. `poll_background()` (called at the top of every
//   `render`) installs the finished reverb between the delay/noise bus and
//   the output and fades its wet level up from 0, or, on failure or after
//   `reverb_timeout`, disables it for the session. Either way the engine
//   reaches FullReady; playback may run throughout.
//
// Signal flow, per sample:
//
//   drone + pulse -> lowpass -> delay --+
//                                       +--> [reverb] --+--> master -> out
//   noise ------------------------------+               |        |
//   rain bed -------------------------------------------+        +-> analyser
//
// The composer is driven by the transport: each loop that reaches its next
// beat asks the composer for a gesture, which is played on the matching
// synth and recorded as a `CompositionEvent`.
//
// `update_environment_audio()` retargets ramps rather than setting values:
// tempo over 4 s, reverb wet over 2 s, filter cutoff over 3 s, synth
// volumes over 2 s, rain gain over 2 s in / 3 s out. Pushing the same
// bundle twice is harmless. A bundle pushed before the graph exists is kept
// and applied when it is built.
//
// See also: `reverb.rs` for the background build, `profile.rs` for the
// device-tier decisions, `composer.rs` for the gestures.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use nictia_env::{Energy, EnvironmentParams, WaveformType};
use nictia_prng::FieldRng;
use serde::{Deserialize, Serialize};

use crate::analyser::{Analyser, MIN_DECIBELS};
use crate::composer::{Composer, CompositionEvent, Gesture, RETUNE_SECONDS};
use crate::config::AudioConfig;
use crate::dsp::{AdsrShape, FeedbackDelay, Lowpass, Ramp, Reverb, db_to_gain};
use crate::error::AudioError;
use crate::host::{AudioHost, OfflineHost};
use crate::profile::{AudioProfile, ProbedProfile, ProfileStrategy};
use crate::reverb::{
    BuildPoll, DisabledReason, PendingReverb, ReverbBuilder, ReverbSpec, ReverbStatus,
    VelvetReverbBuilder,
};
use crate::synth::{DRONE_SHAPE, MonoSynth, NOISE_SHAPE, NoiseSynth, PolySynth};
use crate::transport::{Loop, LoopKind, NoteValue, Transport};

/// Tempo before the first start, matching the delay's "8n." timing.
const INITIAL_BPM: f32 = 120.0;

const BPM_RAMP_SECONDS: f32 = 4.0;
const REVERB_WET_RAMP_SECONDS: f32 = 2.0;
const FILTER_RAMP_SECONDS: f32 = 3.0;
const VOLUME_RAMP_SECONDS: f32 = 2.0;
const RAIN_IN_SECONDS: f32 = 2.0;
const RAIN_OUT_SECONDS: f32 = 3.0;
const MASTER_RAMP_SECONDS: f32 = 0.05;

const RAIN_CUTOFF_HZ: f32 = 1200.0;
const RAIN_SHAPE: AdsrShape = AdsrShape::new(2.0, 0.0, 1.0, 3.0);

/// Volume 1..=100 maps linearly onto this many dB below full scale.
const VOLUME_RANGE_DB: f32 = 60.0;

/// Synth levels in dB for an energy setting: (drone, pulse).
pub fn energy_levels_db(energy: Energy) -> (f32, f32) {
    match energy {
        Energy::High => (-12.0, -18.0),
        Energy::Low => (-10.0, -24.0),
    }
}

/// Master level in dB for a 0..=100 volume, ignoring mute.
pub fn volume_to_db(volume: u8) -> f32 {
    match volume.min(100) {
        0 => f32::NEG_INFINITY,
        v => -VOLUME_RANGE_DB + VOLUME_RANGE_DB * f32::from(v) / 100.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnginePhase {
    Uninitialized,
    ContextStarted,
    LightReady,
    FullReady,
}

/// Current ramp targets of the live graph, for inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixLevels {
    pub bpm: f32,
    pub filter_frequency: f32,
    pub drone_gain: f32,
    pub pulse_gain: f32,
    pub waveform: WaveformType,
    /// `None` while no reverb is installed.
    pub reverb_wet: Option<f32>,
    /// `None` until the rain bed has been built.
    pub rain_gain: Option<f32>,
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Pink noise through a fixed lowpass, with its own slow envelope and a
/// gain that follows the environment's noise level.
struct RainBed {
    source: NoiseSynth,
    filter: Lowpass,
    gain: Ramp,
}

impl RainBed {
    fn new(rng: FieldRng, sample_rate: f32) -> Self {
        Self {
            source: NoiseSynth::new(RAIN_SHAPE, 0.0, rng, sample_rate),
            filter: Lowpass::new(RAIN_CUTOFF_HZ, 0.707, sample_rate),
            gain: Ramp::new(0.0),
        }
    }

    fn process(&mut self, now: u64) -> f32 {
        let gain = self.gain.next();
        if !self.source.is_sounding() {
            return 0.0;
        }
        self.filter.process(self.source.process(now)) * gain
    }
}

struct Graph {
    drone: PolySynth,
    pulse: MonoSynth,
    noise: NoiseSynth,
    filter: Lowpass,
    delay: FeedbackDelay,
    reverb: Option<Reverb>,
    rain: Option<RainBed>,
    transport: Transport,
    loops: Vec<Loop>,
    composer: Composer,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AudioEngine {
    config: AudioConfig,
    sample_rate: f32,
    host: Box<dyn AudioHost>,
    profile_strategy: Box<dyn ProfileStrategy>,
    profile: OnceLock<AudioProfile>,
    reverb_builder: Arc<dyn ReverbBuilder>,
    phase: EnginePhase,
    reverb_status: ReverbStatus,
    pending_reverb: Option<PendingReverb>,
    graph: Option<Graph>,
    analyser: Option<Analyser>,
    playing: bool,
    has_started: bool,
    volume: u8,
    muted: bool,
    master: Ramp,
    rng: FieldRng,
    /// Render timeline position in samples.
    now: u64,
    events: Vec<CompositionEvent>,
    last_params: Option<EnvironmentParams>,
}

impl AudioEngine {
    /// An engine on an `OfflineHost`, profiled from the probed device, with
    /// the velvet-noise reverb.
    pub fn new(config: AudioConfig, rng: FieldRng) -> Self {
        let volume = config.volume.min(100);
        Self {
            sample_rate: config.sample_rate_f32(),
            config,
            host: Box::new(OfflineHost::new()),
            profile_strategy: Box::new(ProbedProfile),
            profile: OnceLock::new(),
            reverb_builder: Arc::new(VelvetReverbBuilder),
            phase: EnginePhase::Uninitialized,
            reverb_status: ReverbStatus::NotRequested,
            pending_reverb: None,
            graph: None,
            analyser: None,
            playing: false,
            has_started: false,
            volume,
            muted: false,
            master: Ramp::new(db_to_gain(volume_to_db(volume))),
            rng,
            now: 0,
            events: Vec::new(),
            last_params: None,
        }
    }

    pub fn with_host(mut self, host: Box<dyn AudioHost>) -> Self {
        self.host = host;
        self
    }

    pub fn with_profile_strategy(mut self, strategy: Box<dyn ProfileStrategy>) -> Self {
        self.profile_strategy = strategy;
        self
    }

    pub fn with_reverb_builder(mut self, builder: Arc<dyn ReverbBuilder>) -> Self {
        self.reverb_builder = builder;
        self
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// The device profile, detected on first call and fixed afterwards.
    pub fn profile(&self) -> AudioProfile {
        *self.profile.get_or_init(|| self.profile_strategy.detect())
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn reverb_status(&self) -> &ReverbStatus {
        &self.reverb_status
    }

    pub fn is_initialized(&self) -> bool {
        self.phase >= EnginePhase::LightReady
    }

    pub fn is_fully_ready(&self) -> bool {
        self.phase == EnginePhase::FullReady
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Samples rendered so far.
    pub fn sample_clock(&self) -> u64 {
        self.now
    }

    pub fn events(&self) -> &[CompositionEvent] {
        &self.events
    }

    /// Transport position in beats, once the graph exists.
    pub fn transport_position(&self) -> Option<f64> {
        self.graph.as_ref().map(|g| g.transport.position())
    }

    fn seconds_to_samples(&self, seconds: f32) -> u32 {
        (seconds * self.sample_rate).round() as u32
    }

    // -----------------------------------------------------------------------
    // Staged initialization
    // -----------------------------------------------------------------------

    /// Start the output context. Idempotent once running.
    pub fn init_tone_context(&mut self) -> Result<(), AudioError> {
        if self.phase != EnginePhase::Uninitialized {
            return Ok(());
        }
        self.host.resume()?;
        self.phase = EnginePhase::ContextStarted;
        log::info!("audio context started at {} Hz", self.config.sample_rate);
        Ok(())
    }

    /// Build the synth graph without reverb. Runs once.
    pub fn init_audio_light(&mut self) -> Result<(), AudioError> {
        match self.phase {
            EnginePhase::Uninitialized => return Err(AudioError::ContextNotStarted),
            EnginePhase::LightReady | EnginePhase::FullReady => {
                log::debug!("init_audio_light: graph already built");
                return Ok(());
            }
            EnginePhase::ContextStarted => {}
        }

        let profile = self.profile();
        let sr = self.sample_rate;
        let (drone_db, pulse_db) = energy_levels_db(Energy::High);
        let loops = LoopKind::ALL
            .iter()
            .map(|&kind| Loop::new(kind, profile.interval(kind)))
            .collect();

        self.graph = Some(Graph {
            drone: PolySynth::new(
                self.config.drone_voices,
                WaveformType::Sine,
                DRONE_SHAPE,
                drone_db,
                sr,
            ),
            pulse: MonoSynth::new(pulse_db, sr),
            noise: NoiseSynth::new(NOISE_SHAPE, -24.0, self.rng.fork(2), sr),
            filter: Lowpass::new(self.config.filter_frequency, self.config.filter_q, sr),
            delay: FeedbackDelay::new(
                1.0,
                NoteValue::DottedEighth.seconds(INITIAL_BPM),
                self.config.delay_feedback,
                self.config.delay_wet,
                sr,
            ),
            reverb: None,
            rain: None,
            transport: Transport::new(INITIAL_BPM, sr),
            loops,
            composer: Composer::new(self.rng.fork(1)),
        });
        self.analyser = Some(Analyser::new(profile.analyser_bins, profile.waveform_samples));
        self.phase = EnginePhase::LightReady;
        log::info!("audio graph built (profile {profile:?})");

        if let Some(params) = self.last_params.clone() {
            self.update_environment_audio(&params);
        }
        Ok(())
    }

    /// Start background reverb generation and return immediately. Builds
    /// the light graph first if needed. Never retried once settled.
    pub fn init_audio_full(&mut self) -> Result<(), AudioError> {
        if self.phase == EnginePhase::ContextStarted {
            self.init_audio_light()?;
        }
        if self.phase == EnginePhase::Uninitialized {
            return Err(AudioError::ContextNotStarted);
        }
        if self.reverb_status != ReverbStatus::NotRequested {
            return Ok(());
        }

        if self.profile().skip_reverb {
            log::info!("reverb skipped for this device profile");
            self.settle_reverb(ReverbStatus::Disabled(DisabledReason::SkippedByProfile));
            return Ok(());
        }

        let spec = ReverbSpec {
            decay: self.config.reverb_decay,
            pre_delay: self.config.reverb_pre_delay,
            density: self.config.reverb_density,
            sample_rate: self.sample_rate,
            seed: self.rng.next_u64(),
        };
        match PendingReverb::spawn(
            Arc::clone(&self.reverb_builder),
            spec,
            self.config.reverb_timeout,
        ) {
            Ok(pending) => {
                self.pending_reverb = Some(pending);
                self.reverb_status = ReverbStatus::Generating;
                log::debug!("reverb generation started");
            }
            Err(e) => {
                log::warn!("{e}; continuing without reverb");
                self.settle_reverb(ReverbStatus::Disabled(DisabledReason::WorkerLost));
            }
        }
        Ok(())
    }

    /// Check the background reverb build without blocking.
    pub fn poll_background(&mut self) {
        let Some(pending) = &self.pending_reverb else {
            return;
        };
        let outcome = pending.poll();
        self.apply_build(outcome);
    }

    /// Block until the engine is fully ready or `max` elapses. Returns
    /// whether it is fully ready.
    pub fn wait_fully_ready(&mut self, max: Duration) -> bool {
        let end = Instant::now() + max;
        loop {
            self.poll_background();
            if self.is_fully_ready() {
                return true;
            }
            let now = Instant::now();
            let Some(pending) = &self.pending_reverb else {
                return false;
            };
            if now >= end {
                return false;
            }
            let outcome = pending.wait(end - now);
            self.apply_build(outcome);
        }
    }

    fn apply_build(&mut self, outcome: BuildPoll) {
        match outcome {
            BuildPoll::Pending => {}
            BuildPoll::Ready(taps) => {
                let fade = self.seconds_to_samples(self.config.reverb_fade_in.as_secs_f32());
                let target = self.config.reverb_wet;
                if let Some(graph) = self.graph.as_mut() {
                    let mut reverb = Reverb::new(taps, 0.0);
                    reverb.wet.ramp_to(target, fade);
                    log::info!("reverb installed ({} taps)", reverb.tap_count());
                    graph.reverb = Some(reverb);
                }
                self.settle_reverb(ReverbStatus::Active);
            }
            BuildPoll::Failed(reason) => {
                log::warn!("reverb disabled ({reason:?}); continuing without it");
                self.settle_reverb(ReverbStatus::Disabled(reason));
            }
        }
    }

    fn settle_reverb(&mut self, status: ReverbStatus) {
        self.pending_reverb = None;
        self.reverb_status = status;
        if self.phase >= EnginePhase::LightReady {
            self.phase = EnginePhase::FullReady;
        }
    }

    // -----------------------------------------------------------------------
    // Transport control
    // -----------------------------------------------------------------------

    /// Start the transport and all loops from beat 0. Does nothing before
    /// the graph exists or while already playing.
    pub fn start_audio(&mut self) {
        if self.playing {
            return;
        }
        let first_start = !self.has_started;
        let start_bpm = if first_start {
            let low = self.config.start_bpm_min;
            let high = self.config.start_bpm_max.max(low + 0.01);
            Some(self.rng.range_f32(low, high))
        } else {
            None
        };
        let env_bpm = self.last_params.as_ref().map(|p| p.bpm as f32);
        let bpm_ramp = self.seconds_to_samples(BPM_RAMP_SECONDS);
        let Some(graph) = self.graph.as_mut() else {
            log::debug!("start_audio before init_audio_light; ignored");
            return;
        };

        if let Some(bpm) = start_bpm {
            graph.transport.bpm.set(bpm);
            if let Some(target) = env_bpm {
                graph.transport.bpm.ramp_to(target, bpm_ramp);
            }
        }
        graph.transport.start();
        for l in &mut graph.loops {
            l.start(0.0);
        }
        if let Some(rain) = graph.rain.as_mut() {
            rain.source.trigger_attack();
        }
        self.playing = true;
        self.has_started = true;
        log::info!("playback started at {:.1} bpm", graph.transport.bpm.value());
    }

    /// Stop the loops and the transport. Sounding notes release naturally.
    pub fn stop_audio(&mut self) {
        if !self.playing {
            return;
        }
        if let Some(graph) = self.graph.as_mut() {
            for l in &mut graph.loops {
                l.stop();
            }
            graph.transport.stop();
            if let Some(rain) = graph.rain.as_mut() {
                rain.source.trigger_release();
            }
        }
        self.playing = false;
        log::info!("playback stopped");
    }

    /// Flip playback; returns whether audio is now playing.
    pub fn toggle_audio(&mut self) -> bool {
        if self.playing {
            self.stop_audio();
        } else {
            self.start_audio();
        }
        self.playing
    }

    // -----------------------------------------------------------------------
    // Parameters and volume
    // -----------------------------------------------------------------------

    /// Retarget the graph from an environment bundle.
    pub fn update_environment_audio(&mut self, params: &EnvironmentParams) {
        self.last_params = Some(params.clone());
        let bpm_ramp = self.seconds_to_samples(BPM_RAMP_SECONDS);
        let wet_ramp = self.seconds_to_samples(REVERB_WET_RAMP_SECONDS);
        let filter_ramp = self.seconds_to_samples(FILTER_RAMP_SECONDS);
        let volume_ramp = self.seconds_to_samples(VOLUME_RAMP_SECONDS);
        let rain_in = self.seconds_to_samples(RAIN_IN_SECONDS);
        let rain_out = self.seconds_to_samples(RAIN_OUT_SECONDS);
        let sr = self.sample_rate;
        let playing = self.playing;

        let Some(graph) = self.graph.as_mut() else {
            log::debug!("environment bundle stored until the graph is built");
            return;
        };

        graph.transport.bpm.ramp_to(params.bpm as f32, bpm_ramp);
        if let Some(reverb) = graph.reverb.as_mut() {
            reverb.wet.ramp_to(params.reverb_wet as f32, wet_ramp);
        }
        graph
            .filter
            .frequency
            .ramp_to(params.filter_frequency as f32, filter_ramp);

        let (drone_db, pulse_db) = energy_levels_db(params.energy);
        graph.drone.volume.ramp_to(db_to_gain(drone_db), volume_ramp);
        graph.pulse.volume.ramp_to(db_to_gain(pulse_db), volume_ramp);
        graph.drone.set_waveform(params.waveform_type);

        let noise_level = params.noise_level.clamp(0.0, 1.0) as f32;
        if graph.rain.is_none() && noise_level > 0.0 {
            let mut rain = RainBed::new(self.rng.fork(3), sr);
            if playing {
                rain.source.trigger_attack();
            }
            log::debug!("rain bed created");
            graph.rain = Some(rain);
        }
        if let Some(rain) = graph.rain.as_mut() {
            let ramp = if noise_level > rain.gain.value() {
                rain_in
            } else {
                rain_out
            };
            rain.gain.ramp_to(noise_level, ramp);
        }
    }

    /// Set the master volume, 0..=100. Remembered across mute.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        self.retarget_master();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.retarget_master();
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Effective master level in dB; `-inf` when muted or at volume 0.
    pub fn output_gain_db(&self) -> f32 {
        if self.muted {
            f32::NEG_INFINITY
        } else {
            volume_to_db(self.volume)
        }
    }

    fn retarget_master(&mut self) {
        let samples = self.seconds_to_samples(MASTER_RAMP_SECONDS);
        self.master
            .ramp_to(db_to_gain(self.output_gain_db()), samples);
    }

    pub fn mix_levels(&self) -> Option<MixLevels> {
        let graph = self.graph.as_ref()?;
        Some(MixLevels {
            bpm: graph.transport.bpm.target(),
            filter_frequency: graph.filter.frequency.target(),
            drone_gain: graph.drone.volume.target(),
            pulse_gain: graph.pulse.volume.target(),
            waveform: graph.drone.waveform(),
            reverb_wet: graph.reverb.as_ref().map(|r| r.wet.target()),
            rain_gain: graph.rain.as_ref().map(|r| r.gain.target()),
        })
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Fill `out` with the next mono samples.
    pub fn render(&mut self, out: &mut [f32]) {
        self.poll_background();
        for slot in out.iter_mut() {
            let fired = self.graph.as_mut().map(step_transport);
            for kind in fired.into_iter().flatten().flatten() {
                self.fire(kind);
            }
            let now = self.now;
            let dry = self.graph.as_mut().map_or(0.0, |g| mix_sample(g, now));
            let sample = dry * self.master.next();
            if let Some(analyser) = self.analyser.as_mut() {
                analyser.push(sample);
            }
            *slot = sample;
            self.now += 1;
        }
    }

    fn fire(&mut self, kind: LoopKind) {
        let sr = self.sample_rate;
        let now = self.now;
        let retune_samples = self.seconds_to_samples(RETUNE_SECONDS);
        let Some(graph) = self.graph.as_mut() else {
            return;
        };
        let Some(gesture) = graph.composer.gesture_for(kind) else {
            return;
        };
        let bpm = graph.transport.bpm.value();
        let duration = gesture.duration().samples(bpm, sr);
        match &gesture {
            Gesture::Drone {
                notes,
                filter_retune,
                ..
            } => {
                for &note in notes {
                    graph.drone.trigger_attack_release(note, duration, now);
                }
                if let Some(hz) = filter_retune {
                    graph.filter.frequency.ramp_to(*hz, retune_samples);
                }
            }
            Gesture::Pulse { note, .. } => {
                graph.pulse.trigger_attack_release(*note, duration, now);
            }
            Gesture::Noise { .. } => {
                graph.noise.trigger_attack_release(duration, now);
            }
        }
        self.events.push(CompositionEvent {
            sample: now,
            bpm,
            gesture,
        });
    }

    // -----------------------------------------------------------------------
    // Analysis feed
    // -----------------------------------------------------------------------

    /// FFT magnitudes in dB, `profile().analyser_bins` long.
    pub fn frequency_data(&mut self) -> Vec<f32> {
        match self.analyser.as_mut() {
            Some(a) => a.frequency_data(),
            None => vec![MIN_DECIBELS; self.profile().analyser_bins],
        }
    }

    /// Latest output samples, `profile().waveform_samples` long.
    pub fn waveform_data(&self) -> Vec<f32> {
        match self.analyser.as_ref() {
            Some(a) => a.waveform_data(),
            None => vec![0.0; self.profile().waveform_samples],
        }
    }
}

/// Advance the transport one sample and report which loops fired.
fn step_transport(graph: &mut Graph) -> [Option<LoopKind>; 3] {
    let mut fired = [None; 3];
    if graph.transport.is_running() {
        let position = graph.transport.position();
        for (slot, l) in fired.iter_mut().zip(graph.loops.iter_mut()) {
            if l.poll(position) {
                *slot = Some(l.kind);
            }
        }
    }
    graph.transport.tick();
    fired
}

fn mix_sample(graph: &mut Graph, now: u64) -> f32 {
    let synths = graph.drone.process(now) + graph.pulse.process(now);
    let echoed = graph.delay.process(graph.filter.process(synths));
    let bus = echoed + graph.noise.process(now);
    let spatial = match graph.reverb.as_mut() {
        Some(reverb) => reverb.process(bus),
        None => bus,
    };
    let rain = graph.rain.as_mut().map_or(0.0, |r| r.process(now));
    spatial + rain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Tap;
    use crate::host::RefusingHost;
    use crate::profile::FixedProfile;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProfile {
        calls: Arc<AtomicUsize>,
        profile: AudioProfile,
    }

    impl ProfileStrategy for CountingProfile {
        fn detect(&self) -> AudioProfile {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.profile
        }
    }

    struct SlowBuilder(Duration);

    impl ReverbBuilder for SlowBuilder {
        fn build(&self, spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError> {
            std::thread::sleep(self.0);
            VelvetReverbBuilder.build(spec)
        }
    }

    struct FailingBuilder;

    impl ReverbBuilder for FailingBuilder {
        fn build(&self, _spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError> {
            Err(AudioError::ReverbBuild("out of memory".into()))
        }
    }

    struct CountingBuilder(Arc<AtomicUsize>);

    impl ReverbBuilder for CountingBuilder {
        fn build(&self, spec: &ReverbSpec) -> Result<Vec<Tap>, AudioError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            VelvetReverbBuilder.build(spec)
        }
    }

    fn engine(profile: AudioProfile) -> AudioEngine {
        AudioEngine::new(AudioConfig::lightweight(), FieldRng::new(42))
            .with_profile_strategy(Box::new(FixedProfile(profile)))
    }

    fn light(profile: AudioProfile) -> AudioEngine {
        let mut e = engine(profile);
        e.init_tone_context().unwrap();
        e.init_audio_light().unwrap();
        e
    }

    fn render_seconds(e: &mut AudioEngine, seconds: f32) -> Vec<f32> {
        let n = (seconds * e.config().sample_rate as f32) as usize;
        let mut buf = vec![0.0; n];
        e.render(&mut buf);
        buf
    }

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|s| s * s).sum::<f32>() / buf.len().max(1) as f32).sqrt()
    }

    #[test]
    fn start_before_light_init_is_silent_noop() {
        let mut e = engine(AudioProfile::full());
        e.start_audio();
        assert!(!e.is_playing());
        e.init_tone_context().unwrap();
        e.start_audio();
        assert!(!e.is_playing());
        let out = render_seconds(&mut e, 0.5);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(e.events().is_empty());
    }

    #[test]
    fn light_init_requires_context() {
        let mut e = engine(AudioProfile::full());
        assert!(matches!(
            e.init_audio_light(),
            Err(AudioError::ContextNotStarted)
        ));
        assert_eq!(e.phase(), EnginePhase::Uninitialized);
    }

    #[test]
    fn refused_context_leaves_engine_uninitialized() {
        let mut e = engine(AudioProfile::full()).with_host(Box::new(RefusingHost));
        assert!(matches!(
            e.init_tone_context(),
            Err(AudioError::HostResume(_))
        ));
        assert_eq!(e.phase(), EnginePhase::Uninitialized);
    }

    #[test]
    fn light_init_twice_keeps_the_running_graph() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        render_seconds(&mut e, 1.0);
        let position = e.transport_position().unwrap();
        let events = e.events().len();
        assert!(position > 0.0);
        assert!(events > 0);

        e.init_audio_light().unwrap();
        assert_eq!(e.transport_position(), Some(position));
        assert_eq!(e.events().len(), events);
        assert!(e.is_playing());
    }

    #[test]
    fn playing_engine_makes_sound_and_records_gestures() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        let out = render_seconds(&mut e, 4.0);
        assert!(rms(&out) > 0.0);
        assert!(out.iter().all(|s| s.is_finite()));
        // The drone loop fires at beat 0.
        assert!(matches!(e.events()[0].gesture, Gesture::Drone { .. }));
        assert_eq!(e.events()[0].sample, 0);
        assert!(e.events().iter().any(|ev| ev.gesture.kind() == LoopKind::Pulse));
    }

    #[test]
    fn same_seed_same_session() {
        let run = || {
            let mut e = light(AudioProfile::full());
            e.start_audio();
            render_seconds(&mut e, 3.0);
            e.events().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn first_start_randomizes_bpm_once() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        let bpm = e.mix_levels().unwrap().bpm;
        assert!((60.0..=90.0).contains(&bpm), "bpm {bpm}");
        e.stop_audio();
        assert!(!e.is_playing());
        assert_eq!(e.transport_position(), Some(0.0));
        e.start_audio();
        assert_eq!(e.mix_levels().unwrap().bpm, bpm);
    }

    #[test]
    fn toggle_flips_playback() {
        let mut e = light(AudioProfile::full());
        assert!(e.toggle_audio());
        assert!(!e.toggle_audio());
        // Stopping twice is harmless.
        e.stop_audio();
        assert!(!e.is_playing());
    }

    #[test]
    fn full_init_installs_reverb_and_fades_it_in() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        e.init_audio_full().unwrap();
        assert_eq!(e.phase(), EnginePhase::LightReady);
        assert!(e.wait_fully_ready(Duration::from_secs(10)));
        assert_eq!(e.reverb_status(), &ReverbStatus::Active);
        assert_eq!(e.mix_levels().unwrap().reverb_wet, Some(0.6));
        let out = render_seconds(&mut e, 1.0);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn reverb_timeout_falls_back_to_dry_graph() {
        let mut config = AudioConfig::lightweight();
        config.reverb_timeout = Duration::from_millis(20);
        let mut e = AudioEngine::new(config, FieldRng::new(5))
            .with_profile_strategy(Box::new(FixedProfile(AudioProfile::full())))
            .with_reverb_builder(Arc::new(SlowBuilder(Duration::from_millis(400))));
        e.init_tone_context().unwrap();
        e.init_audio_light().unwrap();
        e.start_audio();
        e.init_audio_full().unwrap();

        assert!(e.wait_fully_ready(Duration::from_secs(5)));
        assert_eq!(
            e.reverb_status(),
            &ReverbStatus::Disabled(DisabledReason::TimedOut)
        );

        let params = EnvironmentParams {
            reverb_wet: 0.9,
            ..EnvironmentParams::default()
        };
        e.update_environment_audio(&params);
        assert_eq!(e.mix_levels().unwrap().reverb_wet, None);
        let out = render_seconds(&mut e, 2.0);
        assert!(rms(&out) > 0.0);

        // Never retried.
        e.init_audio_full().unwrap();
        assert_eq!(
            e.reverb_status(),
            &ReverbStatus::Disabled(DisabledReason::TimedOut)
        );
    }

    #[test]
    fn failed_build_disables_reverb() {
        let mut e = light(AudioProfile::full()).with_reverb_builder(Arc::new(FailingBuilder));
        e.init_audio_full().unwrap();
        assert!(e.wait_fully_ready(Duration::from_secs(5)));
        assert!(matches!(
            e.reverb_status(),
            ReverbStatus::Disabled(DisabledReason::BuildFailed(msg)) if msg.contains("out of memory")
        ));
    }

    #[test]
    fn profile_can_skip_reverb_without_building() {
        let calls = Arc::new(AtomicUsize::new(0));
        let profile = AudioProfile {
            skip_reverb: true,
            ..AudioProfile::conservative()
        };
        let mut e = light(profile).with_reverb_builder(Arc::new(CountingBuilder(calls.clone())));
        e.init_audio_full().unwrap();
        assert!(e.is_fully_ready());
        assert_eq!(
            e.reverb_status(),
            &ReverbStatus::Disabled(DisabledReason::SkippedByProfile)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(e.frequency_data().len(), 32);
        assert_eq!(e.waveform_data().len(), 128);
    }

    #[test]
    fn profile_is_detected_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut e = AudioEngine::new(AudioConfig::lightweight(), FieldRng::new(1))
            .with_profile_strategy(Box::new(CountingProfile {
                calls: calls.clone(),
                profile: AudioProfile::full(),
            }));
        assert_eq!(e.frequency_data().len(), 64);
        e.init_tone_context().unwrap();
        e.init_audio_light().unwrap();
        e.init_audio_full().unwrap();
        let _ = e.profile();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn volume_and_mute_interact() {
        let mut e = engine(AudioProfile::full());
        assert_eq!(e.output_gain_db(), 0.0);
        e.set_volume(50);
        assert_eq!(e.output_gain_db(), -30.0);
        e.set_muted(true);
        assert_eq!(e.output_gain_db(), f32::NEG_INFINITY);
        assert_eq!(e.volume(), 50);
        e.set_muted(false);
        assert_eq!(e.output_gain_db(), -30.0);
        e.set_volume(0);
        assert_eq!(e.output_gain_db(), f32::NEG_INFINITY);
        e.set_volume(250);
        assert_eq!(e.volume(), 100);
    }

    #[test]
    fn muted_output_is_silent() {
        let mut e = light(AudioProfile::full());
        e.set_muted(true);
        e.start_audio();
        let out = render_seconds(&mut e, 1.0);
        // Only the 50 ms fade from full volume can be audible.
        let tail = &out[out.len() / 2..];
        assert!(tail.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn environment_bundle_retargets_the_graph() {
        let mut e = light(AudioProfile::full());
        let params = EnvironmentParams {
            bpm: 112.0,
            filter_frequency: 800.0,
            energy: Energy::Low,
            waveform_type: WaveformType::Triangle,
            noise_level: 0.0,
            ..EnvironmentParams::default()
        };
        e.update_environment_audio(&params);
        let levels = e.mix_levels().unwrap();
        assert_eq!(levels.bpm, 112.0);
        assert_eq!(levels.filter_frequency, 800.0);
        assert_eq!(levels.drone_gain, db_to_gain(-10.0));
        assert_eq!(levels.pulse_gain, db_to_gain(-24.0));
        assert_eq!(levels.waveform, WaveformType::Triangle);
        assert_eq!(levels.rain_gain, None);

        // Same bundle again changes nothing.
        e.update_environment_audio(&params);
        assert_eq!(e.mix_levels().unwrap(), levels);
    }

    #[test]
    fn rain_bed_is_built_lazily_and_follows_noise_level() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        let wet = EnvironmentParams {
            noise_level: 0.3,
            ..EnvironmentParams::default()
        };
        e.update_environment_audio(&wet);
        assert_eq!(e.mix_levels().unwrap().rain_gain, Some(0.3));
        render_seconds(&mut e, 0.5);

        let dry = EnvironmentParams {
            noise_level: 0.0,
            ..EnvironmentParams::default()
        };
        e.update_environment_audio(&dry);
        // The bed stays built and fades out.
        assert_eq!(e.mix_levels().unwrap().rain_gain, Some(0.0));
    }

    #[test]
    fn bundle_before_light_init_is_applied_at_build() {
        let mut e = engine(AudioProfile::full());
        let params = EnvironmentParams {
            filter_frequency: 3000.0,
            ..EnvironmentParams::default()
        };
        e.update_environment_audio(&params);
        assert!(e.mix_levels().is_none());
        e.init_tone_context().unwrap();
        e.init_audio_light().unwrap();
        assert_eq!(e.mix_levels().unwrap().filter_frequency, 3000.0);
    }

    #[test]
    fn analyser_hears_the_output() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        render_seconds(&mut e, 2.0);
        let spectrum = e.frequency_data();
        assert_eq!(spectrum.len(), 64);
        assert!(spectrum.iter().any(|&db| db > MIN_DECIBELS));
        assert_eq!(e.waveform_data().len(), 256);
    }

    // -----------------------------------------------------------------------
    // Ramp timing: each glide lands on its target exactly at its duration.
    // -----------------------------------------------------------------------

    fn render_samples(e: &mut AudioEngine, n: usize) {
        let mut buf = vec![0.0; n];
        e.render(&mut buf);
    }

    fn samples(e: &AudioEngine, seconds: f32) -> usize {
        (seconds * e.config().sample_rate as f32).round() as usize
    }

    /// Render up to one sample short of `seconds`, check `value` has not
    /// arrived, render the last sample and check it has.
    fn assert_lands_at(
        e: &mut AudioEngine,
        seconds: f32,
        what: &str,
        value: impl Fn(&Graph) -> (f32, f32),
    ) {
        let n = samples(e, seconds);
        render_samples(e, n - 1);
        let (v, target) = value(e.graph.as_ref().unwrap());
        assert!(v != target, "{what} arrived early: {v}");
        render_samples(e, 1);
        let (v, target) = value(e.graph.as_ref().unwrap());
        assert_eq!(v, target, "{what} late");
    }

    #[test]
    fn energy_change_glides_both_synths_in_two_seconds() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        e.update_environment_audio(&EnvironmentParams {
            energy: Energy::Low,
            noise_level: 0.0,
            ..EnvironmentParams::default()
        });
        let (drone_db, pulse_db) = energy_levels_db(Energy::Low);
        let n = samples(&e, VOLUME_RAMP_SECONDS);
        render_samples(&mut e, n - 1);
        let g = e.graph.as_ref().unwrap();
        assert!(g.drone.volume.is_ramping());
        assert!(g.pulse.volume.is_ramping());
        render_samples(&mut e, 1);
        let g = e.graph.as_ref().unwrap();
        assert_eq!(g.drone.volume.value(), db_to_gain(drone_db));
        // The pulse is silent most of the time; its glide must not wait
        // for notes.
        assert_eq!(g.pulse.volume.value(), db_to_gain(pulse_db));
    }

    #[test]
    fn tempo_glides_in_four_seconds() {
        let mut e = light(AudioProfile::full());
        e.start_audio();
        e.update_environment_audio(&EnvironmentParams {
            bpm: 112.0,
            noise_level: 0.0,
            ..EnvironmentParams::default()
        });
        assert_lands_at(&mut e, BPM_RAMP_SECONDS, "bpm", |g| {
            (g.transport.bpm.value(), 112.0)
        });
    }

    #[test]
    fn filter_glides_in_three_seconds() {
        // Not playing, so no drone gesture retunes the filter mid-glide.
        let mut e = light(AudioProfile::full());
        let target = e.config().filter_frequency * 0.4;
        e.update_environment_audio(&EnvironmentParams {
            filter_frequency: f64::from(target),
            noise_level: 0.0,
            ..EnvironmentParams::default()
        });
        assert_lands_at(&mut e, FILTER_RAMP_SECONDS, "filter", |g| {
            (g.filter.frequency.value(), target)
        });
    }

    #[test]
    fn installed_reverb_fades_in_over_configured_time() {
        let mut e = light(AudioProfile::full());
        e.init_audio_full().unwrap();
        assert!(e.wait_fully_ready(Duration::from_secs(10)));
        assert_eq!(e.reverb_status(), &ReverbStatus::Active);
        let fade = e.config().reverb_fade_in.as_secs_f32();
        let wet = e.config().reverb_wet;
        assert_lands_at(&mut e, fade, "reverb wet", |g| {
            (g.reverb.as_ref().unwrap().wet.value(), wet)
        });
    }
}

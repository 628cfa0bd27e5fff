// nictia_audio: the generative audio engine.
//
// A self-playing ambient piece: a drone pad, a filtered square-wave pulse
// and pink-noise bursts, each driven by its own probabilistic loop on a
// shared transport, through a lowpass, a dotted-eighth echo and (once it
// has been generated in the background) a long reverb. Environment bundles
// from `nictia_env` steer tempo, filter, reverb, energy and a rain bed.
//
// Module overview:
// - `engine.rs`:    AudioEngine, staged initialization, render loop,
//                   parameter application, volume, analysis feed.
// - `reverb.rs`:    ReverbBuilder trait and the background build with its
//                   timeout; ReverbStatus.
// - `composer.rs`:  Gesture generation for the three loops;
//                   CompositionEvent.
// - `transport.rs`: Transport (beat clock with rampable tempo), Loop,
//                   NoteValue.
// - `synth.rs`:     PolySynth, MonoSynth, NoiseSynth.
// - `dsp.rs`:       Ramp, Oscillator, Adsr, PinkNoise, Lowpass,
//                   FeedbackDelay, Reverb and the impulse generator.
// - `analyser.rs`:  FFT magnitude and waveform snapshots of the output.
// - `profile.rs`:   AudioProfile device tiers and ProfileStrategy.
// - `host.rs`:      AudioHost trait (context start) and OfflineHost.
// - `midi.rs`:      SMF export of recorded composition events.
// - `config.rs`:    AudioConfig.
// - `error.rs`:     AudioError.
//
// See also: `nictia_env` for `EnvironmentParams`, `nictia_field` which
// reads `frequency_data()` every frame, `nictia_installation::session`
// which drives the staged startup.
//
// **Critical constraint: determinism.** All randomness comes from the
// `FieldRng` handed to `AudioEngine::new`. The only nondeterministic input
// is whether the background reverb beats its timeout, which decides where
// in the render timeline the reverb appears, never which notes play.

pub mod analyser;
pub mod composer;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod host;
pub mod midi;
pub mod profile;
pub mod reverb;
pub mod synth;
pub mod transport;

pub use analyser::{Analyser, MIN_DECIBELS};
pub use composer::{Composer, CompositionEvent, Gesture};
pub use config::AudioConfig;
pub use engine::{AudioEngine, EnginePhase, MixLevels, energy_levels_db, volume_to_db};
pub use error::AudioError;
pub use host::{AudioHost, OfflineHost, RefusingHost};
pub use midi::{events_to_smf, write_midi};
pub use profile::{
    AudioProfile, FixedProfile, HeuristicProfile, ProbedProfile, ProfileStrategy,
    process_profile,
};
pub use reverb::{DisabledReason, ReverbBuilder, ReverbSpec, ReverbStatus, VelvetReverbBuilder};
pub use transport::{LoopKind, NoteValue};

// nictia_field: the audio-reactive particle field.
//
// A shell of a few thousand particles that wobble around fixed rest
// positions, breathe with the audio, and (on capable hosts) push and pull
// on each other with a Lenia-style kernel whose shape comes from the
// environment: sunny summer days spread the swarm out, stormy nights
// scatter it, snow clusters it. Around the cloud sit an eye, orbiting
// fragments and three rings, whose poses are derived here for an external
// renderer.
//
// Module overview:
// - `sim.rs`:       ParticleField::step, the per-frame update; FrameStats;
//                   audio_intensity.
// - `spatial.rs`:   SpatialHashGrid, the neighbour broad phase.
// - `particles.rs`: ParticleSet, the seeded rest-shell layout.
// - `tier.rs`:      PerformanceLevel detection and the per-tier table.
// - `scene.rs`:     Cloud rotation, EyeState, fragment orbits, rings,
//                   PostProcessPlan, SceneFrame.
// - `config.rs`:    FieldConfig.
//
// See also: `nictia_env` for `EnvironmentParams` and `DeviceSignals`,
// `nictia_audio::AudioEngine::frequency_data` for the spectrum fed to
// `step`.
//
// **Critical constraint: determinism.** The layout is generated from a fixed
// LCG seed and the step reads only the previous frame, so the same inputs
// give bit-identical particle arrays on any thread count.

pub mod config;
pub mod particles;
pub mod scene;
pub mod sim;
pub mod spatial;
pub mod tier;

pub use config::FieldConfig;
pub use particles::{ParticleSet, Vec3};
pub use scene::{
    BloomPass, EyeState, FragmentOrbit, FragmentPose, GlitchPass, PostProcessPlan, RingPose,
    SceneFrame, VignettePass, cloud_rotation, fragment_orbits, ring_poses,
};
pub use sim::{FrameStats, ParticleField, audio_intensity};
pub use spatial::SpatialHashGrid;
pub use tier::{PerformanceConfig, PerformanceLevel, PostProcessing};

// Scene derivation for everything that is not a particle.
//
// The renderer is external; this module only computes, per frame, the
// numbers it needs: cloud rotation, the central eye, the orbiting
// fragments, the three floating rings, the background colour and which
// post-processing passes to run with which settings. Every function is a
// pure function of (elapsed time, params, spectrum) so a headless run can
// record or assert on the scene without drawing it.
//
// Each element reads the audio spectrum with its own base and divisor:
// eye 0.2 / 80, fragments 0.3 / 60 (the particles use 0.3 / 50).

use std::f32::consts::PI;

use nictia_env::EnvironmentParams;
use serde::{Deserialize, Serialize};

use crate::particles::Vec3;
use crate::sim::audio_intensity;
use crate::tier::{PerformanceConfig, PostProcessing};

const EYE_BASE: f32 = 0.2;
const EYE_DIVISOR: f32 = 80.0;
const FRAGMENT_BASE: f32 = 0.3;
const FRAGMENT_DIVISOR: f32 = 60.0;

pub const RING_RADII: [f32; 3] = [1.8, 2.2, 2.6];

// ---------------------------------------------------------------------------
// Point cloud and eye
// ---------------------------------------------------------------------------

/// Rotation of the whole point cloud, in radians about x and y.
pub fn cloud_rotation(time: f32, speed_mod: f32) -> [f32; 2] {
    [(time * 0.1 * speed_mod).sin() * 0.1, time * 0.08 * speed_mod]
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyeState {
    pub iris_scale: f32,
    pub glow_opacity: f32,
    /// Sway about x and y.
    pub rotation: [f32; 2],
    /// Uniform scale of the whole eye group.
    pub pulse: f32,
}

impl EyeState {
    pub fn derive(time: f32, params: &EnvironmentParams, spectrum: Option<&[f32]>) -> Self {
        let s = params.particle_speed as f32;
        let intensity = audio_intensity(spectrum, EYE_BASE, EYE_DIVISOR);
        Self {
            iris_scale: 0.25 + intensity * 0.4,
            glow_opacity: 0.3 + intensity * 0.4 + params.bloom_intensity as f32 * 0.2,
            rotation: [(time * 0.4 * s).sin() * 0.15, (time * 0.3 * s).cos() * 0.15],
            pulse: 1.0 + (time * 1.5 * s).sin() * 0.03 * (1.0 + intensity),
        }
    }
}

// ---------------------------------------------------------------------------
// Orbiting fragments
// ---------------------------------------------------------------------------

const FRAG_MUL: u32 = 9301;
const FRAG_INC: u32 = 49297;
const FRAG_MOD: u32 = 233_280;

/// Fixed orbit of one fragment. Derived from its index alone, so the ring of
/// fragments looks the same every session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentOrbit {
    pub index: usize,
    pub angle: f32,
    pub radius: f32,
    pub speed: f32,
    pub y_offset: f32,
    pub spin: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentPose {
    pub position: Vec3,
    pub rotation: [f32; 2],
    pub scale: f32,
}

impl FragmentOrbit {
    pub fn new(index: usize, total: usize) -> Self {
        let mut seed = ((index as u32 + 100) * FRAG_MUL + FRAG_INC) % FRAG_MOD;
        let mut draws = [0.0f32; 4];
        for (k, draw) in draws.iter_mut().enumerate() {
            if k > 0 {
                seed = (seed * FRAG_MUL + FRAG_INC) % FRAG_MOD;
            }
            *draw = seed as f32 / FRAG_MOD as f32;
        }
        let total = total.max(1) as f32;
        Self {
            index,
            angle: index as f32 / total * PI * 2.0 + PI / total,
            radius: 2.8 + draws[0] * 1.2,
            speed: 0.05 + draws[1] * 0.1,
            y_offset: (draws[2] - 0.5) * 1.8,
            spin: draws[3] * 2.0,
        }
    }

    pub fn pose(&self, time: f32, speed_mod: f32, intensity: f32) -> FragmentPose {
        let speed = self.speed * (1.0 + intensity * 0.5) * speed_mod;
        let angle = self.angle + time * speed;
        let bob = (time * 0.8 * speed_mod + self.index as f32).sin() * 0.4 * intensity;
        FragmentPose {
            position: [
                angle.cos() * self.radius,
                self.y_offset + bob,
                angle.sin() * self.radius,
            ],
            rotation: [
                time * self.spin * speed_mod,
                time * self.spin * 0.7 * speed_mod,
            ],
            scale: 0.06 + intensity * 0.03,
        }
    }
}

pub fn fragment_orbits(total: usize) -> Vec<FragmentOrbit> {
    (0..total).map(|i| FragmentOrbit::new(i, total)).collect()
}

// ---------------------------------------------------------------------------
// Rings
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RingPose {
    pub radius: f32,
    pub opacity: f32,
    /// Static tilt plus animated rotation, per axis.
    pub rotation: Vec3,
}

pub fn ring_poses(time: f32, speed_mod: f32) -> [RingPose; 3] {
    std::array::from_fn(|i| {
        let k = (i + 1) as f32;
        let tilt = [PI * 0.3 * i as f32, PI * 0.2 * i as f32, 0.0];
        RingPose {
            radius: RING_RADII[i],
            opacity: 0.3 - i as f32 * 0.08,
            rotation: [
                tilt[0] + time * 0.1 * k * 0.3 * speed_mod,
                tilt[1] + time * 0.15 * k * 0.2 * speed_mod,
                tilt[2] + time * 0.08 * k * 0.25 * speed_mod,
            ],
        }
    })
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloomPass {
    pub intensity: f32,
    pub luminance_threshold: f32,
    pub luminance_smoothing: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VignettePass {
    pub offset: f32,
    pub darkness: f32,
}

/// Sporadic glitch. Each pair is a (min, max) range the renderer samples
/// from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlitchPass {
    pub delay: [f32; 2],
    pub duration: [f32; 2],
    pub strength: [f32; 2],
    pub ratio: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostProcessPlan {
    pub bloom: BloomPass,
    pub vignette: Option<VignettePass>,
    /// Film-grain opacity.
    pub noise: Option<f32>,
    pub glitch: Option<GlitchPass>,
}

impl PostProcessPlan {
    pub fn select(level: PostProcessing, params: &EnvironmentParams) -> Self {
        let bloom = params.bloom_intensity as f32;
        if level == PostProcessing::Minimal {
            return Self {
                bloom: BloomPass {
                    intensity: bloom * 0.7,
                    luminance_threshold: 0.3,
                    luminance_smoothing: 0.9,
                },
                vignette: None,
                noise: None,
                glitch: None,
            };
        }

        let mut plan = Self {
            bloom: BloomPass {
                intensity: bloom,
                luminance_threshold: 0.2,
                luminance_smoothing: 0.9,
            },
            vignette: Some(VignettePass {
                offset: 0.3,
                darkness: 0.6,
            }),
            noise: None,
            glitch: None,
        };
        if level == PostProcessing::Full {
            let noise = params.noise_intensity as f32;
            let glitch = params.glitch_intensity as f32;
            plan.noise = (noise > 0.0).then_some(noise);
            plan.glitch = (glitch > 0.0).then_some(GlitchPass {
                delay: [1.5, 3.5],
                duration: [0.1, 0.3],
                strength: [glitch * 0.3, glitch],
                ratio: 0.85,
            });
        }
        plan
    }

    pub fn pass_count(&self) -> usize {
        1 + usize::from(self.vignette.is_some())
            + usize::from(self.noise.is_some())
            + usize::from(self.glitch.is_some())
    }
}

// ---------------------------------------------------------------------------
// Whole frame
// ---------------------------------------------------------------------------

/// Everything the renderer needs besides the particle buffers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneFrame {
    pub background: [f32; 3],
    pub cloud_rotation: [f32; 2],
    pub eye: EyeState,
    pub fragments: Vec<FragmentPose>,
    pub rings: [RingPose; 3],
    pub post: PostProcessPlan,
}

impl SceneFrame {
    pub fn derive(
        time: f32,
        params: &EnvironmentParams,
        spectrum: Option<&[f32]>,
        performance: &PerformanceConfig,
    ) -> Self {
        let s = params.particle_speed as f32;
        let fragment_intensity = audio_intensity(spectrum, FRAGMENT_BASE, FRAGMENT_DIVISOR);
        Self {
            background: params.background_color.to_unit(),
            cloud_rotation: cloud_rotation(time, s),
            eye: EyeState::derive(time, params, spectrum),
            fragments: fragment_orbits(performance.fragment_count)
                .iter()
                .map(|orbit| orbit.pose(time, s, fragment_intensity))
                .collect(),
            rings: ring_poses(time, s),
            post: PostProcessPlan::select(performance.post_processing, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::PerformanceLevel;

    #[test]
    fn first_fragment_orbit_matches_seed_chain() {
        let orbit = FragmentOrbit::new(0, 4);
        let s1 = (100 * 9301 + 49297) % 233_280;
        let s2 = (s1 * 9301 + 49297) % 233_280;
        assert_eq!(orbit.radius, 2.8 + (s1 as f32 / 233_280.0) * 1.2);
        assert_eq!(orbit.speed, 0.05 + (s2 as f32 / 233_280.0) * 0.1);
        assert!((orbit.angle - PI / 4.0).abs() < 1e-6);
    }

    #[test]
    fn orbits_stay_in_their_band() {
        for orbit in fragment_orbits(12) {
            assert!((2.8..=4.0).contains(&orbit.radius));
            assert!((0.05..=0.15).contains(&orbit.speed));
            assert!((-0.9..=0.9).contains(&orbit.y_offset));
            assert!((0.0..=2.0).contains(&orbit.spin));
        }
        assert_eq!(fragment_orbits(12), fragment_orbits(12));
    }

    #[test]
    fn fragment_pose_keeps_orbit_radius() {
        let orbit = FragmentOrbit::new(3, 8);
        let pose = orbit.pose(12.5, 1.3, 0.6);
        let planar = (pose.position[0].powi(2) + pose.position[2].powi(2)).sqrt();
        assert!((planar - orbit.radius).abs() < 1e-4);
        assert!((pose.scale - (0.06 + 0.6 * 0.03)).abs() < 1e-6);
    }

    #[test]
    fn eye_idles_without_spectrum() {
        let params = EnvironmentParams::default();
        let eye = EyeState::derive(0.0, &params, None);
        assert!((eye.iris_scale - (0.25 + 0.2 * 0.4)).abs() < 1e-6);
        assert!((eye.glow_opacity - (0.3 + 0.08 + 0.5 * 0.2)).abs() < 1e-6);
        assert_eq!(eye.pulse, 1.0);
        assert_eq!(eye.rotation, [0.0, 0.15]);

        let loud = [-80.0f32; 16];
        assert!(EyeState::derive(0.0, &params, Some(&loud)).iris_scale > eye.iris_scale);
    }

    #[test]
    fn rings_start_at_their_tilt() {
        let rings = ring_poses(0.0, 1.0);
        assert_eq!(rings[0].rotation, [0.0, 0.0, 0.0]);
        assert!((rings[2].rotation[0] - PI * 0.6).abs() < 1e-6);
        assert!((rings[2].opacity - 0.14).abs() < 1e-6);
        assert_eq!(rings[1].radius, 2.2);
    }

    #[test]
    fn post_processing_by_level() {
        let params = EnvironmentParams {
            bloom_intensity: 0.8,
            noise_intensity: 0.15,
            glitch_intensity: 0.4,
            ..EnvironmentParams::default()
        };

        let minimal = PostProcessPlan::select(PostProcessing::Minimal, &params);
        assert_eq!(minimal.pass_count(), 1);
        assert!((minimal.bloom.intensity - 0.56).abs() < 1e-6);
        assert_eq!(minimal.bloom.luminance_threshold, 0.3);

        let medium = PostProcessPlan::select(PostProcessing::Medium, &params);
        assert_eq!(medium.pass_count(), 2);
        assert!(medium.noise.is_none() && medium.glitch.is_none());

        let full = PostProcessPlan::select(PostProcessing::Full, &params);
        assert_eq!(full.pass_count(), 4);
        let glitch = full.glitch.unwrap();
        assert!((glitch.strength[0] - 0.12).abs() < 1e-6);
        assert_eq!(glitch.strength[1], 0.4);

        let calm = PostProcessPlan::select(PostProcessing::Full, &EnvironmentParams::default());
        assert_eq!(calm.pass_count(), 2);
    }

    #[test]
    fn scene_frame_sizes_follow_tier() {
        let params = EnvironmentParams::default();
        let high = SceneFrame::derive(3.0, &params, None, &PerformanceLevel::High.config());
        let low = SceneFrame::derive(3.0, &params, None, &PerformanceLevel::Low.config());
        assert_eq!(high.fragments.len(), 12);
        assert_eq!(low.fragments.len(), 4);
        assert_eq!(high.background, params.background_color.to_unit());
        assert_eq!(low.post.pass_count(), 1);
    }
}

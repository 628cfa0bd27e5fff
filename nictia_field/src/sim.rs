// Per-frame particle update.
//
// Every frame each particle is placed at
//
//   rest * breathe + organic(rest, t) + velocity
//
// where `organic` is a phase-offset sine/cosine wobble and `breathe` a slow
// radial pulse, both scaled by the audio intensity. Velocity carries the
// Lenia-style interaction: on rebuild frames (every
// `grid_rebuild_interval` frames, Lenia tiers only) the spatial grid is
// refilled from the current positions and every `lenia_stride`-th particle
// looks at its neighbours. Each neighbour inside `neighbor_radius` pushes or
// pulls depending on whether its normalised distance is below or above
// `activity_threshold`; the summed push (weighted by separation) and pull
// (weighted by cohesion) are averaged over the neighbour count and blended
// into the velocity. Velocity is damped every frame whether or not it was
// updated.
//
// Positions for frame N are computed only from the positions of frame N-1,
// in parallel via rayon, into a scratch buffer that is swapped in at the
// end. No particle ever sees a neighbour's value from the same frame, so the
// result does not depend on thread count or scheduling.
//
// See also: `spatial.rs` for the neighbour broad phase, `particles.rs` for
// the layout, `scene.rs` for the non-particle scene elements.
//
// **Critical constraint: determinism.** Given the same configuration,
// frame times, spectra, and params, the particle arrays are bit-identical
// across runs and thread counts.

use nictia_env::EnvironmentParams;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::FieldConfig;
use crate::particles::{ParticleSet, Vec3};
use crate::spatial::SpatialHashGrid;
use crate::tier::PerformanceConfig;

/// Audio intensity from a spectrum snapshot: `base + mean(|v|) / divisor`.
/// `None` (audio not playing) and empty spectra give `base`.
pub fn audio_intensity(spectrum: Option<&[f32]>, base: f32, divisor: f32) -> f32 {
    match spectrum {
        Some(bins) if !bins.is_empty() => {
            let sum: f32 = bins.iter().map(|v| v.abs()).sum();
            base + sum / bins.len() as f32 / divisor
        }
        _ => base,
    }
}

/// What happened during one `step`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame: u64,
    pub elapsed: f64,
    pub audio_intensity: f32,
    pub grid_rebuilt: bool,
    /// Particles whose velocity received an interaction update.
    pub lenia_updates: usize,
}

/// Interaction parameters for one rebuild frame, narrowed to f32.
#[derive(Clone, Copy, Debug)]
struct Interaction {
    radius: f32,
    attraction: f32,
    repulsion: f32,
    cohesion: f32,
    separation: f32,
    threshold: f32,
    strength: f32,
    min_distance: f32,
    retain: f32,
    stride: usize,
}

#[derive(Clone, Copy, Debug)]
struct Motion {
    time: f32,
    noise_scale: f32,
    speed: f32,
    breathe: f32,
    damping: f32,
}

pub struct ParticleField {
    config: FieldConfig,
    performance: PerformanceConfig,
    particles: ParticleSet,
    scratch: Vec<Vec3>,
    grid: SpatialHashGrid,
    frame: u64,
    elapsed: f64,
}

impl ParticleField {
    pub fn new(config: FieldConfig, performance: PerformanceConfig) -> Self {
        let particles = ParticleSet::generate(performance.particle_count);
        log::info!(
            "particle field: {} particles, lenia {}, stride {}, rebuild every {} frames",
            particles.len(),
            if performance.enable_lenia { "on" } else { "off" },
            performance.lenia_stride,
            performance.grid_rebuild_interval,
        );
        Self {
            scratch: particles.positions.clone(),
            grid: SpatialHashGrid::new(config.cell_size),
            config,
            performance,
            particles,
            frame: 0,
            elapsed: 0.0,
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn performance(&self) -> &PerformanceConfig {
        &self.performance
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.particles.positions
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.particles.colors
    }

    pub fn grid(&self) -> &SpatialHashGrid {
        &self.grid
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Whether `frame` is one on which the grid is rebuilt and interaction
    /// forces are computed.
    pub fn is_rebuild_frame(&self, frame: u64) -> bool {
        self.performance.enable_lenia
            && frame % self.performance.grid_rebuild_interval.max(1) == 0
    }

    /// Advance the field by `dt` seconds. `spectrum` is the audio engine's
    /// frequency snapshot, or `None` while audio is not playing.
    pub fn step(
        &mut self,
        dt: f64,
        spectrum: Option<&[f32]>,
        params: &EnvironmentParams,
    ) -> FrameStats {
        self.elapsed += dt.max(0.0);
        self.frame += 1;

        let intensity = audio_intensity(
            spectrum,
            self.config.idle_intensity,
            self.config.intensity_divisor,
        );
        let speed_mod = params.particle_speed as f32;
        let time = self.elapsed as f32;
        let motion = Motion {
            time,
            noise_scale: 0.2 + intensity * 0.8,
            speed: (0.3 + intensity * 0.5) * speed_mod,
            breathe: 1.0 + (time * 0.5 * speed_mod).sin() * self.config.breathe_depth * intensity,
            damping: self.config.velocity_damping,
        };

        let rebuild = self.is_rebuild_frame(self.frame);
        if rebuild {
            self.grid.clear();
            for (i, p) in self.particles.positions.iter().enumerate() {
                self.grid.insert(i as u32, p[0], p[1], p[2]);
            }
        }
        let interaction = rebuild.then(|| Interaction {
            radius: params.neighbor_radius as f32,
            attraction: params.attraction_force as f32,
            repulsion: params.repulsion_force as f32,
            cohesion: params.cohesion_strength as f32,
            separation: params.separation_strength as f32,
            threshold: params.activity_threshold as f32,
            strength: self.config.interaction_scale
                * (0.5 + params.solar_intensity as f32 * 0.5),
            min_distance: self.config.min_neighbor_distance,
            retain: self.config.velocity_retain,
            stride: self.performance.lenia_stride.max(1),
        });

        let previous = &self.particles.positions;
        let rest = &self.particles.rest;
        let grid = &self.grid;
        let lenia_updates: usize = self
            .scratch
            .par_iter_mut()
            .zip(self.particles.velocities.par_iter_mut())
            .enumerate()
            .map(|(i, (out, velocity))| {
                let mut updated = false;
                if let Some(ix) = interaction.as_ref().filter(|ix| i % ix.stride == 0) {
                    if let Some(force) = lenia_force(i, previous, grid, ix) {
                        for axis in 0..3 {
                            velocity[axis] = velocity[axis] * ix.retain + force[axis] * ix.strength;
                        }
                        updated = true;
                    }
                }
                *out = place(rest[i], *velocity, &motion);
                for v in velocity.iter_mut() {
                    *v *= motion.damping;
                }
                usize::from(updated)
            })
            .sum();

        std::mem::swap(&mut self.particles.positions, &mut self.scratch);

        FrameStats {
            frame: self.frame,
            elapsed: self.elapsed,
            audio_intensity: intensity,
            grid_rebuilt: rebuild,
            lenia_updates,
        }
    }
}

fn place(rest: Vec3, velocity: Vec3, m: &Motion) -> Vec3 {
    let [ox, oy, oz] = rest;
    let t = m.time * m.speed;
    let nx = (t + ox * 0.8 + oy * 0.3).sin() * m.noise_scale;
    let ny = (t * 0.8 + oy * 0.8 + oz * 0.3).cos() * m.noise_scale;
    let nz = (t * 0.6 + oz * 0.8 + ox * 0.3).sin() * m.noise_scale;
    [
        ox * m.breathe + nx + velocity[0],
        oy * m.breathe + ny + velocity[1],
        oz * m.breathe + nz + velocity[2],
    ]
}

/// Averaged interaction force on particle `i`, or `None` when it has no
/// neighbour in range.
fn lenia_force(
    i: usize,
    positions: &[Vec3],
    grid: &SpatialHashGrid,
    ix: &Interaction,
) -> Option<Vec3> {
    let [px, py, pz] = positions[i];
    let mut cohesion = [0.0f32; 3];
    let mut separation = [0.0f32; 3];
    let mut count = 0u32;

    grid.for_each_candidate(px, py, pz, ix.radius, |j| {
        let j = j as usize;
        if j == i {
            return;
        }
        let d = [
            positions[j][0] - px,
            positions[j][1] - py,
            positions[j][2] - pz,
        ];
        let dist = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        if dist >= ix.radius || dist <= ix.min_distance {
            return;
        }
        count += 1;
        let normalized = dist / ix.radius;
        if normalized < ix.threshold {
            let push = (ix.threshold - normalized) * ix.repulsion;
            for axis in 0..3 {
                separation[axis] -= d[axis] / dist * push;
            }
        } else {
            let pull = (normalized - ix.threshold) * ix.attraction;
            for axis in 0..3 {
                cohesion[axis] += d[axis] / dist * pull;
            }
        }
    });

    if count == 0 {
        return None;
    }
    let n = count as f32;
    Some([
        (cohesion[0] * ix.cohesion + separation[0] * ix.separation) / n,
        (cohesion[1] * ix.cohesion + separation[1] * ix.separation) / n,
        (cohesion[2] * ix.cohesion + separation[2] * ix.separation) / n,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{PerformanceLevel, PostProcessing};

    fn small(enable_lenia: bool, interval: u64) -> PerformanceConfig {
        PerformanceConfig {
            particle_count: 400,
            enable_lenia,
            lenia_stride: 2,
            grid_rebuild_interval: interval,
            post_processing: PostProcessing::Minimal,
            fragment_count: 4,
        }
    }

    fn run(field: &mut ParticleField, frames: usize, spectrum: Option<&[f32]>) -> Vec<FrameStats> {
        let params = EnvironmentParams::default();
        (0..frames)
            .map(|_| field.step(1.0 / 60.0, spectrum, &params))
            .collect()
    }

    #[test]
    fn intensity_formula() {
        assert_eq!(audio_intensity(None, 0.3, 50.0), 0.3);
        assert_eq!(audio_intensity(Some(&[]), 0.3, 50.0), 0.3);
        let bins = [-50.0, 50.0, -100.0, 100.0];
        assert!((audio_intensity(Some(&bins), 0.3, 50.0) - 1.8).abs() < 1e-6);
    }

    #[test]
    fn rebuild_cadence_follows_interval() {
        let mut field = ParticleField::new(FieldConfig::default(), small(true, 3));
        let stats = run(&mut field, 9, None);
        let rebuilt: Vec<u64> = stats.iter().filter(|s| s.grid_rebuilt).map(|s| s.frame).collect();
        assert_eq!(rebuilt, vec![3, 6, 9]);
        assert!(stats.iter().filter(|s| !s.grid_rebuilt).all(|s| s.lenia_updates == 0));
    }

    #[test]
    fn without_lenia_velocity_stays_zero() {
        let mut field = ParticleField::new(FieldConfig::default(), small(false, 2));
        let stats = run(&mut field, 10, None);
        assert!(stats.iter().all(|s| !s.grid_rebuilt && s.lenia_updates == 0));
        assert!(field.grid().is_empty());
        assert!(field.particles().velocities.iter().all(|v| *v == [0.0; 3]));
    }

    #[test]
    fn only_stride_members_get_updates() {
        let mut field = ParticleField::new(FieldConfig::default(), small(true, 2));
        run(&mut field, 2, None);
        let v = &field.particles().velocities;
        for (i, vel) in v.iter().enumerate() {
            if i % 2 == 1 {
                assert_eq!(*vel, [0.0; 3], "particle {i} is off-stride");
            }
        }
        assert!(v.iter().step_by(2).any(|vel| *vel != [0.0; 3]));
    }

    #[test]
    fn velocity_decays_between_rebuilds() {
        let mut field = ParticleField::new(FieldConfig::default(), small(true, 4));
        run(&mut field, 4, None);
        let after_update: f32 = field.particles().velocities.iter().map(|v| v[0].abs()).sum();
        assert!(after_update > 0.0);
        run(&mut field, 1, None);
        let decayed: f32 = field.particles().velocities.iter().map(|v| v[0].abs()).sum();
        assert!((decayed - after_update * 0.95).abs() < after_update * 1e-4);
    }

    #[test]
    fn positions_follow_placement_formula_without_interaction() {
        let mut field = ParticleField::new(FieldConfig::default(), small(false, 2));
        let params = EnvironmentParams {
            particle_speed: 1.3,
            ..EnvironmentParams::default()
        };
        field.step(0.5, None, &params);
        let m = Motion {
            time: 0.5,
            noise_scale: 0.2 + 0.3 * 0.8,
            speed: (0.3 + 0.3 * 0.5) * 1.3,
            breathe: 1.0 + (0.5f32 * 0.5 * 1.3).sin() * 0.15 * 0.3,
            damping: 0.95,
        };
        let rest = field.particles().rest[7];
        assert_eq!(field.positions()[7], place(rest, [0.0; 3], &m));
    }

    #[test]
    fn positions_stay_bounded() {
        let mut field = ParticleField::new(FieldConfig::default(), small(true, 2));
        let loud = vec![-20.0f32; 64];
        run(&mut field, 240, Some(&loud));
        for p in field.positions() {
            let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!(r.is_finite() && r < 12.0, "escaped to {r}");
        }
    }

    #[test]
    fn step_is_deterministic_across_thread_pools() {
        let perf = PerformanceLevel::Medium.config();
        let spectrum = vec![-40.0f32; 64];
        let simulate = |threads: usize| {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            pool.install(|| {
                let mut field = ParticleField::new(FieldConfig::default(), perf);
                run(&mut field, 30, Some(&spectrum));
                field.positions().to_vec()
            })
        };
        assert_eq!(simulate(1), simulate(4));
    }

    #[test]
    fn isolated_pair_repels_inside_threshold() {
        let positions = vec![[0.0, 0.0, 0.0], [0.2, 0.0, 0.0]];
        let mut grid = SpatialHashGrid::new(0.6);
        for (i, p) in positions.iter().enumerate() {
            grid.insert(i as u32, p[0], p[1], p[2]);
        }
        let ix = Interaction {
            radius: 1.0,
            attraction: 0.5,
            repulsion: 0.5,
            cohesion: 0.5,
            separation: 0.5,
            threshold: 0.5,
            strength: 0.06,
            min_distance: 0.01,
            retain: 0.85,
            stride: 1,
        };
        let force = lenia_force(0, &positions, &grid, &ix).unwrap();
        // (0.5 - 0.2) * 0.5 pushed away along -x, weighted by separation.
        assert!((force[0] + 0.075).abs() < 1e-6);
        assert_eq!(force[1], 0.0);

        let far = vec![[0.0, 0.0, 0.0], [0.8, 0.0, 0.0]];
        grid.clear();
        for (i, p) in far.iter().enumerate() {
            grid.insert(i as u32, p[0], p[1], p[2]);
        }
        let pull = lenia_force(0, &far, &grid, &ix).unwrap();
        assert!(pull[0] > 0.0);

        let coincident = vec![[0.0, 0.0, 0.0], [0.001, 0.0, 0.0]];
        grid.clear();
        for (i, p) in coincident.iter().enumerate() {
            grid.insert(i as u32, p[0], p[1], p[2]);
        }
        assert!(lenia_force(0, &coincident, &grid, &ix).is_none());
    }
}

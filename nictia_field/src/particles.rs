// The particle set.
//
// Generated once per session from `Lcg31(12345)`: each particle draws three
// values in order (azimuth, polar cosine, radius) and sits on a shell
// between radius 1.5 and 4.0. The rest position never changes afterwards;
// the current position and velocity are rewritten every frame by `sim.rs`.
// Colours shade from blue-white on the inner shell outward.
//
// Storage is parallel arrays indexed by particle id. Particles are never
// added or removed.

use std::f64::consts::PI;

use nictia_prng::Lcg31;
use serde::{Deserialize, Serialize};

pub type Vec3 = [f32; 3];

pub const MIN_RADIUS: f64 = 1.5;
pub const RADIUS_SPAN: f64 = 2.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSet {
    pub positions: Vec<Vec3>,
    pub rest: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub colors: Vec<Vec3>,
}

impl ParticleSet {
    /// The canonical layout for `count` particles.
    pub fn generate(count: usize) -> Self {
        Self::generate_with(count, &mut Lcg31::new(Lcg31::LAYOUT_SEED))
    }

    pub fn generate_with(count: usize, lcg: &mut Lcg31) -> Self {
        let mut rest = Vec::with_capacity(count);
        let mut colors = Vec::with_capacity(count);
        for _ in 0..count {
            let theta = lcg.next_unit() * PI * 2.0;
            let phi = (2.0 * lcg.next_unit() - 1.0).acos();
            let radius = MIN_RADIUS + lcg.next_unit() * RADIUS_SPAN;

            rest.push([
                (radius * phi.sin() * theta.cos()) as f32,
                (radius * phi.sin() * theta.sin()) as f32,
                (radius * phi.cos()) as f32,
            ]);

            let t = (radius / 4.0) as f32;
            colors.push([0.2 + t * 0.3, 0.5 + t * 0.3, 1.0]);
        }
        Self {
            positions: rest.clone(),
            velocities: vec![[0.0; 3]; count],
            rest,
            colors,
        }
    }

    pub fn len(&self) -> usize {
        self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }
}

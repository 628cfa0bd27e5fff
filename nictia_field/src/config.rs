// Field tuning constants, loadable from the `field` section of the
// installation's JSON config. Every field has a default, so a partial file
// (or none) works. `performance` pins a tier instead of detecting one.

use serde::{Deserialize, Serialize};

use crate::tier::PerformanceLevel;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Edge length of a spatial hash cell.
    pub cell_size: f32,
    /// Audio intensity used when no spectrum is supplied.
    pub idle_intensity: f32,
    /// Mean absolute spectrum value is divided by this before adding to the
    /// idle intensity.
    pub intensity_divisor: f32,
    /// Interaction strength at zero solar intensity is half of this; at full
    /// sun it is all of it.
    pub interaction_scale: f32,
    /// Share of the old velocity kept on an interaction update.
    pub velocity_retain: f32,
    /// Per-frame velocity multiplier.
    pub velocity_damping: f32,
    /// Neighbours closer than this are ignored.
    pub min_neighbor_distance: f32,
    pub breathe_depth: f32,
    pub performance: Option<PerformanceLevel>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.6,
            idle_intensity: 0.3,
            intensity_divisor: 50.0,
            interaction_scale: 0.06,
            velocity_retain: 0.85,
            velocity_damping: 0.95,
            min_neighbor_distance: 0.01,
            breathe_depth: 0.15,
            performance: None,
        }
    }
}

impl FieldConfig {
    /// Reject values the step cannot run with. Returns the first problem
    /// found.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("cell_size", self.cell_size),
            ("intensity_divisor", self.intensity_divisor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("field.{name} must be positive, got {value}"));
            }
        }
        for (name, value) in [
            ("velocity_retain", self.velocity_retain),
            ("velocity_damping", self.velocity_damping),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("field.{name} must be in [0, 1], got {value}"));
            }
        }
        for (name, value) in [
            ("idle_intensity", self.idle_intensity),
            ("interaction_scale", self.interaction_scale),
            ("min_neighbor_distance", self.min_neighbor_distance),
            ("breathe_depth", self.breathe_depth),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("field.{name} must not be negative, got {value}"));
            }
        }
        Ok(())
    }
}

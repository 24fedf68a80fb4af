use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Linear mapping between display units (points) and solver units (meters).
///
/// Rapier is tuned for objects sized in meters, while clients lay scenes out in
/// points. Every length crossing the public API goes through one of these.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitScale {
    points_per_meter: f32,
}

impl UnitScale {
    pub const DEFAULT_POINTS_PER_METER: f32 = 32.0;

    /// Create a scale. `points_per_meter` must be positive and finite.
    pub fn new(points_per_meter: f32) -> Result<Self> {
        if !(points_per_meter.is_finite() && points_per_meter > 0.0) {
            return Err(PhysicsError::InvalidDimension {
                what: "points_per_meter",
                value: points_per_meter,
            });
        }
        Ok(Self { points_per_meter })
    }

    pub fn points_per_meter(&self) -> f32 {
        self.points_per_meter
    }

    pub fn to_meters(&self, points: f32) -> f32 {
        points / self.points_per_meter
    }

    pub fn to_points(&self, meters: f32) -> f32 {
        meters * self.points_per_meter
    }

    pub fn vec_to_meters(&self, points: Vec2) -> Vec2 {
        points / self.points_per_meter
    }

    pub fn vec_to_points(&self, meters: Vec2) -> Vec2 {
        meters * self.points_per_meter
    }

    /// Area densities scale with the square of the length ratio.
    pub fn density_to_solver(&self, kg_per_point2: f32) -> f32 {
        kg_per_point2 * self.points_per_meter * self.points_per_meter
    }

    pub fn density_to_points(&self, kg_per_meter2: f32) -> f32 {
        kg_per_meter2 / (self.points_per_meter * self.points_per_meter)
    }
}

impl Default for UnitScale {
    fn default() -> Self {
        Self {
            points_per_meter: Self::DEFAULT_POINTS_PER_METER,
        }
    }
}

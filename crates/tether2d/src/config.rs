use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};
use crate::units::UnitScale;

/// Configuration for a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity in points / s². Default: 9.8 m/s² downward at the default scale.
    pub gravity: Vec2,
    /// Display units per solver meter (default: 32).
    pub points_per_meter: f32,
    /// Allow bodies to fall asleep when at rest (default: true).
    pub allow_sleep: bool,
    /// Reset accumulated forces after every step (default: true).
    pub auto_clear_forces: bool,
    /// Velocity iterations used by `World::step_default` (default: 8).
    pub velocity_iterations: usize,
    /// Position iterations used by `World::step_default` (default: 3).
    pub position_iterations: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.8 * UnitScale::DEFAULT_POINTS_PER_METER),
            points_per_meter: UnitScale::DEFAULT_POINTS_PER_METER,
            allow_sleep: true,
            auto_clear_forces: true,
            velocity_iterations: 8,
            position_iterations: 3,
        }
    }
}

impl WorldConfig {
    /// Parse a configuration from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_points_per_meter(mut self, points_per_meter: f32) -> Self {
        self.points_per_meter = points_per_meter;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_auto_clear_forces(mut self, enabled: bool) -> Self {
        self.auto_clear_forces = enabled;
        self
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        UnitScale::new(self.points_per_meter)?;
        if !self.gravity.is_finite() {
            return Err(PhysicsError::Config(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        Ok(())
    }

    /// Replace out-of-range fields with their defaults.
    pub(crate) fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if UnitScale::new(self.points_per_meter).is_err() {
            self.points_per_meter = defaults.points_per_meter;
        }
        if !self.gravity.is_finite() {
            self.gravity = defaults.gravity;
        }
        self
    }

    pub(crate) fn scale(&self) -> UnitScale {
        UnitScale::new(self.points_per_meter).unwrap_or_default()
    }
}

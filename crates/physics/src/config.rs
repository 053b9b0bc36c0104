//! # World Configuration
//!
//! Plain, serialisable parameters for building a [`PhysicsWorld`](crate::PhysicsWorld).
//! Hosts typically load this from JSON; every field has a default so partial
//! documents are accepted.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use solver::MIN_FRAME_RATE_LIMITS;

use crate::error::{PhysicsError, Result};
use crate::material::NamedMaterial;

/// Axis-aligned containment box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundaryConfig {
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidConfiguration`] unless `min < max` on
    /// every axis and both corners are finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(PhysicsError::InvalidConfiguration(
                "boundary corners must be finite".to_string(),
            ));
        }
        if self.min.cmpge(self.max).any() {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "boundary min {} must be below max {} on every axis",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec3,
    /// Multiplier applied to wall-clock time. Must be positive.
    pub simulation_speed: f32,
    /// Clamped to the solver's supported range.
    pub min_frame_rate: f32,
    /// Keeps bodies on the `z = 0` plane with their rotation about Z only.
    pub force_2d: bool,
    /// `update` does nothing until the world is unpaused.
    pub start_paused: bool,
    pub boundary: Option<BoundaryConfig>,
    pub materials: Vec<NamedMaterial>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            simulation_speed: 1.0,
            min_frame_rate: MIN_FRAME_RATE_LIMITS.0,
            force_2d: false,
            start_paused: true,
            boundary: None,
            materials: Vec::new(),
        }
    }
}

impl WorldConfig {
    /// # Errors
    ///
    /// Rejects a non-positive simulation speed, a non-finite gravity vector
    /// and an invalid boundary. The frame rate is clamped later rather than
    /// rejected here.
    pub fn validate(&self) -> Result<()> {
        validate_speed(self.simulation_speed)?;
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfiguration(
                "gravity must be finite".to_string(),
            ));
        }
        if let Some(boundary) = &self.boundary {
            boundary.validate()?;
        }
        for material in &self.materials {
            material.definition.validate()?;
        }
        Ok(())
    }
}

pub(crate) fn validate_speed(speed: f32) -> Result<()> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidConfiguration(format!(
            "simulation speed must be positive, got {speed}"
        )))
    }
}

/// Clamps a requested frame rate into the solver's range, warning when it moves.
pub(crate) fn clamp_frame_rate(requested: f32) -> f32 {
    let (low, high) = MIN_FRAME_RATE_LIMITS;
    let clamped = if requested.is_nan() {
        low
    } else {
        requested.clamp(low, high)
    };
    if (clamped - requested).abs() > f32::EPSILON || requested.is_nan() {
        tracing::warn!(requested, clamped, "minimum frame rate clamped");
    }
    clamped
}

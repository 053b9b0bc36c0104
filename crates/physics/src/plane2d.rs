//! # 2D Plane Enforcement
//!
//! Keeps a 3D body on the `z = 0` plane, spinning only about Z, using
//! corrective force and torque instead of a hard constraint. Each step the
//! out-of-plane velocity is removed and the remaining offset is driven back
//! over roughly one step, which leaves a small residual wobble.

use glam::{Quat, Vec3};
use solver::BodyState;

use crate::body::PlaneOverride;

/// Fraction of the positional offset removed per step.
pub const PLANE_TRANSLATION_GAIN: f32 = 0.5;

/// Fraction of the tilt removed per step.
pub const PLANE_ROTATION_GAIN: f32 = 0.5;

const MIN_PROJECTION: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneCorrection {
    pub velocity: Option<Vec3>,
    pub angular_velocity: Option<Vec3>,
    pub force: Vec3,
    pub torque: Vec3,
}

/// Rotation, as a scaled axis, that brings the body's local X and Y axes
/// back onto the XY plane.
#[must_use]
pub fn tilt_error(orientation: Quat) -> Vec3 {
    let mut error = Vec3::ZERO;
    for local in [Vec3::X, Vec3::Y] {
        let current = orientation * local;
        let flattened = Vec3::new(current.x, current.y, 0.0);
        let length = flattened.length();
        if length < MIN_PROJECTION {
            // Axis points along Z; the other axis carries the tilt.
            continue;
        }
        error += current.cross(flattened / length);
    }
    Vec3::new(error.x, error.y, 0.0)
}

#[must_use]
pub fn plane_correction(state: &BodyState, timestep: f32, plane_override: PlaneOverride) -> PlaneCorrection {
    let mut correction = PlaneCorrection {
        velocity: None,
        angular_velocity: None,
        force: Vec3::ZERO,
        torque: Vec3::ZERO,
    };
    if state.mass <= 0.0 || timestep <= 0.0 {
        return correction;
    }
    let inv_dt2 = 1.0 / (timestep * timestep);

    if !plane_override.translation {
        let v = state.velocity;
        correction.velocity = Some(Vec3::new(v.x, v.y, 0.0));
        correction.force.z = -state.mass * state.position.z * PLANE_TRANSLATION_GAIN * inv_dt2;
    }

    if !plane_override.rotation {
        let w = state.angular_velocity;
        correction.angular_velocity = Some(Vec3::new(0.0, 0.0, w.z));
        let alpha = tilt_error(state.orientation) * PLANE_ROTATION_GAIN * inv_dt2;
        // World-space inertia applied to the desired angular acceleration.
        let local = state.orientation.inverse() * alpha;
        correction.torque = state.orientation * (state.inertia * local);
    }
    correction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(position: Vec3, orientation: Quat) -> BodyState {
        BodyState {
            position,
            orientation,
            velocity: Vec3::new(1.0, 2.0, 3.0),
            angular_velocity: Vec3::new(0.5, 0.5, 0.5),
            mass: 2.0,
            inertia: Vec3::splat(0.2),
        }
    }

    #[test]
    fn flat_body_needs_no_force() {
        let c = plane_correction(&state(Vec3::ZERO, Quat::from_rotation_z(1.0)), 0.01, PlaneOverride::default());
        assert_eq!(c.velocity, Some(Vec3::new(1.0, 2.0, 0.0)));
        assert_eq!(c.angular_velocity, Some(Vec3::new(0.0, 0.0, 0.5)));
        assert!(c.force.length() < 1e-4);
        assert!(c.torque.length() < 1e-3);
    }

    #[test]
    fn offset_body_is_pulled_to_plane() {
        let c = plane_correction(&state(Vec3::new(0.0, 0.0, 0.1), Quat::IDENTITY), 0.01, PlaneOverride::default());
        assert!(c.force.z < 0.0);
        assert!(c.force.x.abs() < f32::EPSILON);
    }

    #[test]
    fn tilted_body_is_torqued_back() {
        let c = plane_correction(&state(Vec3::ZERO, Quat::from_rotation_x(0.2)), 0.01, PlaneOverride::default());
        assert!(c.torque.x < 0.0, "torque={}", c.torque);
        assert!(c.torque.z.abs() < 1e-3);
    }

    #[test]
    fn overrides_disable_each_half() {
        let overrides = PlaneOverride {
            rotation: true,
            translation: true,
        };
        let c = plane_correction(&state(Vec3::new(0.0, 0.0, 1.0), Quat::from_rotation_x(0.2)), 0.01, overrides);
        assert_eq!(c.velocity, None);
        assert_eq!(c.angular_velocity, None);
        assert_eq!(c.force, Vec3::ZERO);
        assert_eq!(c.torque, Vec3::ZERO);
    }

    #[test]
    fn static_bodies_are_ignored() {
        let mut s = state(Vec3::new(0.0, 0.0, 1.0), Quat::IDENTITY);
        s.mass = 0.0;
        let c = plane_correction(&s, 0.01, PlaneOverride::default());
        assert_eq!(c.velocity, None);
    }
}

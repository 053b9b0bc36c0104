//! Framework force pass: gravity, then boundary correction, then 2D-plane
//! correction. Runs for each body before its user hook.

use glam::Vec3;
use solver::ForceAccess;

use crate::body::PlaneOverride;
use crate::boundary::boundary_correction;
use crate::plane2d::plane_correction;

/// World settings the force pass reads, copied out of the world for the
/// duration of one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceEnvironment {
    pub gravity: Vec3,
    pub boundary: Option<(Vec3, Vec3)>,
    pub force_2d: bool,
}

/// Per-body flags the force pass honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BodyForceFlags {
    pub apply_gravity: bool,
    pub plane_override: PlaneOverride,
}

impl ForceEnvironment {
    pub(crate) fn apply(&self, flags: BodyForceFlags, access: &mut dyn ForceAccess) {
        let state = access.state();
        if state.mass <= 0.0 {
            return;
        }

        if flags.apply_gravity {
            access.add_force(state.mass * self.gravity);
        }

        if let Some((min, max)) = self.boundary {
            let correction = boundary_correction(min, max, state.position, state.velocity, state.mass);
            if correction.is_active(state.velocity) {
                access.set_velocity(correction.velocity);
                access.add_force(correction.force);
            }
        }

        if self.force_2d {
            // Re-read so the plane pass sees the boundary's velocity override.
            let state = access.state();
            let correction = plane_correction(&state, access.timestep(), flags.plane_override);
            if let Some(velocity) = correction.velocity {
                access.set_velocity(velocity);
            }
            if let Some(angular_velocity) = correction.angular_velocity {
                access.set_angular_velocity(angular_velocity);
            }
            access.add_force(correction.force);
            access.add_torque(correction.torque);
        }
    }
}

//! # Collision Boundary
//!
//! A soft containment box. Six thick static walls stop bodies passively, and
//! the per-step force pass pulls back any body whose centre of mass has
//! crossed a face. Wall depth follows the size of the face it closes so that
//! a fast body cannot cross a wall in one step.

use glam::{Quat, Vec3};
use solver::{BodyDesc, BodyHandle, CollisionShape, NativeSolver};

use crate::error::Result;
use crate::types::{BoundaryEdges, LineSegment};

/// Upper bound on wall thickness.
pub const MAX_WALL_DEPTH: f32 = 100.0;

/// Acceleration pulling a body back once it is outside the box.
pub const BOUNDARY_ACCELERATION: f32 = 50.0;

#[derive(Debug, Clone)]
pub struct CollisionBoundary {
    min: Vec3,
    max: Vec3,
    depth: Vec3,
    walls: Vec<BodyHandle>,
}

/// Wall thickness per axis: the larger of the other two box dimensions, capped.
#[must_use]
pub fn wall_depths(min: Vec3, max: Vec3) -> Vec3 {
    let size = max - min;
    Vec3::new(
        size.y.max(size.z).min(MAX_WALL_DEPTH),
        size.x.max(size.z).min(MAX_WALL_DEPTH),
        size.x.max(size.y).min(MAX_WALL_DEPTH),
    )
}

impl CollisionBoundary {
    /// Creates the six walls in the solver. Callers validate the corners.
    pub(crate) fn build(solver: &mut dyn NativeSolver, min: Vec3, max: Vec3) -> Result<Self> {
        let depth = wall_depths(min, max);
        let centre = 0.5 * (min + max);
        let half = 0.5 * (max - min);
        let material = solver.default_material();
        let mut walls = Vec::with_capacity(6);

        for axis in 0..3 {
            for side in [-1.0_f32, 1.0] {
                let mut half_extents = half + depth;
                half_extents[axis] = 0.5 * depth[axis];
                let mut position = centre;
                position[axis] = if side < 0.0 {
                    min[axis] - 0.5 * depth[axis]
                } else {
                    max[axis] + 0.5 * depth[axis]
                };
                let handle = solver.create_body(&BodyDesc {
                    shape: CollisionShape::cuboid(half_extents),
                    mass: 0.0,
                    position,
                    orientation: Quat::IDENTITY,
                    velocity: Vec3::ZERO,
                    angular_velocity: Vec3::ZERO,
                    material,
                })?;
                walls.push(handle);
            }
        }
        tracing::debug!(%min, %max, %depth, "built collision boundary");
        Ok(Self {
            min,
            max,
            depth,
            walls,
        })
    }

    /// Destroys the walls in the solver.
    pub(crate) fn tear_down(self, solver: &mut dyn NativeSolver) -> Result<()> {
        for wall in self.walls {
            solver.destroy_body(wall)?;
        }
        tracing::debug!(min = %self.min, max = %self.max, "removed collision boundary");
        Ok(())
    }

    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.max
    }

    #[must_use]
    pub fn wall_depth(&self) -> Vec3 {
        self.depth
    }

    #[must_use]
    pub fn edges(&self) -> BoundaryEdges {
        BoundaryEdges {
            inner: box_edges(self.min, self.max),
            outer: box_edges(self.min - self.depth, self.max + self.depth),
        }
    }
}

/// The twelve edges of an axis-aligned box.
#[must_use]
pub fn box_edges(min: Vec3, max: Vec3) -> Vec<LineSegment> {
    let corner = |i: u8| {
        Vec3::new(
            if i & 1 == 0 { min.x } else { max.x },
            if i & 2 == 0 { min.y } else { max.y },
            if i & 4 == 0 { min.z } else { max.z },
        )
    };
    let mut edges = Vec::with_capacity(12);
    for i in 0..8u8 {
        for bit in [1u8, 2, 4] {
            if i & bit == 0 {
                edges.push(LineSegment::new(corner(i), corner(i | bit)));
            }
        }
    }
    edges
}

/// Velocity override and force for a body relative to the boundary box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryCorrection {
    pub velocity: Vec3,
    pub force: Vec3,
}

impl BoundaryCorrection {
    #[must_use]
    pub fn is_active(&self, velocity: Vec3) -> bool {
        self.force != Vec3::ZERO || self.velocity != velocity
    }
}

/// Per axis: a body past a face, or sitting on it while still moving
/// outward, loses its outward velocity and is pulled back at
/// [`BOUNDARY_ACCELERATION`].
#[must_use]
pub fn boundary_correction(
    min: Vec3,
    max: Vec3,
    position: Vec3,
    velocity: Vec3,
    mass: f32,
) -> BoundaryCorrection {
    let mut corrected = velocity;
    let mut force = Vec3::ZERO;
    for axis in 0..3 {
        let p = position[axis];
        let v = velocity[axis];
        if p > max[axis] || (p >= max[axis] && v > 0.0) {
            if v > 0.0 {
                corrected[axis] = 0.0;
            }
            force[axis] = -mass * BOUNDARY_ACCELERATION;
        } else if p < min[axis] || (p <= min[axis] && v < 0.0) {
            if v < 0.0 {
                corrected[axis] = 0.0;
            }
            force[axis] = mass * BOUNDARY_ACCELERATION;
        }
    }
    BoundaryCorrection {
        velocity: corrected,
        force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver::ReferenceSolver;

    const MIN: Vec3 = Vec3::splat(-10.0);
    const MAX: Vec3 = Vec3::splat(10.0);

    #[test]
    fn inside_body_is_untouched() {
        let c = boundary_correction(MIN, MAX, Vec3::new(1.0, 2.0, 3.0), Vec3::new(5.0, 0.0, 0.0), 2.0);
        assert_eq!(c.force, Vec3::ZERO);
        assert_eq!(c.velocity, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn body_on_face_at_rest_is_untouched() {
        let c = boundary_correction(MIN, MAX, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO, 1.0);
        assert!(!c.is_active(Vec3::ZERO));
    }

    #[test]
    fn body_on_face_moving_out_is_pulled_back() {
        let c = boundary_correction(MIN, MAX, Vec3::new(10.0, 0.0, 0.0), Vec3::new(1.0, 0.5, 0.0), 1.0);
        assert_eq!(c.velocity, Vec3::new(0.0, 0.5, 0.0));
        assert!(c.force.x < 0.0);
    }

    #[test]
    fn body_outside_low_face_keeps_inward_velocity() {
        let c = boundary_correction(MIN, MAX, Vec3::new(0.0, -12.0, 0.0), Vec3::new(0.0, 3.0, 0.0), 2.0);
        assert_eq!(c.velocity, Vec3::new(0.0, 3.0, 0.0));
        assert!((c.force.y - 2.0 * BOUNDARY_ACCELERATION).abs() < 1e-4);
    }

    #[test]
    fn wall_depth_is_capped() {
        let depth = wall_depths(Vec3::ZERO, Vec3::new(500.0, 2.0, 4.0));
        assert!((depth.x - 4.0).abs() < f32::EPSILON);
        assert!((depth.y - MAX_WALL_DEPTH).abs() < f32::EPSILON);
        assert!((depth.z - MAX_WALL_DEPTH).abs() < f32::EPSILON);
    }

    #[test]
    fn box_has_twelve_unit_edges() {
        let edges = box_edges(Vec3::ZERO, Vec3::ONE);
        assert_eq!(edges.len(), 12);
        assert!(edges.iter().all(|e| (e.length() - 1.0).abs() < 1e-6));
    }

    #[test]
    fn build_and_tear_down_walls() {
        let mut solver = ReferenceSolver::new();
        let boundary = CollisionBoundary::build(&mut solver, MIN, MAX).unwrap();
        assert_eq!(solver.body_count(), 6);
        let edges = boundary.edges();
        assert_eq!(edges.outer.len(), 12);
        assert!((edges.outer[0].length() - 60.0).abs() < 1e-4);
        boundary.tear_down(&mut solver).unwrap();
        assert_eq!(solver.body_count(), 0);
    }
}

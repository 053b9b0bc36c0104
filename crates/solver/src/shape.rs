//! Collision shapes understood by the engine.

use glam::{Quat, Vec3};

use crate::{Result, SolverError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[must_use]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

impl CollisionShape {
    #[must_use]
    pub const fn sphere(radius: f32) -> Self {
        CollisionShape::Sphere { radius }
    }

    #[must_use]
    pub const fn cuboid(half_extents: Vec3) -> Self {
        CollisionShape::Box { half_extents }
    }

    /// # Errors
    ///
    /// Returns [`SolverError::InvalidShape`] for non-positive or non-finite
    /// dimensions.
    pub fn validate(&self) -> Result<()> {
        match *self {
            CollisionShape::Sphere { radius } => {
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(SolverError::InvalidShape("sphere radius must be positive"));
                }
            }
            CollisionShape::Box { half_extents } => {
                if !(half_extents.is_finite() && half_extents.min_element() > 0.0) {
                    return Err(SolverError::InvalidShape("box half extents must be positive"));
                }
            }
        }
        Ok(())
    }

    /// Principal moments of inertia for a solid body of `mass`.
    #[must_use]
    pub fn inertia(&self, mass: f32) -> Vec3 {
        match *self {
            CollisionShape::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
            CollisionShape::Box { half_extents: h } => {
                let sq = h * h;
                Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 3.0)
            }
        }
    }

    #[must_use]
    pub fn aabb(&self, position: Vec3, orientation: Quat) -> Aabb {
        let extent = match *self {
            CollisionShape::Sphere { radius } => Vec3::splat(radius),
            CollisionShape::Box { half_extents } => {
                let rot = glam::Mat3::from_quat(orientation);
                let abs = glam::Mat3::from_cols(rot.x_axis.abs(), rot.y_axis.abs(), rot.z_axis.abs());
                abs * half_extents
            }
        };
        Aabb {
            min: position - extent,
            max: position + extent,
        }
    }

    /// Intersects the segment `from..to` with the shape placed at
    /// `position`/`orientation`. Returns the entry fraction and the outward
    /// surface normal.
    #[must_use]
    pub fn ray_intersect(
        &self,
        position: Vec3,
        orientation: Quat,
        from: Vec3,
        to: Vec3,
    ) -> Option<(f32, Vec3)> {
        let delta = to - from;
        match *self {
            CollisionShape::Sphere { radius } => {
                let m = from - position;
                let a = delta.dot(delta);
                if a <= f32::EPSILON {
                    return None;
                }
                let b = m.dot(delta);
                let c = m.dot(m) - radius * radius;
                if c > 0.0 && b > 0.0 {
                    return None;
                }
                let discriminant = b * b - a * c;
                if discriminant < 0.0 {
                    return None;
                }
                let t = ((-b - discriminant.sqrt()) / a).max(0.0);
                if t > 1.0 {
                    return None;
                }
                let point = from + delta * t;
                let normal = (point - position).try_normalize().unwrap_or(-delta.normalize());
                Some((t, normal))
            }
            CollisionShape::Box { half_extents } => {
                let inverse = orientation.inverse();
                let local_from = inverse * (from - position);
                let local_delta = inverse * delta;
                let mut t_min = 0.0_f32;
                let mut t_max = 1.0_f32;
                let mut entry_axis = None;
                for axis in 0..3 {
                    let origin = local_from[axis];
                    let dir = local_delta[axis];
                    let half = half_extents[axis];
                    if dir.abs() < f32::EPSILON {
                        if origin < -half || origin > half {
                            return None;
                        }
                        continue;
                    }
                    let mut t0 = (-half - origin) / dir;
                    let mut t1 = (half - origin) / dir;
                    let mut sign = -1.0;
                    if t0 > t1 {
                        std::mem::swap(&mut t0, &mut t1);
                        sign = 1.0;
                    }
                    if t0 > t_min {
                        t_min = t0;
                        entry_axis = Some((axis, sign));
                    }
                    t_max = t_max.min(t1);
                    if t_min > t_max {
                        return None;
                    }
                }
                let local_normal = match entry_axis {
                    Some((axis, sign)) => {
                        let mut n = Vec3::ZERO;
                        n[axis] = sign;
                        n
                    }
                    // Segment starts inside the box.
                    None => -local_delta.normalize_or_zero(),
                };
                Some((t_min, orientation * local_normal))
            }
        }
    }
}

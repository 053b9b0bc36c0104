//! Narrow-phase contact generation and impulse response.

use glam::{Quat, Vec3};

use crate::reference::body::RigidBody;
use crate::{BodyHandle, CollisionShape, ContactAccess, PairProperties};

const POSITION_CORRECTION_PERCENT: f32 = 0.8;
const POSITION_CORRECTION_SLOP: f32 = 0.01;
const RESTITUTION_THRESHOLD: f32 = 0.5;
const SLIDING_THRESHOLD: f32 = 0.05;
const DEGENERATE_WIDTH: f32 = 1e-4;

/// One manifold point. The normal points from body A towards body B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ContactPoint {
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
}

/// Accepted contact waiting for the velocity solve.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolverContact {
    pub a: usize,
    pub b: usize,
    pub point: ContactPoint,
    pub properties: PairProperties,
    pub target_normal_speed: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
}

/// Generates the manifold between two placed shapes.
pub(crate) fn detect(a: &RigidBody, b: &RigidBody) -> Vec<ContactPoint> {
    match (a.shape, b.shape) {
        (CollisionShape::Sphere { radius: ra }, CollisionShape::Sphere { radius: rb }) => {
            sphere_sphere(a.position, ra, b.position, rb).into_iter().collect()
        }
        (CollisionShape::Sphere { radius }, CollisionShape::Box { half_extents }) => {
            sphere_box(a.position, radius, b.position, b.orientation, half_extents)
                .into_iter()
                .collect()
        }
        (CollisionShape::Box { half_extents }, CollisionShape::Sphere { radius }) => {
            sphere_box(b.position, radius, a.position, a.orientation, half_extents)
                .map(|c| ContactPoint {
                    normal: -c.normal,
                    ..c
                })
                .into_iter()
                .collect()
        }
        (CollisionShape::Box { .. }, CollisionShape::Box { .. }) => box_box(a, b),
    }
}

fn sphere_sphere(pos_a: Vec3, radius_a: f32, pos_b: Vec3, radius_b: f32) -> Option<ContactPoint> {
    let delta = pos_b - pos_a;
    let distance_squared = delta.dot(delta);
    let min_distance = radius_a + radius_b;

    if distance_squared >= min_distance * min_distance {
        return None;
    }
    let distance = distance_squared.sqrt();

    // Coincident centres: pick a stable direction.
    let normal = if distance > 0.0001 { delta / distance } else { Vec3::Y };

    Some(ContactPoint {
        point: pos_a + normal * radius_a,
        normal,
        depth: min_distance - distance,
    })
}

/// Sphere against an oriented box; the normal points from the sphere to the box.
fn sphere_box(
    sphere_pos: Vec3,
    radius: f32,
    box_pos: Vec3,
    box_orientation: Quat,
    half_extents: Vec3,
) -> Option<ContactPoint> {
    let local_centre = box_orientation.inverse() * (sphere_pos - box_pos);
    let local_closest = local_centre.clamp(-half_extents, half_extents);
    let delta = local_closest - local_centre;
    let distance_squared = delta.dot(delta);

    if distance_squared >= radius * radius {
        return None;
    }
    let distance = distance_squared.sqrt();

    let (local_normal, depth) = if distance > 0.0001 {
        (delta / distance, radius - distance)
    } else {
        // Centre inside the box: push out through the nearest face.
        let face_distance = half_extents - local_centre.abs();
        let axis = if face_distance.x < face_distance.y && face_distance.x < face_distance.z {
            0
        } else if face_distance.y < face_distance.z {
            1
        } else {
            2
        };
        let mut n = Vec3::ZERO;
        n[axis] = -local_centre[axis].signum();
        (n, radius + face_distance[axis])
    };

    let normal = box_orientation * local_normal;
    Some(ContactPoint {
        point: sphere_pos + normal * radius,
        normal,
        depth,
    })
}

/// Box pair, approximated by their world-space bounds. Produces up to four
/// points spanning the overlap face.
fn box_box(a: &RigidBody, b: &RigidBody) -> Vec<ContactPoint> {
    let bounds_a = a.aabb();
    let bounds_b = b.aabb();
    let centre_diff = b.position - a.position;

    let overlap_min = bounds_a.min.max(bounds_b.min);
    let overlap_max = bounds_a.max.min(bounds_b.max);
    let overlap = overlap_max - overlap_min;
    if overlap.min_element() <= 0.0 {
        return Vec::new();
    }

    let axis = if overlap.x <= overlap.y && overlap.x <= overlap.z {
        0
    } else if overlap.y <= overlap.z {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = if centre_diff[axis] < 0.0 { -1.0 } else { 1.0 };
    let depth = overlap[axis];
    let plane = 0.5 * (overlap_min[axis] + overlap_max[axis]);

    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
    let mut points: Vec<ContactPoint> = Vec::with_capacity(4);
    for &pu in &[overlap_min[u], overlap_max[u]] {
        for &pv in &[overlap_min[v], overlap_max[v]] {
            let mut point = Vec3::ZERO;
            point[axis] = plane;
            point[u] = pu;
            point[v] = pv;
            if points
                .iter()
                .all(|p| p.point.distance(point) > DEGENERATE_WIDTH)
            {
                points.push(ContactPoint {
                    point,
                    normal,
                    depth,
                });
            }
        }
    }
    points
}

/// Velocity of `body` at world point `point`.
fn point_velocity(body: &RigidBody, point: Vec3) -> Vec3 {
    body.velocity + body.angular_velocity.cross(point - body.position)
}

/// Effective inverse mass of the pair along `direction` at `point`.
fn effective_inverse_mass(a: &RigidBody, b: &RigidBody, point: Vec3, direction: Vec3) -> f32 {
    let ra = (point - a.position).cross(direction);
    let rb = (point - b.position).cross(direction);
    a.inv_mass + b.inv_mass + ra.dot(a.apply_inv_inertia(ra)) + rb.dot(b.apply_inv_inertia(rb))
}

fn apply_impulse(a: &mut RigidBody, b: &mut RigidBody, point: Vec3, impulse: Vec3) {
    a.velocity -= impulse * a.inv_mass;
    a.angular_velocity -= a.apply_inv_inertia((point - a.position).cross(impulse));
    b.velocity += impulse * b.inv_mass;
    b.angular_velocity += b.apply_inv_inertia((point - b.position).cross(impulse));
}

impl SolverContact {
    pub(crate) fn new(
        a: usize,
        b: usize,
        bodies: &[RigidBody],
        point: ContactPoint,
        properties: PairProperties,
    ) -> Self {
        let relative = point_velocity(&bodies[b], point.point) - point_velocity(&bodies[a], point.point);
        let normal_speed = relative.dot(point.normal);
        let target_normal_speed = if normal_speed < -RESTITUTION_THRESHOLD {
            -properties.elasticity * normal_speed
        } else {
            0.0
        };
        Self {
            a,
            b,
            point,
            properties,
            target_normal_speed,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
        }
    }

    /// One sequential-impulse iteration for this contact.
    pub(crate) fn solve(&mut self, bodies: &mut [RigidBody]) {
        let (a, b) = pair_mut(bodies, self.a, self.b);
        let point = self.point.point;
        let normal = self.point.normal;

        let relative = point_velocity(b, point) - point_velocity(a, point);
        let normal_speed = relative.dot(normal);
        let k = effective_inverse_mass(a, b, point, normal);
        if k <= f32::EPSILON {
            return;
        }
        let lambda = (self.target_normal_speed - normal_speed) / k;
        let accumulated = (self.normal_impulse + lambda).max(0.0);
        let applied = accumulated - self.normal_impulse;
        self.normal_impulse = accumulated;
        apply_impulse(a, b, point, normal * applied);

        let relative = point_velocity(b, point) - point_velocity(a, point);
        let tangent_velocity = relative - normal * relative.dot(normal);
        let friction = if tangent_velocity.length() > SLIDING_THRESHOLD {
            self.properties.kinetic_friction
        } else {
            self.properties.static_friction
        };
        let limit = friction * self.normal_impulse;
        let (t1, t2) = normal.any_orthonormal_pair();
        for (slot, tangent) in [t1, t2].into_iter().enumerate() {
            let k = effective_inverse_mass(a, b, point, tangent);
            if k <= f32::EPSILON {
                continue;
            }
            let speed = (point_velocity(b, point) - point_velocity(a, point)).dot(tangent);
            let lambda = -speed / k;
            let accumulated = (self.tangent_impulse[slot] + lambda).clamp(-limit, limit);
            let applied = accumulated - self.tangent_impulse[slot];
            self.tangent_impulse[slot] = accumulated;
            apply_impulse(a, b, point, tangent * applied);
        }
    }

    /// Pushes penetrating bodies apart after position integration.
    pub(crate) fn correct_position(&self, bodies: &mut [RigidBody]) {
        let (a, b) = pair_mut(bodies, self.a, self.b);
        let inv_mass_sum = a.inv_mass + b.inv_mass;
        if inv_mass_sum <= 0.0 {
            return;
        }
        let percent = POSITION_CORRECTION_PERCENT * (1.0 - self.properties.softness.clamp(0.0, 1.0));
        let magnitude = (self.point.depth - POSITION_CORRECTION_SLOP).max(0.0) / inv_mass_sum * percent;
        let correction = self.point.normal * magnitude;
        a.position -= correction * a.inv_mass;
        b.position += correction * b.inv_mass;
    }
}

/// Mutable access to two distinct bodies of a slice.
pub(crate) fn pair_mut(bodies: &mut [RigidBody], a: usize, b: usize) -> (&mut RigidBody, &mut RigidBody) {
    assert_ne!(a, b, "a contact needs two distinct bodies");
    if a < b {
        let (head, tail) = bodies.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = bodies.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

/// Contact introspection handed to `contact_process`.
pub(crate) struct ContactSlot {
    pub point: ContactPoint,
    pub normal_speed: f32,
    pub force: Vec3,
}

impl ContactSlot {
    pub(crate) fn new(a: &RigidBody, b: &RigidBody, point: ContactPoint, timestep: f32) -> Self {
        let relative = point_velocity(b, point.point) - point_velocity(a, point.point);
        let normal_speed = -relative.dot(point.normal);
        let k = effective_inverse_mass(a, b, point.point, point.normal);
        let force = if normal_speed > 0.0 && k > f32::EPSILON {
            point.normal * (normal_speed / k / timestep)
        } else {
            Vec3::ZERO
        };
        Self {
            point,
            normal_speed,
            force,
        }
    }
}

impl ContactAccess for ContactSlot {
    fn position(&self) -> Vec3 {
        self.point.point
    }

    fn normal(&self) -> Vec3 {
        self.point.normal
    }

    fn normal_speed(&self) -> f32 {
        self.normal_speed
    }

    fn force(&self) -> Vec3 {
        self.force
    }

    fn tangent_directions(&self) -> (Vec3, Vec3) {
        self.point.normal.any_orthonormal_pair()
    }
}

/// Canonical ordering for a body pair.
pub(crate) fn ordered(a: BodyHandle, b: BodyHandle) -> (BodyHandle, BodyHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

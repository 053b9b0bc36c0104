//! Rigid body storage and integration for the reference engine.

use glam::{Quat, Vec3};

use crate::{Aabb, BodyState, CollisionShape, ForceAccess, MaterialHandle};

#[derive(Debug, Clone)]
pub(crate) struct RigidBody {
    pub shape: CollisionShape,
    pub mass: f32,
    pub inv_mass: f32,
    pub inertia: Vec3,
    pub inv_inertia: Vec3,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub material: MaterialHandle,
    pub force: Vec3,
    pub torque: Vec3,
    pub force_callback: bool,
}

impl RigidBody {
    pub(crate) fn new(
        shape: CollisionShape,
        mass: f32,
        position: Vec3,
        orientation: Quat,
        material: MaterialHandle,
    ) -> Self {
        let mut body = Self {
            shape,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: Vec3::ZERO,
            inv_inertia: Vec3::ZERO,
            position,
            orientation: orientation.normalize(),
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            material,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            force_callback: false,
        };
        body.set_mass(mass);
        body
    }

    pub(crate) fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        if mass > 0.0 {
            self.inv_mass = 1.0 / mass;
            self.inertia = self.shape.inertia(mass);
            self.inv_inertia = self.inertia.recip();
        } else {
            self.inv_mass = 0.0;
            self.inertia = Vec3::ZERO;
            self.inv_inertia = Vec3::ZERO;
            self.velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
        }
    }

    pub(crate) fn is_dynamic(&self) -> bool {
        self.inv_mass > 0.0
    }

    pub(crate) fn state(&self) -> BodyState {
        BodyState {
            position: self.position,
            orientation: self.orientation,
            velocity: self.velocity,
            angular_velocity: self.angular_velocity,
            mass: self.mass,
            inertia: self.inertia,
        }
    }

    pub(crate) fn aabb(&self) -> Aabb {
        self.shape.aabb(self.position, self.orientation)
    }

    /// World-space inverse inertia applied to `v`.
    pub(crate) fn apply_inv_inertia(&self, v: Vec3) -> Vec3 {
        let local = self.orientation.inverse() * v;
        self.orientation * (local * self.inv_inertia)
    }

    pub(crate) fn integrate_velocity(&mut self, timestep: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.velocity += self.force * self.inv_mass * timestep;
        self.angular_velocity += self.apply_inv_inertia(self.torque) * timestep;
    }

    pub(crate) fn integrate_position(&mut self, timestep: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.position += self.velocity * timestep;
        let w = self.angular_velocity;
        let spin = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * self.orientation;
        let next = Quat::from_xyzw(
            self.orientation.x + 0.5 * timestep * spin.x,
            self.orientation.y + 0.5 * timestep * spin.y,
            self.orientation.z + 0.5 * timestep * spin.z,
            self.orientation.w + 0.5 * timestep * spin.w,
        );
        self.orientation = next.normalize();
    }
}

/// Force callback view over one body.
pub(crate) struct ForceSlot<'a> {
    pub body: &'a mut RigidBody,
    pub timestep: f32,
}

impl ForceAccess for ForceSlot<'_> {
    fn state(&self) -> BodyState {
        self.body.state()
    }

    fn timestep(&self) -> f32 {
        self.timestep
    }

    fn force(&self) -> Vec3 {
        self.body.force
    }

    fn torque(&self) -> Vec3 {
        self.body.torque
    }

    fn add_force(&mut self, force: Vec3) {
        self.body.force += force;
    }

    fn add_torque(&mut self, torque: Vec3) {
        self.body.torque += torque;
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.body.velocity = velocity;
    }

    fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.body.angular_velocity = angular_velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mass_body_is_static() {
        let mut body = RigidBody::new(
            CollisionShape::sphere(1.0),
            0.0,
            Vec3::ZERO,
            Quat::IDENTITY,
            MaterialHandle(0),
        );
        body.force = Vec3::new(0.0, -10.0, 0.0);
        body.integrate_velocity(0.1);
        body.integrate_position(0.1);
        assert_eq!(body.position, Vec3::ZERO);
        assert!(!body.is_dynamic());
    }

    #[test]
    fn spin_about_z_rotates_orientation() {
        let mut body = RigidBody::new(
            CollisionShape::sphere(1.0),
            1.0,
            Vec3::ZERO,
            Quat::IDENTITY,
            MaterialHandle(0),
        );
        body.angular_velocity = Vec3::new(0.0, 0.0, 1.0);
        for _ in 0..100 {
            body.integrate_position(0.01);
        }
        let (axis, angle) = body.orientation.to_axis_angle();
        assert!((angle - 1.0).abs() < 0.01, "angle={angle}");
        assert!((axis - Vec3::Z).length() < 1e-3);
    }
}

//! # Bodies
//!
//! World-side bookkeeping for native rigid bodies: descriptions used to
//! create them, the records the world keeps, read snapshots, write views
//! and the deferred removal queue.

use std::collections::{BTreeMap, HashMap};

use glam::{Quat, Vec3};
use solver::{BodyDesc, BodyHandle, BodyState, CollisionShape, ForceAccess, NativeSolver};

use crate::error::{PhysicsError, Result};
use crate::material::MaterialRegistry;
use crate::types::{BodyId, MaterialId};

/// User hook run once per body per native step, after gravity, boundary and
/// plane corrections have been applied.
pub type ForceHook = Box<dyn FnMut(&mut ForceContext<'_>)>;

/// Opts a body out of 2D-plane enforcement, per degree of freedom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneOverride {
    pub rotation: bool,
    pub translation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDescription {
    pub shape: CollisionShape,
    /// Zero creates a static body.
    pub mass: f32,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub material: MaterialId,
    pub apply_gravity: bool,
    pub plane_override: PlaneOverride,
    /// Opaque tag pointing back at the host object that owns this body.
    pub user_data: u64,
}

impl BodyDescription {
    #[must_use]
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            shape,
            mass: 1.0,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            material: MaterialId::DEFAULT,
            apply_gravity: true,
            plane_override: PlaneOverride::default(),
            user_data: 0,
        }
    }

    #[must_use]
    pub fn sphere(radius: f32) -> Self {
        Self::new(CollisionShape::sphere(radius))
    }

    #[must_use]
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(CollisionShape::cuboid(half_extents))
    }

    #[must_use]
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    #[must_use]
    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    #[must_use]
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    #[must_use]
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    #[must_use]
    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = material;
        self
    }

    #[must_use]
    pub fn without_gravity(mut self) -> Self {
        self.apply_gravity = false;
        self
    }

    #[must_use]
    pub fn with_plane_override(mut self, plane_override: PlaneOverride) -> Self {
        self.plane_override = plane_override;
        self
    }

    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

pub(crate) struct BodyRecord {
    pub handle: BodyHandle,
    pub shape: CollisionShape,
    pub material: MaterialId,
    pub apply_gravity: bool,
    pub plane_override: PlaneOverride,
    pub user_data: u64,
    pub force_hook: Option<ForceHook>,
    pub removal_pending: bool,
}

/// Snapshot of a body between steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub id: BodyId,
    pub state: BodyState,
    pub shape: CollisionShape,
    pub material: MaterialId,
    pub apply_gravity: bool,
    pub plane_override: PlaneOverride,
    pub user_data: u64,
    /// Queued by `remove_body`; disposed after the current update.
    pub removal_pending: bool,
}

impl Body {
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.state.position
    }

    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.state.velocity
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.state.mass <= 0.0
    }
}

/// Bodies owned by a world, indexed both ways.
#[derive(Default)]
pub(crate) struct BodyTable {
    records: BTreeMap<BodyId, BodyRecord>,
    by_handle: HashMap<BodyHandle, BodyId>,
    removals: Vec<BodyId>,
    next_id: u32,
}

impl BodyTable {
    pub(crate) fn insert(
        &mut self,
        solver: &mut dyn NativeSolver,
        materials: &MaterialRegistry,
        description: &BodyDescription,
    ) -> Result<BodyId> {
        let material = materials.handle(description.material)?;
        let handle = solver.create_body(&BodyDesc {
            shape: description.shape,
            mass: description.mass,
            position: description.position,
            orientation: description.orientation,
            velocity: description.velocity,
            angular_velocity: description.angular_velocity,
            material,
        })?;
        solver.set_force_callback(handle, true)?;

        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.records.insert(
            id,
            BodyRecord {
                handle,
                shape: description.shape,
                material: description.material,
                apply_gravity: description.apply_gravity,
                plane_override: description.plane_override,
                user_data: description.user_data,
                force_hook: None,
                removal_pending: false,
            },
        );
        self.by_handle.insert(handle, id);
        tracing::debug!(body = id.0, mass = description.mass, "added body");
        Ok(id)
    }

    pub(crate) fn get(&self, id: BodyId) -> Result<&BodyRecord> {
        self.records.get(&id).ok_or(PhysicsError::UnknownBody(id))
    }

    pub(crate) fn get_mut(&mut self, id: BodyId) -> Result<&mut BodyRecord> {
        self.records
            .get_mut(&id)
            .ok_or(PhysicsError::UnknownBody(id))
    }

    pub(crate) fn handle(&self, id: BodyId) -> Result<BodyHandle> {
        Ok(self.get(id)?.handle)
    }

    pub(crate) fn id_for(&self, handle: BodyHandle) -> Option<BodyId> {
        self.by_handle.get(&handle).copied()
    }

    /// Whether joints may be built on this body.
    pub(crate) fn is_ready(&self, id: BodyId) -> bool {
        self.records
            .get(&id)
            .is_some_and(|record| !record.removal_pending)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.records.keys().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Queues a body for disposal after the current update.
    pub(crate) fn queue_removal(&mut self, id: BodyId) -> Result<()> {
        let record = self.get_mut(id)?;
        if record.removal_pending {
            return Err(PhysicsError::BodyAlreadyRemoved(id));
        }
        record.removal_pending = true;
        self.removals.push(id);
        tracing::debug!(body = id.0, "queued body for removal");
        Ok(())
    }

    pub(crate) fn take_removals(&mut self) -> Vec<BodyId> {
        std::mem::take(&mut self.removals)
    }

    /// Puts ids a failed flush did not get to back in front of the queue.
    pub(crate) fn requeue_removals(&mut self, ids: &[BodyId]) {
        self.removals.splice(0..0, ids.iter().copied());
    }

    /// Drops the record of a body whose native side is gone.
    pub(crate) fn forget(&mut self, id: BodyId) -> Option<BodyRecord> {
        let record = self.records.remove(&id)?;
        self.by_handle.remove(&record.handle);
        Some(record)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.by_handle.clear();
        self.removals.clear();
    }

    pub(crate) fn snapshot(&self, solver: &dyn NativeSolver, id: BodyId) -> Result<Body> {
        let record = self.get(id)?;
        Ok(Body {
            id,
            state: solver.body_state(record.handle)?,
            shape: record.shape,
            material: record.material,
            apply_gravity: record.apply_gravity,
            plane_override: record.plane_override,
            user_data: record.user_data,
            removal_pending: record.removal_pending,
        })
    }
}

/// Write view over one body.
pub struct BodyMut<'w> {
    id: BodyId,
    record: &'w mut BodyRecord,
    solver: &'w mut dyn NativeSolver,
    materials: &'w MaterialRegistry,
}

impl<'w> BodyMut<'w> {
    pub(crate) fn new(
        id: BodyId,
        record: &'w mut BodyRecord,
        solver: &'w mut dyn NativeSolver,
        materials: &'w MaterialRegistry,
    ) -> Self {
        Self {
            id,
            record,
            solver,
            materials,
        }
    }

    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// # Errors
    ///
    /// Propagates native failures.
    pub fn state(&self) -> Result<BodyState> {
        Ok(self.solver.body_state(self.record.handle)?)
    }

    /// # Errors
    ///
    /// Propagates native failures.
    pub fn set_position(&mut self, position: Vec3) -> Result<()> {
        Ok(self.solver.set_position(self.record.handle, position)?)
    }

    /// # Errors
    ///
    /// Propagates native failures.
    pub fn set_orientation(&mut self, orientation: Quat) -> Result<()> {
        Ok(self.solver.set_orientation(self.record.handle, orientation)?)
    }

    /// # Errors
    ///
    /// Propagates native failures.
    pub fn set_velocity(&mut self, velocity: Vec3) -> Result<()> {
        Ok(self.solver.set_velocity(self.record.handle, velocity)?)
    }

    /// # Errors
    ///
    /// Propagates native failures.
    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) -> Result<()> {
        Ok(self
            .solver
            .set_angular_velocity(self.record.handle, angular_velocity)?)
    }

    /// # Errors
    ///
    /// Returns a solver error for negative or non-finite masses.
    pub fn set_mass(&mut self, mass: f32) -> Result<()> {
        Ok(self.solver.set_mass(self.record.handle, mass)?)
    }

    /// # Errors
    ///
    /// Returns [`PhysicsError::UnknownMaterial`] for unregistered materials.
    pub fn set_material(&mut self, material: MaterialId) -> Result<()> {
        let handle = self.materials.handle(material)?;
        self.solver.set_body_material(self.record.handle, handle)?;
        self.record.material = material;
        Ok(())
    }

    pub fn set_apply_gravity(&mut self, apply_gravity: bool) {
        self.record.apply_gravity = apply_gravity;
    }

    pub fn set_plane_override(&mut self, plane_override: PlaneOverride) {
        self.record.plane_override = plane_override;
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.record.user_data = user_data;
    }
}

/// What a [`ForceHook`] sees of its body during a native step.
pub struct ForceContext<'a> {
    body: BodyId,
    access: &'a mut dyn ForceAccess,
    bodies: &'a mut BodyTable,
}

impl<'a> ForceContext<'a> {
    pub(crate) fn new(body: BodyId, access: &'a mut dyn ForceAccess, bodies: &'a mut BodyTable) -> Self {
        Self {
            body,
            access,
            bodies,
        }
    }

    #[must_use]
    pub fn body(&self) -> BodyId {
        self.body
    }

    #[must_use]
    pub fn user_data(&self) -> u64 {
        self.bodies
            .get(self.body)
            .map_or(0, |record| record.user_data)
    }

    #[must_use]
    pub fn state(&self) -> BodyState {
        self.access.state()
    }

    #[must_use]
    pub fn timestep(&self) -> f32 {
        self.access.timestep()
    }

    /// Force accumulated so far this step, including gravity and corrections.
    #[must_use]
    pub fn force(&self) -> Vec3 {
        self.access.force()
    }

    #[must_use]
    pub fn torque(&self) -> Vec3 {
        self.access.torque()
    }

    pub fn add_force(&mut self, force: Vec3) {
        self.access.add_force(force);
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        self.access.add_torque(torque);
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.access.set_velocity(velocity);
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.access.set_angular_velocity(angular_velocity);
    }

    /// Queues `body` for disposal once the current update has finished
    /// stepping. The body stays fully readable until then.
    ///
    /// # Errors
    ///
    /// Fails for unknown bodies and bodies already queued.
    pub fn remove_body(&mut self, body: BodyId) -> Result<()> {
        self.bodies.queue_removal(body)
    }

    #[must_use]
    pub fn is_removal_pending(&self, body: BodyId) -> bool {
        self.bodies
            .get(body)
            .is_ok_and(|record| record.removal_pending)
    }
}

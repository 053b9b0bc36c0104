//! # Physics World
//!
//! [`PhysicsWorld`] owns the native solver and everything layered on top of
//! it: bodies, materials, collision hooks, joints and the collision
//! boundary. One call to [`PhysicsWorld::update`] turns elapsed wall-clock
//! time into bounded native sub-steps, runs the framework force pass and
//! user hooks inside each of them, and only then flushes deferred disposal
//! and notifies stepped listeners.

use glam::Vec3;
use solver::{NativeSolver, PairProperties, MAX_STEP_SECONDS};

use crate::body::{Body, BodyDescription, BodyMut, BodyTable, ForceContext};
use crate::boundary::CollisionBoundary;
use crate::clock::{Clock, RealtimeClock};
use crate::collision::{CollisionEventDispatcher, CollisionHook};
use crate::config::{clamp_frame_rate, validate_speed, BoundaryConfig, WorldConfig};
use crate::error::{PhysicsError, Result};
use crate::joint::{JointInfo, JointKind, JointMut, JointTable};
use crate::material::{MaterialDefinition, MaterialRegistry, NamedMaterial};
use crate::steps::callbacks::StepBridge;
use crate::steps::{plan_substeps, ForceEnvironment};
use crate::types::{
    BodyId, BoundaryEdges, HookId, JointId, MaterialId, RayFilter, RayHit, UpdateSummary,
    WorldStepped,
};

/// Listener notified after every update that stepped the world.
pub type SteppedListener = Box<dyn FnMut(&WorldStepped)>;

pub struct PhysicsWorld {
    solver: Option<Box<dyn NativeSolver>>,
    clock: Box<dyn Clock>,
    gravity: Vec3,
    simulation_speed: f32,
    force_2d: bool,
    paused: bool,
    /// Set for the duration of a step. Stays set if a hook panics.
    stepping: bool,
    frame: u64,
    boundary: Option<CollisionBoundary>,
    materials: MaterialRegistry,
    dispatcher: CollisionEventDispatcher,
    bodies: BodyTable,
    joints: JointTable,
    stepped: Vec<SteppedListener>,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &self.gravity)
            .field("simulation_speed", &self.simulation_speed)
            .field("force_2d", &self.force_2d)
            .field("paused", &self.paused)
            .field("frame", &self.frame)
            .field("bodies", &self.bodies.len())
            .field("disposed", &self.solver.is_none())
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// World on the default solver backend, driven by real time.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid.
    pub fn new(config: &WorldConfig) -> Result<Self> {
        Self::with_solver(config, solver::default_solver(), Box::new(RealtimeClock::new()))
    }

    /// Entry point for hosts that only need gravity and an optional boundary.
    ///
    /// # Errors
    ///
    /// Fails for non-finite gravity or an invalid boundary.
    pub fn create(gravity: Vec3, boundary: Option<(Vec3, Vec3)>) -> Result<Self> {
        Self::new(&WorldConfig {
            gravity,
            boundary: boundary.map(|(min, max)| BoundaryConfig { min, max }),
            ..WorldConfig::default()
        })
    }

    /// # Errors
    ///
    /// Fails when the configuration is invalid or the solver rejects the
    /// initial materials or boundary walls.
    pub fn with_solver(
        config: &WorldConfig,
        mut solver: Box<dyn NativeSolver>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        solver.set_min_frame_rate(clamp_frame_rate(config.min_frame_rate));

        let mut materials = MaterialRegistry::new(solver.as_mut())?;
        for material in &config.materials {
            materials.add_named(solver.as_mut(), material)?;
        }
        let boundary = config
            .boundary
            .map(|b| CollisionBoundary::build(solver.as_mut(), b.min, b.max))
            .transpose()?;

        tracing::debug!(
            gravity = %config.gravity,
            speed = config.simulation_speed,
            materials = materials.len(),
            boundary = boundary.is_some(),
            "created physics world"
        );
        Ok(Self {
            solver: Some(solver),
            clock,
            gravity: config.gravity,
            simulation_speed: config.simulation_speed,
            force_2d: config.force_2d,
            paused: config.start_paused,
            stepping: false,
            frame: 0,
            boundary,
            materials,
            dispatcher: CollisionEventDispatcher::new(),
            bodies: BodyTable::default(),
            joints: JointTable::default(),
            stepped: Vec::new(),
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.solver.is_none() {
            return Err(PhysicsError::Disposed);
        }
        if self.stepping {
            return Err(PhysicsError::ReentrantUpdate);
        }
        Ok(())
    }

    /// Read access to the native solver.
    ///
    /// # Errors
    ///
    /// Fails once the world is disposed.
    pub fn solver(&self) -> Result<&dyn NativeSolver> {
        self.solver.as_deref().ok_or(PhysicsError::Disposed)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.solver.is_none()
    }

    // ----------------------------------------------------------------------
    // Stepping
    // ----------------------------------------------------------------------

    /// Advances by the wall-clock time elapsed since the previous update.
    /// Does nothing while paused.
    ///
    /// # Errors
    ///
    /// Fails with [`PhysicsError::ReentrantUpdate`] on a poisoned world, with
    /// [`PhysicsError::Disposed`] after [`PhysicsWorld::dispose`], and with
    /// any error raised inside the step.
    pub fn update(&mut self) -> Result<UpdateSummary> {
        self.ensure_live()?;
        if self.paused {
            return Ok(UpdateSummary::idle(self.frame));
        }
        let elapsed = self.clock.elapsed_seconds();
        self.run(elapsed, true)
    }

    /// Same pipeline as [`PhysicsWorld::update`] with an explicit wall-clock
    /// duration. The clock is left alone.
    ///
    /// # Errors
    ///
    /// As [`PhysicsWorld::update`], plus
    /// [`PhysicsError::InvalidConfiguration`] for negative or non-finite
    /// durations.
    pub fn advance(&mut self, elapsed: f32) -> Result<UpdateSummary> {
        self.ensure_live()?;
        if !(elapsed.is_finite() && elapsed >= 0.0) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "elapsed time must be finite and non-negative, got {elapsed}"
            )));
        }
        if self.paused {
            return Ok(UpdateSummary::idle(self.frame));
        }
        self.run(elapsed, false)
    }

    fn run(&mut self, elapsed: f32, rearm_clock: bool) -> Result<UpdateSummary> {
        let scaled = elapsed * self.simulation_speed;
        let plan = plan_substeps(scaled, MAX_STEP_SECONDS);
        if plan.is_empty() && rearm_clock {
            self.clock.rearm();
        }

        self.stepping = true;
        let outcome = self.step_and_flush(&plan, rearm_clock);
        self.stepping = false;
        let disposed = outcome?;

        if !plan.is_empty() {
            self.frame += 1;
            let event = WorldStepped {
                elapsed: scaled,
                frame: self.frame,
                substeps: plan.len(),
            };
            for listener in &mut self.stepped {
                listener(&event);
            }
        }
        Ok(UpdateSummary {
            substeps: plan,
            elapsed: scaled,
            frame: self.frame,
            disposed,
        })
    }

    fn step_and_flush(&mut self, plan: &[f32], rearm_clock: bool) -> Result<usize> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        let environment = ForceEnvironment {
            gravity: self.gravity,
            boundary: self.boundary.as_ref().map(|b| (b.min(), b.max())),
            force_2d: self.force_2d,
        };

        for (index, &dt) in plan.iter().enumerate() {
            if rearm_clock && index + 1 == plan.len() {
                self.clock.rearm();
            }
            tracing::trace!(substep = index, dt, "native step");
            let mut bridge = StepBridge {
                environment,
                bodies: &mut self.bodies,
                materials: &self.materials,
                dispatcher: &mut self.dispatcher,
                joints: &mut self.joints,
                fatal: None,
            };
            let result = solver.step(dt, &mut bridge);
            let fatal = bridge.into_fatal();
            self.dispatcher.end_step();
            if let Err(err) = result {
                return Err(fatal.unwrap_or(PhysicsError::Solver(err)));
            }
        }

        let broken = self.joints.apply_breaks(solver)?;
        let removals = self.bodies.take_removals();
        let mut disposed = 0;
        for (index, &id) in removals.iter().enumerate() {
            match dispose_body(&mut self.bodies, &mut self.joints, solver, id) {
                Ok(true) => disposed += 1,
                Ok(false) => {}
                Err(err) => {
                    self.bodies.requeue_removals(&removals[index..]);
                    return Err(err);
                }
            }
        }
        let pruned = self.joints.prune();
        if broken > 0 || disposed > 0 {
            tracing::debug!(broken, disposed, pruned, "flushed deferred disposal");
        }
        Ok(disposed)
    }

    /// Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            tracing::debug!(frame = self.frame, "paused");
        }
    }

    /// Idempotent. Resets the clock so the pause is not reported as elapsed time.
    pub fn unpause(&mut self) {
        if self.paused {
            self.paused = false;
            self.clock.rearm();
            tracing::debug!(frame = self.frame, "unpaused");
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of updates that stepped the world.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// # Errors
    ///
    /// Rejects non-positive or non-finite speeds.
    pub fn set_simulation_speed(&mut self, speed: f32) -> Result<()> {
        validate_speed(speed)?;
        self.simulation_speed = speed;
        Ok(())
    }

    #[must_use]
    pub fn simulation_speed(&self) -> f32 {
        self.simulation_speed
    }

    /// Clamps `fps` into the solver's supported range and returns the value used.
    ///
    /// # Errors
    ///
    /// Fails once the world is disposed.
    pub fn set_min_frame_rate(&mut self, fps: f32) -> Result<f32> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        let clamped = clamp_frame_rate(fps);
        solver.set_min_frame_rate(clamped);
        Ok(clamped)
    }

    /// # Errors
    ///
    /// Fails once the world is disposed.
    pub fn min_frame_rate(&self) -> Result<f32> {
        Ok(self.solver()?.min_frame_rate())
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    #[must_use]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_force_2d(&mut self, force_2d: bool) {
        self.force_2d = force_2d;
    }

    #[must_use]
    pub fn force_2d(&self) -> bool {
        self.force_2d
    }

    pub fn on_stepped(&mut self, listener: impl FnMut(&WorldStepped) + 'static) {
        self.stepped.push(Box::new(listener));
    }

    // ----------------------------------------------------------------------
    // Bodies
    // ----------------------------------------------------------------------

    /// # Errors
    ///
    /// Fails for unknown materials or shapes and masses the solver rejects.
    pub fn add_body(&mut self, description: &BodyDescription) -> Result<BodyId> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        self.bodies.insert(solver, &self.materials, description)
    }

    /// Queues a body for disposal. The native body lives until the end of the
    /// next update that is not paused, and stays readable until then.
    ///
    /// # Errors
    ///
    /// Fails for unknown bodies and bodies already queued.
    pub fn remove_body(&mut self, id: BodyId) -> Result<()> {
        if self.solver.is_none() {
            return Err(PhysicsError::Disposed);
        }
        self.bodies.queue_removal(id)
    }

    /// # Errors
    ///
    /// Fails for unknown bodies.
    pub fn is_removal_pending(&self, id: BodyId) -> Result<bool> {
        Ok(self.bodies.get(id)?.removal_pending)
    }

    /// # Errors
    ///
    /// Fails for unknown bodies.
    pub fn body(&self, id: BodyId) -> Result<Body> {
        self.bodies.snapshot(self.solver()?, id)
    }

    /// # Errors
    ///
    /// Fails for unknown bodies.
    pub fn body_mut(&mut self, id: BodyId) -> Result<BodyMut<'_>> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        let record = self.bodies.get_mut(id)?;
        Ok(BodyMut::new(id, record, solver, &self.materials))
    }

    #[must_use]
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.ids().collect()
    }

    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Installs the body's force hook, replacing any previous one. The hook
    /// runs once per native step after gravity, boundary and plane forces.
    ///
    /// # Errors
    ///
    /// Fails for unknown bodies.
    pub fn on_apply_force(
        &mut self,
        id: BodyId,
        hook: impl FnMut(&mut ForceContext<'_>) + 'static,
    ) -> Result<()> {
        self.bodies.get_mut(id)?.force_hook = Some(Box::new(hook));
        Ok(())
    }

    /// # Errors
    ///
    /// Fails for unknown bodies.
    pub fn clear_force_hook(&mut self, id: BodyId) -> Result<()> {
        self.bodies.get_mut(id)?.force_hook = None;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Materials and collision hooks
    // ----------------------------------------------------------------------

    #[must_use]
    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    /// # Errors
    ///
    /// Fails for invalid definitions.
    pub fn add_material(&mut self, definition: MaterialDefinition) -> Result<MaterialId> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        self.materials.add_material(solver, definition)
    }

    /// # Errors
    ///
    /// Fails for invalid definitions and duplicate names.
    pub fn add_named_material(&mut self, material: &NamedMaterial) -> Result<MaterialId> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        self.materials.add_named(solver, material)
    }

    #[must_use]
    pub fn material_named(&self, name: &str) -> Option<MaterialId> {
        self.materials.named(name)
    }

    /// # Errors
    ///
    /// Fails for unknown materials.
    pub fn material_pair(&self, a: MaterialId, b: MaterialId) -> Result<PairProperties> {
        self.materials.pair(self.solver()?, a, b)
    }

    /// # Errors
    ///
    /// Fails for unknown materials.
    pub fn set_material_collidable(&mut self, a: MaterialId, b: MaterialId, collidable: bool) -> Result<()> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        self.materials.set_collidable(solver, a, b, collidable)
    }

    /// Subscribes `hook` to contacts between materials `a` and `b`.
    ///
    /// # Errors
    ///
    /// Fails for unknown materials.
    pub fn register_collision_hook(
        &mut self,
        a: MaterialId,
        b: MaterialId,
        hook: CollisionHook,
    ) -> Result<HookId> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        let (ha, hb) = (self.materials.handle(a)?, self.materials.handle(b)?);
        let (id, first) = self.dispatcher.register(a, b, hook);
        if first {
            if let Err(err) = solver.set_pair_callback(ha, hb, true) {
                self.dispatcher.remove(id)?;
                return Err(err.into());
            }
        }
        Ok(id)
    }

    /// # Errors
    ///
    /// Fails for hooks that are not registered.
    pub fn remove_collision_hook(&mut self, id: HookId) -> Result<()> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        let (key, now_empty) = self.dispatcher.remove(id)?;
        if now_empty {
            let (ha, hb) = (self.materials.handle(key.0)?, self.materials.handle(key.1)?);
            solver.set_pair_callback(ha, hb, false)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn collision_hook_count(&self, a: MaterialId, b: MaterialId) -> usize {
        self.dispatcher.subscriber_count(a, b)
    }

    // ----------------------------------------------------------------------
    // Boundary
    // ----------------------------------------------------------------------

    /// Replaces the collision boundary and returns its edges.
    ///
    /// # Errors
    ///
    /// Fails unless `min < max` on every axis.
    pub fn set_collision_boundary(&mut self, min: Vec3, max: Vec3) -> Result<BoundaryEdges> {
        BoundaryConfig { min, max }.validate()?;
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        if let Some(previous) = self.boundary.take() {
            previous.tear_down(solver)?;
        }
        let boundary = CollisionBoundary::build(solver, min, max)?;
        let edges = boundary.edges();
        self.boundary = Some(boundary);
        Ok(edges)
    }

    /// # Errors
    ///
    /// Fails once the world is disposed.
    pub fn clear_collision_boundary(&mut self) -> Result<()> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        if let Some(previous) = self.boundary.take() {
            previous.tear_down(solver)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn collision_boundary(&self) -> Option<&CollisionBoundary> {
        self.boundary.as_ref()
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    /// Nearest body hit within `length` of `origin` along `direction`.
    /// Boundary walls are never reported.
    ///
    /// # Errors
    ///
    /// Fails once the world is disposed.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        length: f32,
        filter: RayFilter<'_>,
    ) -> Result<Option<RayHit>> {
        let solver = self.solver()?;
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO || !(length.is_finite() && length > 0.0) {
            return Ok(None);
        }
        let bodies = &self.bodies;
        let hit = solver.ray_cast(origin, origin + direction * length, &mut |handle| {
            bodies.id_for(handle).is_some_and(|id| filter.accepts(id))
        });
        Ok(hit.and_then(|hit| {
            Some(RayHit {
                body: bodies.id_for(hit.body)?,
                distance: hit.fraction * length,
                normal: hit.normal,
                fraction: hit.fraction,
            })
        }))
    }

    // ----------------------------------------------------------------------
    // Joints
    // ----------------------------------------------------------------------

    /// Creates an unbound joint. See [`PhysicsWorld::initialise_joint`].
    ///
    /// # Errors
    ///
    /// Fails once the world is disposed.
    pub fn create_joint(&mut self, kind: JointKind) -> Result<JointId> {
        if self.solver.is_none() {
            return Err(PhysicsError::Disposed);
        }
        Ok(self.joints.create(kind))
    }

    /// # Errors
    ///
    /// See [`JointMut::initialise`].
    pub fn initialise_joint(&mut self, id: JointId, parent: BodyId, child: BodyId) -> Result<()> {
        self.joint_mut(id)?.initialise(parent, child)
    }

    /// Creates and initialises a joint in one go. A joint that fails to
    /// initialise is disposed.
    ///
    /// # Errors
    ///
    /// See [`JointMut::initialise`].
    pub fn connect(&mut self, kind: JointKind, parent: BodyId, child: BodyId) -> Result<JointId> {
        let id = self.create_joint(kind)?;
        let mut joint = self.joint_mut(id)?;
        if let Err(err) = joint.initialise(parent, child) {
            joint.dispose()?;
            return Err(err);
        }
        Ok(id)
    }

    /// Disposed joints keep reporting [`crate::JointState::Disposed`] until the next
    /// step flushes them; after that the id yields
    /// [`PhysicsError::JointDisposed`].
    ///
    /// # Errors
    ///
    /// Fails for unknown or flushed joints.
    pub fn joint(&self, id: JointId) -> Result<JointInfo> {
        self.joints.info(id)
    }

    /// # Errors
    ///
    /// Fails for unknown joints or once the world is disposed.
    pub fn joint_mut(&mut self, id: JointId) -> Result<JointMut<'_>> {
        let solver = self.solver.as_deref_mut().ok_or(PhysicsError::Disposed)?;
        self.joints.joint_mut(id, solver, &self.bodies)
    }

    #[must_use]
    pub fn joint_ids(&self) -> Vec<JointId> {
        self.joints.ids().collect()
    }

    /// # Errors
    ///
    /// See [`JointMut::rebuild`].
    pub fn rebuild_joint(&mut self, id: JointId) -> Result<()> {
        self.joint_mut(id)?.rebuild()
    }

    /// # Errors
    ///
    /// See [`JointMut::dispose`].
    pub fn dispose_joint(&mut self, id: JointId) -> Result<()> {
        self.joint_mut(id)?.dispose()
    }

    // ----------------------------------------------------------------------
    // Teardown
    // ----------------------------------------------------------------------

    /// Tears down the native world. Every later call fails with
    /// [`PhysicsError::Disposed`].
    ///
    /// # Errors
    ///
    /// Fails when already disposed or while a step is in flight.
    pub fn dispose(&mut self) -> Result<()> {
        self.ensure_live()?;
        if let (Some(boundary), Some(solver)) = (self.boundary.take(), self.solver.as_deref_mut()) {
            boundary.tear_down(solver)?;
        }
        self.joints.clear();
        self.bodies.clear();
        self.dispatcher.clear();
        self.stepped.clear();
        self.solver = None;
        tracing::debug!(frame = self.frame, "disposed physics world");
        Ok(())
    }
}

/// Disposes one queued body and its joints. Returns whether a body was
/// actually destroyed; ids whose record is already gone are skipped.
fn dispose_body(
    bodies: &mut BodyTable,
    joints: &mut JointTable,
    solver: &mut dyn NativeSolver,
    id: BodyId,
) -> Result<bool> {
    joints.dispose_attached(id, solver)?;
    let Some(record) = bodies.forget(id) else {
        return Ok(false);
    };
    solver.destroy_body(record.handle)?;
    tracing::debug!(body = id.0, "disposed body");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use solver::ReferenceSolver;

    fn world(config: &WorldConfig) -> (PhysicsWorld, crate::clock::ClockHandle) {
        let (clock, handle) = ManualClock::new();
        let world =
            PhysicsWorld::with_solver(config, Box::new(ReferenceSolver::new()), Box::new(clock)).unwrap();
        (world, handle)
    }

    #[test]
    fn starts_paused_and_ignores_clock() {
        let (mut world, clock) = world(&WorldConfig::default());
        clock.advance(0.5);
        let summary = world.update().unwrap();
        assert!(summary.is_idle());
        assert_eq!(world.frame(), 0);
    }

    #[test]
    fn unpause_discards_paused_time() {
        let (mut world, clock) = world(&WorldConfig::default());
        clock.advance(5.0);
        world.unpause();
        clock.advance(0.1);
        let summary = world.update().unwrap();
        assert_eq!(summary.substeps.len(), 2);
        assert!((summary.elapsed - 0.1).abs() < 1e-5);
        assert_eq!(clock.pending(), 0.0);
    }

    #[test]
    fn speed_scales_elapsed_time() {
        let (mut world, _clock) = world(&WorldConfig::default());
        world.unpause();
        world.set_simulation_speed(2.0).unwrap();
        let summary = world.advance(0.05).unwrap();
        assert_eq!(summary.substeps.len(), 2);
        assert!(world.set_simulation_speed(0.0).is_err());
    }

    #[test]
    fn frame_rate_is_clamped() {
        let (mut world, _clock) = world(&WorldConfig::default());
        assert!((world.set_min_frame_rate(10.0).unwrap() - 60.0).abs() < f32::EPSILON);
        assert!((world.set_min_frame_rate(5000.0).unwrap() - 1000.0).abs() < f32::EPSILON);
        assert!((world.min_frame_rate().unwrap() - 1000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn failed_flush_keeps_the_rest_of_the_queue() {
        let (mut world, _clock) = world(&WorldConfig::default());
        world.unpause();
        let broken = world.add_body(&BodyDescription::sphere(0.5)).unwrap();
        let healthy = world
            .add_body(&BodyDescription::sphere(0.5).at(Vec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        // Destroy the native side behind the world's back so its flush fails.
        let handle = world.bodies.get(broken).unwrap().handle;
        world.solver.as_deref_mut().unwrap().destroy_body(handle).unwrap();
        world.remove_body(broken).unwrap();
        world.remove_body(healthy).unwrap();

        assert!(matches!(world.advance(0.01), Err(PhysicsError::Solver(_))));
        assert!(world.is_removal_pending(healthy).unwrap());

        let summary = world.advance(0.01).unwrap();
        assert_eq!(summary.disposed, 1);
        assert_eq!(world.body(healthy), Err(PhysicsError::UnknownBody(healthy)));
        assert_eq!(world.solver().unwrap().body_count(), 0);
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn dispose_twice_fails() {
        let (mut world, _clock) = world(&WorldConfig {
            boundary: Some(BoundaryConfig {
                min: Vec3::splat(-5.0),
                max: Vec3::splat(5.0),
            }),
            ..WorldConfig::default()
        });
        world.dispose().unwrap();
        assert_eq!(world.dispose(), Err(PhysicsError::Disposed));
        assert_eq!(world.update().unwrap_err(), PhysicsError::Disposed);
        assert!(world.add_body(&BodyDescription::sphere(1.0)).is_err());
    }
}

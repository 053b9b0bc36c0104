//! # Joints
//!
//! Lifecycle of constraints between two bodies. A joint is created
//! unbound, initialised once both of its bodies exist, and rebuilt in place
//! whenever a property that defines its native geometry changes. Property
//! changes made inside a `begin_update`/`end_update` scope are coalesced
//! into a single rebuild when the outermost scope closes.

mod bilateral;
mod hinge;

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use solver::{BilateralAccess, BodyHandle, HingeAccess, JointDesc, JointHandle, NativeSolver};

use crate::body::BodyTable;
use crate::error::{PhysicsError, Result};
use crate::types::{BodyId, JointId};

pub use bilateral::{BreakStrategy, ConstraintRow, RowSpec, UserBilateralConstraint};
pub use hinge::{wrap_angle, HingeSettings};

use hinge::AngleTracker;

/// Joint geometry. Pivots and axes are world-space at build time.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    BallSocket {
        pivot: Vec3,
    },
    Hinge {
        pivot: Vec3,
        axis: Vec3,
        settings: HingeSettings,
    },
    Slider {
        pivot: Vec3,
        axis: Vec3,
    },
    Corkscrew {
        pivot: Vec3,
        axis: Vec3,
    },
    Universal {
        pivot: Vec3,
        axis_a: Vec3,
        axis_b: Vec3,
    },
    UserBilateral(UserBilateralConstraint),
}

impl JointKind {
    #[must_use]
    pub fn hinge(pivot: Vec3, axis: Vec3) -> Self {
        JointKind::Hinge {
            pivot,
            axis,
            settings: HingeSettings::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JointKind::BallSocket { .. } => "ball-socket",
            JointKind::Hinge { .. } => "hinge",
            JointKind::Slider { .. } => "slider",
            JointKind::Corkscrew { .. } => "corkscrew",
            JointKind::Universal { .. } => "universal",
            JointKind::UserBilateral(_) => "user-bilateral",
        }
    }

    fn native_desc(&self, parent: BodyHandle, child: BodyHandle) -> JointDesc {
        match *self {
            JointKind::BallSocket { pivot } => JointDesc::BallSocket {
                parent,
                child,
                pivot,
            },
            JointKind::Hinge { pivot, axis, .. } => JointDesc::Hinge {
                parent,
                child,
                pivot,
                axis,
            },
            JointKind::Slider { pivot, axis } => JointDesc::Slider {
                parent,
                child,
                pivot,
                axis,
            },
            JointKind::Corkscrew { pivot, axis } => JointDesc::Corkscrew {
                parent,
                child,
                pivot,
                axis,
            },
            JointKind::Universal {
                pivot,
                axis_a,
                axis_b,
            } => JointDesc::Universal {
                parent,
                child,
                pivot,
                axis_a,
                axis_b,
            },
            JointKind::UserBilateral(ref constraint) => JointDesc::UserBilateral {
                parent,
                child,
                max_dof: constraint.max_dof(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointState {
    Uninitialized,
    Initializing,
    Initialized,
    Disposed,
}

/// Snapshot of a joint.
#[derive(Debug, Clone, PartialEq)]
pub struct JointInfo {
    pub id: JointId,
    pub kind: &'static str,
    pub state: JointState,
    pub parent: Option<BodyId>,
    pub child: Option<BodyId>,
    /// Native rebuilds after the initial build.
    pub rebuild_count: u32,
    pub pending_rebuild: bool,
    pub update_depth: u32,
    /// A break threshold was exceeded.
    pub broken: bool,
    pub collision: bool,
    pub stiffness: Option<f32>,
    /// Accumulated hinge angle, for hinges.
    pub hinge_angle: Option<f32>,
}

pub(crate) struct JointRecord {
    kind: JointKind,
    parent: Option<BodyId>,
    child: Option<BodyId>,
    native: Option<JointHandle>,
    state: JointState,
    collision: bool,
    stiffness: Option<f32>,
    update_depth: u32,
    pending_rebuild: bool,
    rebuild_count: u32,
    broken: bool,
    tracker: AngleTracker,
}

impl JointRecord {
    fn new(kind: JointKind) -> Self {
        Self {
            kind,
            parent: None,
            child: None,
            native: None,
            state: JointState::Uninitialized,
            collision: false,
            stiffness: None,
            update_depth: 0,
            pending_rebuild: false,
            rebuild_count: 0,
            broken: false,
            tracker: AngleTracker::default(),
        }
    }

    fn attached_to(&self, body: BodyId) -> bool {
        self.parent == Some(body) || self.child == Some(body)
    }
}

#[derive(Default)]
pub(crate) struct JointTable {
    records: BTreeMap<JointId, JointRecord>,
    by_handle: HashMap<JointHandle, JointId>,
    pending_breaks: Vec<JointId>,
    next_id: u32,
}

impl JointTable {
    pub(crate) fn create(&mut self, kind: JointKind) -> JointId {
        let id = JointId(self.next_id);
        self.next_id += 1;
        tracing::debug!(joint = id.0, kind = kind.name(), "created joint");
        self.records.insert(id, JointRecord::new(kind));
        id
    }

    fn get(&self, id: JointId) -> Result<&JointRecord> {
        self.records.get(&id).ok_or_else(|| self.missing(id))
    }

    /// Ids are never reused, so an issued id without a record was disposed
    /// and pruned.
    fn missing(&self, id: JointId) -> PhysicsError {
        if id.0 < self.next_id {
            PhysicsError::JointDisposed(id)
        } else {
            PhysicsError::UnknownJoint(id)
        }
    }

    /// Drops the records of disposed joints. Returns how many went.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.state != JointState::Disposed);
        let pruned = before - self.records.len();
        if pruned > 0 {
            tracing::trace!(pruned, "pruned disposed joints");
        }
        pruned
    }

    pub(crate) fn joint_mut<'w>(
        &'w mut self,
        id: JointId,
        solver: &'w mut dyn NativeSolver,
        bodies: &'w BodyTable,
    ) -> Result<JointMut<'w>> {
        let missing = self.missing(id);
        let record = self.records.get_mut(&id).ok_or(missing)?;
        Ok(JointMut {
            id,
            record,
            by_handle: &mut self.by_handle,
            solver,
            bodies,
        })
    }

    pub(crate) fn info(&self, id: JointId) -> Result<JointInfo> {
        let record = self.get(id)?;
        Ok(JointInfo {
            id,
            kind: record.kind.name(),
            state: record.state,
            parent: record.parent,
            child: record.child,
            rebuild_count: record.rebuild_count,
            pending_rebuild: record.pending_rebuild,
            update_depth: record.update_depth,
            broken: record.broken,
            collision: record.collision,
            stiffness: record.stiffness,
            hinge_angle: matches!(record.kind, JointKind::Hinge { .. }).then(|| record.tracker.angle()),
        })
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = JointId> + '_ {
        self.records.keys().copied()
    }

    /// Per-step hinge callback.
    pub(crate) fn hinge_step(&mut self, handle: JointHandle, access: &mut dyn HingeAccess) {
        let Some(record) = self
            .by_handle
            .get(&handle)
            .and_then(|id| self.records.get_mut(id))
        else {
            return;
        };
        let stiffness = record.stiffness.unwrap_or(1.0);
        if let JointKind::Hinge { settings, .. } = &record.kind {
            hinge::hinge_step(settings, &mut record.tracker, stiffness, access);
        }
    }

    /// Per-step user constraint callback. Breaks are only recorded here and
    /// applied by [`JointTable::apply_breaks`] after the step.
    pub(crate) fn bilateral_step(&mut self, handle: JointHandle, access: &mut dyn BilateralAccess) {
        let Some(&id) = self.by_handle.get(&handle) else {
            return;
        };
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        if let JointKind::UserBilateral(constraint) = &record.kind {
            if constraint.submit(access) && !record.broken {
                record.broken = true;
                self.pending_breaks.push(id);
                tracing::debug!(joint = id.0, "user constraint exceeded its force limit");
            }
        }
    }

    pub(crate) fn apply_breaks(&mut self, solver: &mut dyn NativeSolver) -> Result<usize> {
        let breaks = std::mem::take(&mut self.pending_breaks);
        let mut applied = 0;
        for id in breaks {
            let Some(record) = self.records.get_mut(&id) else {
                continue;
            };
            let (JointState::Initialized, Some(handle)) = (record.state, record.native) else {
                continue;
            };
            let JointKind::UserBilateral(constraint) = &record.kind else {
                continue;
            };
            match constraint.break_strategy {
                BreakStrategy::DisableAndCollidable => {
                    solver.set_joint_enabled(handle, false)?;
                    solver.set_joint_collision(handle, true)?;
                    record.collision = true;
                }
                BreakStrategy::DisableOnly => solver.set_joint_enabled(handle, false)?,
                BreakStrategy::Dispose => {
                    solver.destroy_joint(handle)?;
                    self.by_handle.remove(&handle);
                    record.native = None;
                    record.state = JointState::Disposed;
                }
            }
            applied += 1;
            tracing::debug!(joint = id.0, strategy = ?constraint.break_strategy, "joint broke");
        }
        Ok(applied)
    }

    /// Disposes every built joint attached to `body`. Must run before the
    /// body itself is destroyed.
    pub(crate) fn dispose_attached(&mut self, body: BodyId, solver: &mut dyn NativeSolver) -> Result<usize> {
        let mut disposed = 0;
        for (id, record) in &mut self.records {
            if record.state == JointState::Disposed || !record.attached_to(body) {
                continue;
            }
            if let Some(handle) = record.native.take() {
                solver.destroy_joint(handle)?;
                self.by_handle.remove(&handle);
            }
            record.state = JointState::Disposed;
            disposed += 1;
            tracing::debug!(joint = id.0, body = body.0, "disposed joint with its body");
        }
        Ok(disposed)
    }

    pub(crate) fn clear(&mut self) {
        for record in self.records.values_mut() {
            record.native = None;
            record.state = JointState::Disposed;
        }
        self.by_handle.clear();
        self.pending_breaks.clear();
    }
}

/// Write access to one joint.
pub struct JointMut<'w> {
    id: JointId,
    record: &'w mut JointRecord,
    by_handle: &'w mut HashMap<JointHandle, JointId>,
    solver: &'w mut dyn NativeSolver,
    bodies: &'w BodyTable,
}

impl JointMut<'_> {
    #[must_use]
    pub fn id(&self) -> JointId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> JointState {
        self.record.state
    }

    #[must_use]
    pub fn kind(&self) -> &JointKind {
        &self.record.kind
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.record.state == JointState::Disposed {
            Err(PhysicsError::JointDisposed(self.id))
        } else {
            Ok(())
        }
    }

    /// Binds the joint to its bodies and builds it. Re-initialising with the
    /// same bodies is a no-op.
    ///
    /// # Errors
    ///
    /// Fails with [`PhysicsError::JointPrecondition`] when either body is
    /// missing or queued for removal, with
    /// [`PhysicsError::JointAlreadyInitialised`] for different bodies, and
    /// with any error from building the native joint.
    pub fn initialise(&mut self, parent: BodyId, child: BodyId) -> Result<()> {
        self.ensure_not_disposed()?;
        match self.record.state {
            JointState::Initialized | JointState::Initializing => {
                if self.record.parent == Some(parent) && self.record.child == Some(child) {
                    return Ok(());
                }
                return Err(PhysicsError::JointAlreadyInitialised(self.id));
            }
            JointState::Uninitialized | JointState::Disposed => {}
        }
        if parent == child {
            return Err(PhysicsError::JointPrecondition {
                joint: self.id,
                reason: "parent and child must be different bodies",
            });
        }
        self.ensure_ready(parent, child)?;

        self.record.parent = Some(parent);
        self.record.child = Some(child);
        self.record.state = JointState::Initializing;
        if let Err(err) = self.build() {
            self.record.parent = None;
            self.record.child = None;
            self.record.state = JointState::Uninitialized;
            return Err(err);
        }
        self.record.state = JointState::Initialized;
        tracing::debug!(
            joint = self.id.0,
            parent = parent.0,
            child = child.0,
            "initialised joint"
        );
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let (Some(parent), Some(child)) = (self.record.parent, self.record.child) else {
            return Err(PhysicsError::JointPrecondition {
                joint: self.id,
                reason: "joint has no bodies",
            });
        };
        let parent = self.bodies.handle(parent)?;
        let child = self.bodies.handle(child)?;

        if let JointKind::UserBilateral(constraint) = &mut self.record.kind {
            constraint.check()?;
            let parent_state = self.solver.body_state(parent)?;
            let child_state = self.solver.body_state(child)?;
            constraint.capture_rest(&parent_state, &child_state);
        }

        let handle = self
            .solver
            .create_joint(&self.record.kind.native_desc(parent, child))?;
        self.solver.set_joint_collision(handle, self.record.collision)?;
        if let Some(stiffness) = self.record.stiffness {
            self.solver.set_joint_stiffness(handle, stiffness)?;
        }
        if matches!(self.record.kind, JointKind::Hinge { .. }) {
            self.solver.set_hinge_callback(handle, true)?;
            self.record.tracker.rebase();
        }
        self.record.native = Some(handle);
        self.record.broken = false;
        self.by_handle.insert(handle, self.id);
        Ok(())
    }

    fn ensure_ready(&self, parent: BodyId, child: BodyId) -> Result<()> {
        if self.bodies.is_ready(parent) && self.bodies.is_ready(child) {
            Ok(())
        } else {
            Err(PhysicsError::JointPrecondition {
                joint: self.id,
                reason: "parent and child bodies must be initialised",
            })
        }
    }

    /// Replaces the native joint. A body queued for removal blocks the
    /// rebuild and leaves the current native joint in place.
    fn rebuild_now(&mut self) -> Result<()> {
        if let (Some(parent), Some(child)) = (self.record.parent, self.record.child) {
            self.ensure_ready(parent, child)?;
        }
        if let Some(handle) = self.record.native.take() {
            self.solver.destroy_joint(handle)?;
            self.by_handle.remove(&handle);
        }
        self.record.pending_rebuild = false;
        if let Err(err) = self.build() {
            // Bodies stay bound; initialise again once the cause is fixed.
            self.record.state = JointState::Uninitialized;
            return Err(err);
        }
        self.record.rebuild_count += 1;
        tracing::debug!(joint = self.id.0, rebuilds = self.record.rebuild_count, "rebuilt joint");
        Ok(())
    }

    /// Recreates the native joint, or defers it while an update scope is open.
    ///
    /// # Errors
    ///
    /// Fails for disposed joints or when the native joint cannot be rebuilt.
    pub fn rebuild(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.record.state != JointState::Initialized {
            return Ok(());
        }
        if self.record.update_depth > 0 {
            self.record.pending_rebuild = true;
            return Ok(());
        }
        self.rebuild_now()
    }

    pub fn begin_update(&mut self) {
        self.record.update_depth += 1;
    }

    /// Closes an update scope; the outermost close performs any deferred rebuild.
    ///
    /// # Errors
    ///
    /// Fails with [`PhysicsError::UnbalancedUpdate`] without an open scope,
    /// or when the deferred rebuild fails.
    pub fn end_update(&mut self) -> Result<()> {
        if self.record.update_depth == 0 {
            return Err(PhysicsError::UnbalancedUpdate(self.id));
        }
        self.record.update_depth -= 1;
        if self.record.update_depth == 0
            && self.record.pending_rebuild
            && self.record.state == JointState::Initialized
        {
            self.rebuild_now()?;
        }
        Ok(())
    }

    fn invalid(message: &str) -> PhysicsError {
        PhysicsError::InvalidConfiguration(message.to_string())
    }

    /// # Errors
    ///
    /// Fails for user constraints, whose rows carry their own pivots.
    pub fn set_pivot(&mut self, new_pivot: Vec3) -> Result<()> {
        self.ensure_not_disposed()?;
        match &mut self.record.kind {
            JointKind::BallSocket { pivot }
            | JointKind::Hinge { pivot, .. }
            | JointKind::Slider { pivot, .. }
            | JointKind::Corkscrew { pivot, .. }
            | JointKind::Universal { pivot, .. } => *pivot = new_pivot,
            JointKind::UserBilateral(_) => {
                return Err(Self::invalid("user constraints have no single pivot"))
            }
        }
        self.rebuild()
    }

    /// Sets the primary axis.
    ///
    /// # Errors
    ///
    /// Fails for joints without an axis and for a zero axis.
    pub fn set_axis(&mut self, new_axis: Vec3) -> Result<()> {
        self.ensure_not_disposed()?;
        if new_axis.length_squared() <= f32::EPSILON {
            return Err(Self::invalid("joint axis must be non-zero"));
        }
        match &mut self.record.kind {
            JointKind::Hinge { axis, .. }
            | JointKind::Slider { axis, .. }
            | JointKind::Corkscrew { axis, .. }
            | JointKind::Universal { axis_a: axis, .. } => *axis = new_axis,
            JointKind::BallSocket { .. } | JointKind::UserBilateral(_) => {
                return Err(Self::invalid("joint has no axis"))
            }
        }
        self.rebuild()
    }

    /// Sets the second axis of a universal joint.
    ///
    /// # Errors
    ///
    /// Fails for other joint kinds and for a zero axis.
    pub fn set_secondary_axis(&mut self, new_axis: Vec3) -> Result<()> {
        self.ensure_not_disposed()?;
        if new_axis.length_squared() <= f32::EPSILON {
            return Err(Self::invalid("joint axis must be non-zero"));
        }
        match &mut self.record.kind {
            JointKind::Universal { axis_b, .. } => *axis_b = new_axis,
            _ => return Err(Self::invalid("only universal joints have a secondary axis")),
        }
        self.rebuild()
    }

    /// # Errors
    ///
    /// Fails for non-hinge joints and for `min > max`.
    pub fn set_hinge_limits(&mut self, limits: Option<(f32, f32)>) -> Result<()> {
        self.ensure_not_disposed()?;
        if let Some((min, max)) = limits {
            if min.is_nan() || max.is_nan() || min > max {
                return Err(Self::invalid("hinge limits must satisfy min <= max"));
            }
        }
        match &mut self.record.kind {
            JointKind::Hinge { settings, .. } => settings.limits = limits,
            _ => return Err(Self::invalid("only hinges have angle limits")),
        }
        self.rebuild()
    }

    /// Drives the hinge towards `target` every step. Takes effect without a
    /// rebuild.
    ///
    /// # Errors
    ///
    /// Fails for non-hinge joints.
    pub fn set_hinge_target(&mut self, target: Option<f32>) -> Result<()> {
        self.ensure_not_disposed()?;
        match &mut self.record.kind {
            JointKind::Hinge { settings, .. } => {
                settings.target = target;
                Ok(())
            }
            _ => Err(Self::invalid("only hinges have a target angle")),
        }
    }

    /// Whether the two jointed bodies collide with each other.
    ///
    /// # Errors
    ///
    /// Propagates native failures.
    pub fn set_collision_state(&mut self, collide: bool) -> Result<()> {
        self.ensure_not_disposed()?;
        self.record.collision = collide;
        if let Some(handle) = self.record.native {
            self.solver.set_joint_collision(handle, collide)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects stiffness outside `[0, 1]` before any native call.
    pub fn set_stiffness(&mut self, stiffness: f32) -> Result<()> {
        self.ensure_not_disposed()?;
        if !(0.0..=1.0).contains(&stiffness) {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "joint stiffness must be within [0, 1], got {stiffness}"
            )));
        }
        self.record.stiffness = Some(stiffness);
        if let Some(handle) = self.record.native {
            self.solver.set_joint_stiffness(handle, stiffness)?;
        }
        Ok(())
    }

    fn constraint_mut(&mut self) -> Result<&mut UserBilateralConstraint> {
        match &mut self.record.kind {
            JointKind::UserBilateral(constraint) => Ok(constraint),
            _ => Err(Self::invalid("only user constraints have rows")),
        }
    }

    /// # Errors
    ///
    /// Fails for other joint kinds, or when the resulting rebuild fails.
    pub fn add_row(&mut self, row: impl Into<RowSpec>) -> Result<()> {
        self.ensure_not_disposed()?;
        self.constraint_mut()?.push_row(row.into());
        self.rebuild()
    }

    /// # Errors
    ///
    /// Fails for other joint kinds, out-of-range indices, or when the
    /// resulting rebuild fails.
    pub fn remove_row(&mut self, index: usize) -> Result<RowSpec> {
        self.ensure_not_disposed()?;
        let row = self
            .constraint_mut()?
            .remove_row(index)
            .ok_or_else(|| Self::invalid("row index out of range"))?;
        self.rebuild()?;
        Ok(row)
    }

    /// # Errors
    ///
    /// Fails for other joint kinds.
    pub fn set_break_strategy(&mut self, strategy: BreakStrategy) -> Result<()> {
        self.constraint_mut()?.break_strategy = strategy;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails for other joint kinds.
    pub fn set_max_force(&mut self, max_force: Option<f32>) -> Result<()> {
        self.constraint_mut()?.max_force = max_force;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with [`PhysicsError::JointDisposed`] on a second dispose.
    pub fn dispose(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        if let Some(handle) = self.record.native.take() {
            self.solver.destroy_joint(handle)?;
            self.by_handle.remove(&handle);
        }
        self.record.state = JointState::Disposed;
        self.record.pending_rebuild = false;
        tracing::debug!(joint = self.id.0, "disposed joint");
        Ok(())
    }
}

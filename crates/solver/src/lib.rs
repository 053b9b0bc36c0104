#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # Native Solver Boundary
//!
//! This crate is the seam between the world layer and the rigid-body engine
//! that actually integrates bodies, resolves contacts and enforces joints.
//! The engine is treated as a black box: everything the world needs from it
//! is expressed by the [`NativeSolver`] trait, and everything the engine needs
//! to ask back during a step is expressed by [`StepCallbacks`] and the small
//! access traits handed to each callback.
//!
//! The `reference` feature (on by default) provides [`ReferenceSolver`], a
//! compact in-process engine used by tests, benchmarks and the sandbox
//! runtime. [`default_solver`] picks the best backend that is compiled in.

use glam::{Quat, Vec3};
use thiserror::Error;

pub mod shape;

#[cfg(feature = "reference")]
pub mod reference;

pub use shape::{Aabb, CollisionShape};

#[cfg(feature = "reference")]
pub use reference::ReferenceSolver;

/// Largest single step the engine accepts, in seconds.
pub const MAX_STEP_SECONDS: f32 = 1.0 / 20.0;

/// Supported range for the engine's minimum frame rate.
pub const MIN_FRAME_RATE_LIMITS: (f32, f32) = (60.0, 1000.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u32);

/// Correlates one `contact_begin` with the `contact_process` calls that
/// belong to the same contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactToken(pub u64);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("unknown body handle {0:?}")]
    UnknownBody(BodyHandle),
    #[error("unknown joint handle {0:?}")]
    UnknownJoint(JointHandle),
    #[error("unknown material handle {0:?}")]
    UnknownMaterial(MaterialHandle),
    #[error("step of {requested}s exceeds the engine limit of {limit}s")]
    StepTooLarge { requested: f32, limit: f32 },
    #[error("invalid step duration {0}")]
    InvalidStep(f32),
    #[error("invalid collision shape: {0}")]
    InvalidShape(&'static str),
    #[error("invalid joint: {0}")]
    InvalidJoint(&'static str),
    #[error("invalid mass {0}")]
    InvalidMass(f32),
    #[error("step aborted by a callback")]
    StepAborted,
}

pub type Result<T, E = SolverError> = std::result::Result<T, E>;

/// Marker returned by a callback to stop the step in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

/// Snapshot of a body as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Zero for static bodies.
    pub mass: f32,
    /// Principal moments of inertia.
    pub inertia: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub shape: CollisionShape,
    pub mass: f32,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub material: MaterialHandle,
}

/// Joint construction parameters. Pivots and axes are in world space at
/// the moment of creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointDesc {
    BallSocket {
        parent: BodyHandle,
        child: BodyHandle,
        pivot: Vec3,
    },
    Hinge {
        parent: BodyHandle,
        child: BodyHandle,
        pivot: Vec3,
        axis: Vec3,
    },
    Slider {
        parent: BodyHandle,
        child: BodyHandle,
        pivot: Vec3,
        axis: Vec3,
    },
    Corkscrew {
        parent: BodyHandle,
        child: BodyHandle,
        pivot: Vec3,
        axis: Vec3,
    },
    Universal {
        parent: BodyHandle,
        child: BodyHandle,
        pivot: Vec3,
        axis_a: Vec3,
        axis_b: Vec3,
    },
    UserBilateral {
        parent: BodyHandle,
        child: BodyHandle,
        max_dof: u32,
    },
}

impl JointDesc {
    #[must_use]
    pub const fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match *self {
            JointDesc::BallSocket { parent, child, .. }
            | JointDesc::Hinge { parent, child, .. }
            | JointDesc::Slider { parent, child, .. }
            | JointDesc::Corkscrew { parent, child, .. }
            | JointDesc::Universal { parent, child, .. }
            | JointDesc::UserBilateral { parent, child, .. } => (parent, child),
        }
    }
}

/// Combined physical properties of a material pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairProperties {
    pub collidable: bool,
    pub softness: f32,
    pub elasticity: f32,
    pub static_friction: f32,
    pub kinetic_friction: f32,
    pub continuous: bool,
}

impl Default for PairProperties {
    fn default() -> Self {
        Self {
            collidable: true,
            softness: 0.1,
            elasticity: 0.4,
            static_friction: 0.9,
            kinetic_friction: 0.5,
            continuous: false,
        }
    }
}

/// Bodies and materials involved in a new contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPair {
    pub token: ContactToken,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub material_a: MaterialHandle,
    pub material_b: MaterialHandle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    /// Parametric position along the cast segment, in `[0, 1]`.
    pub fraction: f32,
    pub normal: Vec3,
}

/// Per-body view handed to the force callback.
pub trait ForceAccess {
    fn state(&self) -> BodyState;
    fn timestep(&self) -> f32;
    /// Force accumulated so far in this callback.
    fn force(&self) -> Vec3;
    fn torque(&self) -> Vec3;
    fn add_force(&mut self, force: Vec3);
    fn add_torque(&mut self, torque: Vec3);
    fn set_velocity(&mut self, velocity: Vec3);
    fn set_angular_velocity(&mut self, angular_velocity: Vec3);
}

/// Introspection of one contact point, valid only inside `contact_process`.
pub trait ContactAccess {
    fn position(&self) -> Vec3;
    /// Unit normal pointing from body A towards body B.
    fn normal(&self) -> Vec3;
    /// Relative approach speed along the normal (positive when closing).
    fn normal_speed(&self) -> f32;
    /// Estimated contact force for this point.
    fn force(&self) -> Vec3;
    fn tangent_directions(&self) -> (Vec3, Vec3);
}

/// Hinge state handed to the per-step hinge callback.
pub trait HingeAccess {
    /// Raw hinge angle in `(-pi, pi]`.
    fn angle(&self) -> f32;
    /// Relative angular speed about the hinge axis.
    fn omega(&self) -> f32;
    fn timestep(&self) -> f32;
    /// Angular acceleration that brings the hinge to rest at `angle` in one step.
    fn calculate_stop_alpha(&self, angle: f32) -> f32;
    fn set_acceleration(&mut self, alpha: f32);
}

/// Row submission interface for user-defined bilateral joints.
pub trait BilateralAccess {
    fn timestep(&self) -> f32;
    fn parent_state(&self) -> BodyState;
    fn child_state(&self) -> BodyState;
    /// Constrains `dot(child_point - parent_point, direction)` towards zero.
    fn add_linear_row(&mut self, parent_point: Vec3, child_point: Vec3, direction: Vec3);
    /// Constrains the child's rotation about `direction`, relative to the
    /// parent, towards zero.
    fn add_angular_row(&mut self, relative_angle: f32, direction: Vec3);
    /// Applies to the most recently added row.
    fn set_row_stiffness(&mut self, stiffness: f32);
    /// Force carried by `row` during the previous step.
    fn row_force(&self, row: usize) -> f32;
}

/// Callbacks the engine invokes while stepping.
pub trait StepCallbacks {
    fn apply_force_and_torque(
        &mut self,
        body: BodyHandle,
        access: &mut dyn ForceAccess,
    ) -> Result<(), Aborted>;

    /// Returns whether the contact may proceed.
    fn contact_begin(&mut self, pair: &ContactPair) -> Result<bool, Aborted>;

    /// Called once per manifold point. Returns whether the contact response
    /// is allowed.
    fn contact_process(
        &mut self,
        token: ContactToken,
        access: &dyn ContactAccess,
    ) -> Result<bool, Aborted>;

    fn hinge_step(
        &mut self,
        _joint: JointHandle,
        _access: &mut dyn HingeAccess,
    ) -> Result<(), Aborted> {
        Ok(())
    }

    fn bilateral_step(
        &mut self,
        _joint: JointHandle,
        _access: &mut dyn BilateralAccess,
    ) -> Result<(), Aborted> {
        Ok(())
    }
}

/// The rigid-body engine as seen by the world layer.
pub trait NativeSolver {
    /// Clamped to [`MIN_FRAME_RATE_LIMITS`].
    fn set_min_frame_rate(&mut self, fps: f32);
    fn min_frame_rate(&self) -> f32;

    fn create_body(&mut self, desc: &BodyDesc) -> Result<BodyHandle>;
    fn destroy_body(&mut self, body: BodyHandle) -> Result<()>;
    fn body_state(&self, body: BodyHandle) -> Result<BodyState>;
    fn set_position(&mut self, body: BodyHandle, position: Vec3) -> Result<()>;
    fn set_orientation(&mut self, body: BodyHandle, orientation: Quat) -> Result<()>;
    fn set_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<()>;
    fn set_angular_velocity(&mut self, body: BodyHandle, angular_velocity: Vec3) -> Result<()>;
    fn set_mass(&mut self, body: BodyHandle, mass: f32) -> Result<()>;
    fn set_body_material(&mut self, body: BodyHandle, material: MaterialHandle) -> Result<()>;
    fn body_material(&self, body: BodyHandle) -> Result<MaterialHandle>;
    fn body_shape(&self, body: BodyHandle) -> Result<CollisionShape>;
    /// Enables the per-step force callback for `body`.
    fn set_force_callback(&mut self, body: BodyHandle, enabled: bool) -> Result<()>;

    fn default_material(&self) -> MaterialHandle;
    fn create_material(&mut self) -> MaterialHandle;
    fn set_material_pair(
        &mut self,
        a: MaterialHandle,
        b: MaterialHandle,
        properties: PairProperties,
    ) -> Result<()>;
    fn material_pair(&self, a: MaterialHandle, b: MaterialHandle) -> Result<PairProperties>;
    /// Routes contacts of this pair through the contact callbacks.
    fn set_pair_callback(&mut self, a: MaterialHandle, b: MaterialHandle, enabled: bool)
        -> Result<()>;

    fn create_joint(&mut self, desc: &JointDesc) -> Result<JointHandle>;
    fn destroy_joint(&mut self, joint: JointHandle) -> Result<()>;
    fn set_joint_collision(&mut self, joint: JointHandle, collide: bool) -> Result<()>;
    fn set_joint_stiffness(&mut self, joint: JointHandle, stiffness: f32) -> Result<()>;
    fn set_joint_enabled(&mut self, joint: JointHandle, enabled: bool) -> Result<()>;
    /// Enables the per-step hinge callback. Only valid for hinge joints.
    fn set_hinge_callback(&mut self, joint: JointHandle, enabled: bool) -> Result<()>;

    /// Advances the world by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::StepTooLarge`] when `dt` exceeds
    /// [`MAX_STEP_SECONDS`], [`SolverError::InvalidStep`] for non-positive
    /// durations and [`SolverError::StepAborted`] when a callback aborts.
    fn step(&mut self, dt: f32, callbacks: &mut dyn StepCallbacks) -> Result<()>;

    /// Nearest hit along `from..to` among bodies accepted by `prefilter`.
    fn ray_cast(
        &self,
        from: Vec3,
        to: Vec3,
        prefilter: &mut dyn FnMut(BodyHandle) -> bool,
    ) -> Option<RayHit>;

    fn body_count(&self) -> usize;
    fn joint_count(&self) -> usize;
}

/// Returns the best solver backend compiled into this build.
#[must_use]
pub fn default_solver() -> Box<dyn NativeSolver> {
    #[cfg(feature = "reference")]
    {
        tracing::info!("Using ReferenceSolver backend.");
        Box::new(ReferenceSolver::new())
    }

    #[cfg(not(feature = "reference"))]
    {
        compile_error!("No solver backend available. Enable the 'reference' feature.");
    }
}

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # Physics World Layer
//!
//! A single-threaded world layer sitting directly on top of a native
//! rigid-body solver. The solver integrates bodies, resolves contacts and
//! enforces joints; this crate decides when it steps and what it sees while
//! it does.
//!
//! ## Key Components
//!
//! -   **World:** [`PhysicsWorld`] turns elapsed wall-clock time into bounded
//!     native sub-steps, applies gravity, the soft [`CollisionBoundary`] and
//!     2D-plane corrections to every body before its user force hook runs,
//!     and disposes removed bodies only after the step has finished.
//! -   **Materials:** [`MaterialRegistry`] keeps every material pair
//!     configured with averaged properties.
//! -   **Collision events:** [`CollisionEventDispatcher`] folds the solver's
//!     per-point contact callbacks into one start and one contact event per
//!     contact, either of which may veto the response.
//! -   **Joints:** [`JointKind`] covers the built-in joints and
//!     [`UserBilateralConstraint`]; joints are rebuilt in place when their
//!     geometry changes, with batched changes coalesced into one rebuild.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use physics::{BodyDescription, PhysicsWorld, Vec3};
//!
//! let mut world = PhysicsWorld::create(Vec3::new(0.0, -9.8, 0.0), None)?;
//! let ball = world.add_body(&BodyDescription::sphere(0.5).at(Vec3::Y * 5.0))?;
//! world.unpause();
//! world.advance(1.0 / 60.0)?;
//! println!("{}", world.body(ball)?.position());
//! ```

pub mod body;
pub mod boundary;
pub mod clock;
pub mod collision;
pub mod config;
pub mod error;
pub mod joint;
pub mod material;
pub mod plane2d;
pub mod simulation;
pub mod steps;
pub mod types;

pub use body::{Body, BodyDescription, BodyMut, ForceContext, ForceHook, PlaneOverride};
pub use boundary::{CollisionBoundary, BOUNDARY_ACCELERATION, MAX_WALL_DEPTH};
pub use clock::{Clock, ClockHandle, ManualClock, RealtimeClock};
pub use collision::{
    CollisionEventDispatcher, CollisionHook, CollisionStart, Contact, ContactResponse,
    MaterialPairKey,
};
pub use config::{BoundaryConfig, WorldConfig};
pub use error::{PhysicsError, Result};
pub use joint::{
    BreakStrategy, ConstraintRow, HingeSettings, JointInfo, JointKind, JointMut, JointState,
    RowSpec, UserBilateralConstraint,
};
pub use material::{MaterialDefinition, MaterialRegistry, NamedMaterial};
pub use simulation::{PhysicsWorld, SteppedListener};
pub use steps::{plan_substeps, MAX_SUBSTEPS};
pub use types::{
    BodyId, BoundaryEdges, HookId, JointId, LineSegment, MaterialId, RayFilter, RayHit,
    UpdateSummary, WorldStepped,
};

pub use glam::{Quat, Vec3};
pub use solver::{CollisionShape, NativeSolver, PairProperties, MAX_STEP_SECONDS};

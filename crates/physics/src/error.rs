use solver::{ContactToken, SolverError};
use thiserror::Error;

use crate::types::{BodyId, HookId, JointId, MaterialId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("the physics world has been disposed")]
    Disposed,
    #[error("update called while a step is already in flight")]
    ReentrantUpdate,
    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),
    #[error("body {0:?} is already queued for removal")]
    BodyAlreadyRemoved(BodyId),
    #[error("unknown joint {0:?}")]
    UnknownJoint(JointId),
    #[error("joint {0:?} has been disposed")]
    JointDisposed(JointId),
    #[error("joint {joint:?} cannot be initialised: {reason}")]
    JointPrecondition {
        joint: JointId,
        reason: &'static str,
    },
    #[error("joint {0:?} is already initialised with different bodies")]
    JointAlreadyInitialised(JointId),
    #[error("end_update on joint {0:?} without a matching begin_update")]
    UnbalancedUpdate(JointId),
    #[error("user constraint declares {expected} degrees of freedom but its rows provide {actual}")]
    DofMismatch { expected: u32, actual: u32 },
    #[error("unknown material {0:?}")]
    UnknownMaterial(MaterialId),
    #[error("no collision hook registered for materials {0:?} and {1:?}")]
    UnregisteredMaterialPair(MaterialId, MaterialId),
    #[error("contact process callback without a matching begin ({0:?})")]
    ProcessWithoutBegin(ContactToken),
    #[error("unknown collision hook {0:?}")]
    UnknownHook(HookId),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T, E = PhysicsError> = std::result::Result<T, E>;

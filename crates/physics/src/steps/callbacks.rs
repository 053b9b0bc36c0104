//! Routes the solver's step callbacks back into the world.
//!
//! Errors cannot cross the solver boundary, so the bridge parks the first
//! one it sees and aborts the step; the world reports it once `step`
//! returns.

use solver::{
    Aborted, BilateralAccess, BodyHandle, ContactAccess, ContactPair, ContactToken, ForceAccess,
    HingeAccess, JointHandle, MaterialHandle, SolverError, StepCallbacks,
};

use super::forces::{BodyForceFlags, ForceEnvironment};
use crate::body::{BodyTable, ForceContext};
use crate::collision::CollisionEventDispatcher;
use crate::error::{PhysicsError, Result};
use crate::joint::JointTable;
use crate::material::MaterialRegistry;
use crate::types::MaterialId;

pub(crate) struct StepBridge<'a> {
    pub environment: ForceEnvironment,
    pub bodies: &'a mut BodyTable,
    pub materials: &'a MaterialRegistry,
    pub dispatcher: &'a mut CollisionEventDispatcher,
    pub joints: &'a mut JointTable,
    pub fatal: Option<PhysicsError>,
}

impl StepBridge<'_> {
    fn park<T>(&mut self, result: Result<T>) -> Result<T, Aborted> {
        result.map_err(|err| {
            tracing::debug!(error = %err, "aborting native step");
            self.fatal.get_or_insert(err);
            Aborted
        })
    }

    fn material(&self, handle: MaterialHandle) -> Result<MaterialId> {
        self.materials
            .id_for_handle(handle)
            .ok_or(PhysicsError::Solver(SolverError::UnknownMaterial(handle)))
    }

    /// Takes the parked error, if any.
    pub(crate) fn into_fatal(self) -> Option<PhysicsError> {
        self.fatal
    }
}

impl StepCallbacks for StepBridge<'_> {
    fn apply_force_and_torque(
        &mut self,
        body: BodyHandle,
        access: &mut dyn ForceAccess,
    ) -> Result<(), Aborted> {
        // Boundary walls and other foreign bodies are not ours to push.
        let Some(id) = self.bodies.id_for(body) else {
            return Ok(());
        };
        let (flags, hook) = match self.bodies.get_mut(id) {
            Ok(record) => (
                BodyForceFlags {
                    apply_gravity: record.apply_gravity,
                    plane_override: record.plane_override,
                },
                record.force_hook.take(),
            ),
            Err(err) => return self.park(Err(err)),
        };

        self.environment.apply(flags, access);

        if let Some(mut hook) = hook {
            hook(&mut ForceContext::new(id, access, self.bodies));
            if let Ok(record) = self.bodies.get_mut(id) {
                record.force_hook = Some(hook);
            }
        }
        Ok(())
    }

    fn contact_begin(&mut self, pair: &ContactPair) -> Result<bool, Aborted> {
        let bodies = (self.bodies.id_for(pair.body_a), self.bodies.id_for(pair.body_b));
        let materials = match (self.material(pair.material_a), self.material(pair.material_b)) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(err), _) | (_, Err(err)) => return self.park(Err(err)),
        };
        let result = self.dispatcher.begin(pair.token, bodies, materials);
        self.park(result)
    }

    fn contact_process(
        &mut self,
        token: ContactToken,
        access: &dyn ContactAccess,
    ) -> Result<bool, Aborted> {
        let result = self.dispatcher.process(token, access);
        self.park(result)
    }

    fn hinge_step(&mut self, joint: JointHandle, access: &mut dyn HingeAccess) -> Result<(), Aborted> {
        self.joints.hinge_step(joint, access);
        Ok(())
    }

    fn bilateral_step(
        &mut self,
        joint: JointHandle,
        access: &mut dyn BilateralAccess,
    ) -> Result<(), Aborted> {
        self.joints.bilateral_step(joint, access);
        Ok(())
    }
}

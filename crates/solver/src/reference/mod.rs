//! In-process reference engine.
//!
//! A deliberately small sequential-impulse solver: explicit force
//! integration, pairwise narrow phase, velocity rows for joints and contacts,
//! then a positional correction pass. It honours the full [`NativeSolver`]
//! contract, including callback ordering and contact tokens, so the world
//! layer can be exercised without the production engine.

mod body;
mod contact;
mod rows;

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::{Quat, Vec3};

use crate::{
    BodyDesc, BodyHandle, BodyState, CollisionShape, ContactPair, ContactToken, JointDesc,
    JointHandle, MaterialHandle, NativeSolver, PairProperties, RayHit, Result, SolverError,
    StepCallbacks, MAX_STEP_SECONDS, MIN_FRAME_RATE_LIMITS,
};

use body::{ForceSlot, RigidBody};
use contact::{detect, ordered, ContactSlot, SolverContact};
use rows::{hinge_motor_row, BilateralSlot, HingeSlot, JointSlot, Row};

/// Velocity iterations per micro-step.
const DEFAULT_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct PairEntry {
    properties: PairProperties,
    callback: bool,
}

#[derive(Debug)]
pub struct ReferenceSolver {
    bodies: BTreeMap<BodyHandle, RigidBody>,
    joints: BTreeMap<JointHandle, JointSlot>,
    material_count: u32,
    pairs: HashMap<(MaterialHandle, MaterialHandle), PairEntry>,
    next_body: u32,
    next_joint: u32,
    next_token: u64,
    min_frame_rate: f32,
    iterations: usize,
}

impl Default for ReferenceSolver {
    fn default() -> Self {
        Self::new()
    }
}

fn material_key(a: MaterialHandle, b: MaterialHandle) -> (MaterialHandle, MaterialHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Rows built for one joint during a micro-step.
struct JointRows {
    handle: JointHandle,
    start: usize,
    end: usize,
}

impl ReferenceSolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bodies: BTreeMap::new(),
            joints: BTreeMap::new(),
            // Material 0 is the default material.
            material_count: 1,
            pairs: HashMap::new(),
            next_body: 0,
            next_joint: 0,
            next_token: 0,
            min_frame_rate: MIN_FRAME_RATE_LIMITS.0,
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Sets the number of velocity iterations per micro-step.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    fn body(&self, handle: BodyHandle) -> Result<&RigidBody> {
        self.bodies.get(&handle).ok_or(SolverError::UnknownBody(handle))
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(&handle)
            .ok_or(SolverError::UnknownBody(handle))
    }

    fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut JointSlot> {
        self.joints
            .get_mut(&handle)
            .ok_or(SolverError::UnknownJoint(handle))
    }

    fn check_material(&self, material: MaterialHandle) -> Result<()> {
        if material.0 < self.material_count {
            Ok(())
        } else {
            Err(SolverError::UnknownMaterial(material))
        }
    }

    fn pair_entry(&self, a: MaterialHandle, b: MaterialHandle) -> PairEntry {
        self.pairs
            .get(&material_key(a, b))
            .copied()
            .unwrap_or_default()
    }

    /// Runs one micro-step with the bodies moved out into a flat vector.
    fn micro_step(&mut self, timestep: f32, callbacks: &mut dyn StepCallbacks) -> Result<()> {
        let (handles, mut bodies): (Vec<BodyHandle>, Vec<RigidBody>) =
            std::mem::take(&mut self.bodies).into_iter().unzip();
        let result = self.micro_step_inner(timestep, &handles, &mut bodies, callbacks);
        self.bodies = handles.into_iter().zip(bodies).collect();
        result
    }

    fn micro_step_inner(
        &mut self,
        timestep: f32,
        handles: &[BodyHandle],
        bodies: &mut [RigidBody],
        callbacks: &mut dyn StepCallbacks,
    ) -> Result<()> {
        let index_of = |handle: BodyHandle| handles.binary_search(&handle).ok();

        // Forces.
        for (handle, body) in handles.iter().zip(bodies.iter_mut()) {
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
            if !body.is_dynamic() || !body.force_callback {
                continue;
            }
            let mut slot = ForceSlot { body, timestep };
            callbacks
                .apply_force_and_torque(*handle, &mut slot)
                .map_err(|_| SolverError::StepAborted)?;
        }

        // Joint rows, including hinge and user-bilateral callbacks.
        let mut rows: Vec<Row> = Vec::new();
        let mut joint_rows: Vec<JointRows> = Vec::new();
        let mut unconstrained_pairs: HashSet<(BodyHandle, BodyHandle)> = HashSet::new();
        for (handle, slot) in &self.joints {
            if !slot.collide {
                unconstrained_pairs.insert(ordered(slot.parent, slot.child));
            }
            if !slot.enabled {
                continue;
            }
            let (Some(pi), Some(ci)) = (index_of(slot.parent), index_of(slot.child)) else {
                continue;
            };
            let (parent, child) = (&bodies[pi], &bodies[ci]);
            let mut seeds = slot.kinematic_rows(parent, child, timestep);

            match slot.desc {
                JointDesc::Hinge { .. } if slot.hinge_callback => {
                    let (angle, omega) = slot.hinge_angle(parent, child);
                    let mut hinge = HingeSlot {
                        angle,
                        omega,
                        timestep,
                        alpha: None,
                    };
                    callbacks
                        .hinge_step(*handle, &mut hinge)
                        .map_err(|_| SolverError::StepAborted)?;
                    if let Some(alpha) = hinge.alpha {
                        let axis = parent.orientation * slot.axis_parent;
                        seeds.push(hinge_motor_row(&hinge, axis, alpha));
                    }
                }
                JointDesc::UserBilateral { .. } => {
                    let mut bilateral = BilateralSlot {
                        parent: parent.state(),
                        child: child.state(),
                        timestep,
                        stiffness: slot.stiffness,
                        max_dof: slot.max_dof(),
                        previous_forces: &slot.row_forces,
                        rows: Vec::new(),
                        dropped: 0,
                    };
                    callbacks
                        .bilateral_step(*handle, &mut bilateral)
                        .map_err(|_| SolverError::StepAborted)?;
                    if bilateral.dropped > 0 {
                        tracing::warn!(
                            joint = handle.0,
                            dropped = bilateral.dropped,
                            "bilateral joint submitted more rows than its capacity"
                        );
                    }
                    seeds.extend(bilateral.rows);
                }
                _ => {}
            }

            let start = rows.len();
            rows.extend(seeds.into_iter().map(|seed| seed.bind(pi, ci)));
            joint_rows.push(JointRows {
                handle: *handle,
                start,
                end: rows.len(),
            });
        }

        for body in bodies.iter_mut() {
            body.integrate_velocity(timestep);
        }

        // Contacts.
        let mut contacts: Vec<SolverContact> = Vec::new();
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (a, b) = (&bodies[i], &bodies[j]);
                if !a.is_dynamic() && !b.is_dynamic() {
                    continue;
                }
                if unconstrained_pairs.contains(&ordered(handles[i], handles[j])) {
                    continue;
                }
                if !a.aabb().overlaps(&b.aabb()) {
                    continue;
                }
                let entry = self.pair_entry(a.material, b.material);
                if !entry.properties.collidable {
                    continue;
                }
                let manifold = detect(a, b);
                if manifold.is_empty() {
                    continue;
                }
                if !entry.callback {
                    contacts.extend(
                        manifold
                            .into_iter()
                            .map(|point| SolverContact::new(i, j, bodies, point, entry.properties)),
                    );
                    continue;
                }

                let token = ContactToken(self.next_token);
                self.next_token += 1;
                let pair = ContactPair {
                    token,
                    body_a: handles[i],
                    body_b: handles[j],
                    material_a: a.material,
                    material_b: b.material,
                };
                if !callbacks
                    .contact_begin(&pair)
                    .map_err(|_| SolverError::StepAborted)?
                {
                    continue;
                }
                for point in manifold {
                    let slot = ContactSlot::new(a, b, point, timestep);
                    if callbacks
                        .contact_process(token, &slot)
                        .map_err(|_| SolverError::StepAborted)?
                    {
                        contacts.push(SolverContact::new(i, j, bodies, point, entry.properties));
                    }
                }
            }
        }

        for _ in 0..self.iterations {
            for row in &mut rows {
                row.solve(bodies);
            }
            for contact in &mut contacts {
                contact.solve(bodies);
            }
        }

        for entry in &joint_rows {
            if let Some(slot) = self.joints.get_mut(&entry.handle) {
                slot.row_forces = rows[entry.start..entry.end]
                    .iter()
                    .map(|row| row.impulse / timestep)
                    .collect();
            }
        }

        for body in bodies.iter_mut() {
            body.integrate_position(timestep);
        }
        for contact in &contacts {
            contact.correct_position(bodies);
        }
        Ok(())
    }
}

impl NativeSolver for ReferenceSolver {
    fn set_min_frame_rate(&mut self, fps: f32) {
        let (low, high) = MIN_FRAME_RATE_LIMITS;
        self.min_frame_rate = if fps.is_nan() { low } else { fps.clamp(low, high) };
    }

    fn min_frame_rate(&self) -> f32 {
        self.min_frame_rate
    }

    fn create_body(&mut self, desc: &BodyDesc) -> Result<BodyHandle> {
        desc.shape.validate()?;
        if !(desc.mass.is_finite() && desc.mass >= 0.0) {
            return Err(SolverError::InvalidMass(desc.mass));
        }
        self.check_material(desc.material)?;

        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        let mut body = RigidBody::new(
            desc.shape,
            desc.mass,
            desc.position,
            desc.orientation,
            desc.material,
        );
        if body.is_dynamic() {
            body.velocity = desc.velocity;
            body.angular_velocity = desc.angular_velocity;
        }
        self.bodies.insert(handle, body);
        tracing::debug!(body = handle.0, mass = desc.mass, "created body");
        Ok(handle)
    }

    fn destroy_body(&mut self, body: BodyHandle) -> Result<()> {
        self.bodies
            .remove(&body)
            .ok_or(SolverError::UnknownBody(body))?;
        let before = self.joints.len();
        self.joints
            .retain(|_, joint| joint.parent != body && joint.child != body);
        tracing::debug!(
            body = body.0,
            joints_removed = before - self.joints.len(),
            "destroyed body"
        );
        Ok(())
    }

    fn body_state(&self, body: BodyHandle) -> Result<BodyState> {
        Ok(self.body(body)?.state())
    }

    fn set_position(&mut self, body: BodyHandle, position: Vec3) -> Result<()> {
        self.body_mut(body)?.position = position;
        Ok(())
    }

    fn set_orientation(&mut self, body: BodyHandle, orientation: Quat) -> Result<()> {
        self.body_mut(body)?.orientation = orientation.normalize();
        Ok(())
    }

    fn set_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<()> {
        let body = self.body_mut(body)?;
        if body.is_dynamic() {
            body.velocity = velocity;
        }
        Ok(())
    }

    fn set_angular_velocity(&mut self, body: BodyHandle, angular_velocity: Vec3) -> Result<()> {
        let body = self.body_mut(body)?;
        if body.is_dynamic() {
            body.angular_velocity = angular_velocity;
        }
        Ok(())
    }

    fn set_mass(&mut self, body: BodyHandle, mass: f32) -> Result<()> {
        if !(mass.is_finite() && mass >= 0.0) {
            return Err(SolverError::InvalidMass(mass));
        }
        self.body_mut(body)?.set_mass(mass);
        Ok(())
    }

    fn set_body_material(&mut self, body: BodyHandle, material: MaterialHandle) -> Result<()> {
        self.check_material(material)?;
        self.body_mut(body)?.material = material;
        Ok(())
    }

    fn body_material(&self, body: BodyHandle) -> Result<MaterialHandle> {
        Ok(self.body(body)?.material)
    }

    fn body_shape(&self, body: BodyHandle) -> Result<CollisionShape> {
        Ok(self.body(body)?.shape)
    }

    fn set_force_callback(&mut self, body: BodyHandle, enabled: bool) -> Result<()> {
        self.body_mut(body)?.force_callback = enabled;
        Ok(())
    }

    fn default_material(&self) -> MaterialHandle {
        MaterialHandle(0)
    }

    fn create_material(&mut self) -> MaterialHandle {
        let handle = MaterialHandle(self.material_count);
        self.material_count += 1;
        handle
    }

    fn set_material_pair(
        &mut self,
        a: MaterialHandle,
        b: MaterialHandle,
        properties: PairProperties,
    ) -> Result<()> {
        self.check_material(a)?;
        self.check_material(b)?;
        self.pairs.entry(material_key(a, b)).or_default().properties = properties;
        Ok(())
    }

    fn material_pair(&self, a: MaterialHandle, b: MaterialHandle) -> Result<PairProperties> {
        self.check_material(a)?;
        self.check_material(b)?;
        Ok(self.pair_entry(a, b).properties)
    }

    fn set_pair_callback(
        &mut self,
        a: MaterialHandle,
        b: MaterialHandle,
        enabled: bool,
    ) -> Result<()> {
        self.check_material(a)?;
        self.check_material(b)?;
        self.pairs.entry(material_key(a, b)).or_default().callback = enabled;
        Ok(())
    }

    fn create_joint(&mut self, desc: &JointDesc) -> Result<JointHandle> {
        let (parent, child) = desc.bodies();
        if parent == child {
            return Err(SolverError::InvalidJoint("a joint needs two distinct bodies"));
        }
        match *desc {
            JointDesc::Hinge { axis, .. }
            | JointDesc::Slider { axis, .. }
            | JointDesc::Corkscrew { axis, .. } => {
                if axis.length_squared() <= f32::EPSILON {
                    return Err(SolverError::InvalidJoint("joint axis must be non-zero"));
                }
            }
            JointDesc::Universal { axis_a, axis_b, .. } => {
                if axis_a.cross(axis_b).length_squared() <= f32::EPSILON {
                    return Err(SolverError::InvalidJoint(
                        "universal joint axes must be independent",
                    ));
                }
            }
            JointDesc::UserBilateral { max_dof, .. } => {
                if !(1..=6).contains(&max_dof) {
                    return Err(SolverError::InvalidJoint(
                        "bilateral joints carry between 1 and 6 rows",
                    ));
                }
            }
            JointDesc::BallSocket { .. } => {}
        }
        let slot = JointSlot::new(*desc, self.body(parent)?, self.body(child)?);

        let handle = JointHandle(self.next_joint);
        self.next_joint += 1;
        self.joints.insert(handle, slot);
        tracing::debug!(joint = handle.0, parent = parent.0, child = child.0, "created joint");
        Ok(handle)
    }

    fn destroy_joint(&mut self, joint: JointHandle) -> Result<()> {
        self.joints
            .remove(&joint)
            .map(|_| ())
            .ok_or(SolverError::UnknownJoint(joint))
    }

    fn set_joint_collision(&mut self, joint: JointHandle, collide: bool) -> Result<()> {
        self.joint_mut(joint)?.collide = collide;
        Ok(())
    }

    fn set_joint_stiffness(&mut self, joint: JointHandle, stiffness: f32) -> Result<()> {
        self.joint_mut(joint)?.stiffness = stiffness.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_joint_enabled(&mut self, joint: JointHandle, enabled: bool) -> Result<()> {
        self.joint_mut(joint)?.enabled = enabled;
        Ok(())
    }

    fn set_hinge_callback(&mut self, joint: JointHandle, enabled: bool) -> Result<()> {
        let slot = self.joint_mut(joint)?;
        if !matches!(slot.desc, JointDesc::Hinge { .. }) {
            return Err(SolverError::InvalidJoint(
                "hinge callback requires a hinge joint",
            ));
        }
        slot.hinge_callback = enabled;
        Ok(())
    }

    fn step(&mut self, dt: f32, callbacks: &mut dyn StepCallbacks) -> Result<()> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SolverError::InvalidStep(dt));
        }
        if dt > MAX_STEP_SECONDS * (1.0 + 1e-4) {
            return Err(SolverError::StepTooLarge {
                requested: dt,
                limit: MAX_STEP_SECONDS,
            });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let substeps = ((dt * self.min_frame_rate - 1e-3).ceil() as usize).max(1);
        #[allow(clippy::cast_precision_loss)]
        let timestep = dt / substeps as f32;
        tracing::trace!(dt, substeps, "reference step");

        for _ in 0..substeps {
            self.micro_step(timestep, callbacks)?;
        }
        Ok(())
    }

    fn ray_cast(
        &self,
        from: Vec3,
        to: Vec3,
        prefilter: &mut dyn FnMut(BodyHandle) -> bool,
    ) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (handle, body) in &self.bodies {
            if !prefilter(*handle) {
                continue;
            }
            let Some((fraction, normal)) =
                body.shape
                    .ray_intersect(body.position, body.orientation, from, to)
            else {
                continue;
            };
            if best.map_or(true, |hit| fraction < hit.fraction) {
                best = Some(RayHit {
                    body: *handle,
                    fraction,
                    normal,
                });
            }
        }
        best
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn joint_count(&self) -> usize {
        self.joints.len()
    }
}

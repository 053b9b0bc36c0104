//! Joint rows for the reference engine.
//!
//! Every joint, built-in or user-defined, is reduced each step to a list of
//! one-dimensional velocity rows that are solved with sequential impulses.

use glam::{Quat, Vec3};

use crate::reference::body::RigidBody;
use crate::reference::contact::pair_mut;
use crate::{BilateralAccess, BodyHandle, BodyState, HingeAccess, JointDesc};

/// Fraction of positional error fed back into the velocity target each step.
const BAUMGARTE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RowKind {
    Linear { r_parent: Vec3, r_child: Vec3 },
    Angular,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Row {
    pub parent: usize,
    pub child: usize,
    pub kind: RowKind,
    pub direction: Vec3,
    pub target_speed: f32,
    pub impulse: f32,
}

impl Row {
    fn linear(parent: &RigidBody, child: &RigidBody, anchors: (Vec3, Vec3), direction: Vec3, bias: f32) -> RowSeed {
        let (parent_point, child_point) = anchors;
        let error = (child_point - parent_point).dot(direction);
        RowSeed {
            kind: RowKind::Linear {
                r_parent: parent_point - parent.position,
                r_child: child_point - child.position,
            },
            direction,
            target_speed: -error * bias,
        }
    }

    fn angular(relative_angle: f32, direction: Vec3, bias: f32) -> RowSeed {
        RowSeed {
            kind: RowKind::Angular,
            direction,
            target_speed: -relative_angle * bias,
        }
    }

    fn relative_speed(&self, parent: &RigidBody, child: &RigidBody) -> f32 {
        match self.kind {
            RowKind::Linear { r_parent, r_child } => {
                let vc = child.velocity + child.angular_velocity.cross(r_child);
                let vp = parent.velocity + parent.angular_velocity.cross(r_parent);
                (vc - vp).dot(self.direction)
            }
            RowKind::Angular => (child.angular_velocity - parent.angular_velocity).dot(self.direction),
        }
    }

    fn inverse_mass(&self, parent: &RigidBody, child: &RigidBody) -> f32 {
        let d = self.direction;
        match self.kind {
            RowKind::Linear { r_parent, r_child } => {
                let rp = r_parent.cross(d);
                let rc = r_child.cross(d);
                parent.inv_mass
                    + child.inv_mass
                    + rp.dot(parent.apply_inv_inertia(rp))
                    + rc.dot(child.apply_inv_inertia(rc))
            }
            RowKind::Angular => d.dot(parent.apply_inv_inertia(d)) + d.dot(child.apply_inv_inertia(d)),
        }
    }

    pub(crate) fn solve(&mut self, bodies: &mut [RigidBody]) {
        let (parent, child) = pair_mut(bodies, self.parent, self.child);
        let k = self.inverse_mass(parent, child);
        if k <= f32::EPSILON {
            return;
        }
        let lambda = (self.target_speed - self.relative_speed(parent, child)) / k;
        self.impulse += lambda;
        let d = self.direction * lambda;
        match self.kind {
            RowKind::Linear { r_parent, r_child } => {
                parent.velocity -= d * parent.inv_mass;
                parent.angular_velocity -= parent.apply_inv_inertia(r_parent.cross(d));
                child.velocity += d * child.inv_mass;
                child.angular_velocity += child.apply_inv_inertia(r_child.cross(d));
            }
            RowKind::Angular => {
                parent.angular_velocity -= parent.apply_inv_inertia(d);
                child.angular_velocity += child.apply_inv_inertia(d);
            }
        }
    }
}

/// Row before it is bound to solver body indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowSeed {
    pub kind: RowKind,
    pub direction: Vec3,
    pub target_speed: f32,
}

impl RowSeed {
    pub(crate) fn bind(self, parent: usize, child: usize) -> Row {
        Row {
            parent,
            child,
            kind: self.kind,
            direction: self.direction,
            target_speed: self.target_speed,
            impulse: 0.0,
        }
    }
}

/// Joint geometry captured in body-local frames at creation.
#[derive(Debug, Clone)]
pub(crate) struct JointSlot {
    pub desc: JointDesc,
    pub parent: BodyHandle,
    pub child: BodyHandle,
    pub pivot_parent: Vec3,
    pub pivot_child: Vec3,
    pub axis_parent: Vec3,
    pub axis_child: Vec3,
    pub secondary_child: Vec3,
    pub reference_parent: Vec3,
    pub reference_child: Vec3,
    pub relative_rotation: Quat,
    pub collide: bool,
    pub stiffness: f32,
    pub enabled: bool,
    pub hinge_callback: bool,
    pub row_forces: Vec<f32>,
}

impl JointSlot {
    pub(crate) fn new(desc: JointDesc, parent: &RigidBody, child: &RigidBody) -> Self {
        let (parent_handle, child_handle) = desc.bodies();
        let (pivot, axis, secondary) = match desc {
            JointDesc::BallSocket { pivot, .. } => (pivot, Vec3::X, Vec3::Y),
            JointDesc::Hinge { pivot, axis, .. }
            | JointDesc::Slider { pivot, axis, .. }
            | JointDesc::Corkscrew { pivot, axis, .. } => (pivot, axis, axis.any_orthonormal_vector()),
            JointDesc::Universal {
                pivot, axis_a, axis_b, ..
            } => (pivot, axis_a, axis_b),
            JointDesc::UserBilateral { .. } => (child.position, Vec3::X, Vec3::Y),
        };
        let axis = axis.normalize_or_zero();
        let reference = axis.any_orthonormal_vector();
        let parent_inverse = parent.orientation.inverse();
        let child_inverse = child.orientation.inverse();
        Self {
            desc,
            parent: parent_handle,
            child: child_handle,
            pivot_parent: parent_inverse * (pivot - parent.position),
            pivot_child: child_inverse * (pivot - child.position),
            axis_parent: parent_inverse * axis,
            axis_child: child_inverse * axis,
            secondary_child: child_inverse * secondary.normalize_or_zero(),
            reference_parent: parent_inverse * reference,
            reference_child: child_inverse * reference,
            relative_rotation: parent_inverse * child.orientation,
            collide: false,
            stiffness: 0.9,
            enabled: true,
            hinge_callback: false,
            row_forces: Vec::new(),
        }
    }

    fn anchors(&self, parent: &RigidBody, child: &RigidBody) -> (Vec3, Vec3) {
        (
            parent.position + parent.orientation * self.pivot_parent,
            child.position + child.orientation * self.pivot_child,
        )
    }

    /// Rotation of the child away from its rest pose, as a scaled axis.
    fn rotation_error(&self, parent: &RigidBody, child: &RigidBody) -> Vec3 {
        let rest = parent.orientation * self.relative_rotation;
        let error = child.orientation * rest.inverse();
        let error = if error.w < 0.0 { -error } else { error };
        error.to_scaled_axis()
    }

    /// Kinematic rows implied by the joint type.
    pub(crate) fn kinematic_rows(&self, parent: &RigidBody, child: &RigidBody, timestep: f32) -> Vec<RowSeed> {
        let bias = BAUMGARTE * self.stiffness / timestep;
        let anchors = self.anchors(parent, child);
        let axis_parent = parent.orientation * self.axis_parent;
        let axis_child = child.orientation * self.axis_child;
        let mut rows = Vec::with_capacity(6);

        let point_rows = |rows: &mut Vec<RowSeed>, directions: &[Vec3]| {
            for &direction in directions {
                rows.push(Row::linear(parent, child, anchors, direction, bias));
            }
        };
        // Keeps `child_axis` perpendicular to `parent_axis`.
        let perpendicular_row = |rows: &mut Vec<RowSeed>, child_axis: Vec3, parent_axis: Vec3| {
            let direction = child_axis.cross(parent_axis);
            let length = direction.length();
            if length > 1e-6 {
                rows.push(Row::angular(
                    -child_axis.dot(parent_axis) / length,
                    direction / length,
                    bias,
                ));
            }
        };

        match self.desc {
            JointDesc::BallSocket { .. } => point_rows(&mut rows, &[Vec3::X, Vec3::Y, Vec3::Z]),
            JointDesc::Hinge { .. } => {
                point_rows(&mut rows, &[Vec3::X, Vec3::Y, Vec3::Z]);
                let (u, v) = axis_parent.any_orthonormal_pair();
                perpendicular_row(&mut rows, axis_child, u);
                perpendicular_row(&mut rows, axis_child, v);
            }
            JointDesc::Slider { .. } => {
                let (u, v) = axis_parent.any_orthonormal_pair();
                point_rows(&mut rows, &[u, v]);
                let error = self.rotation_error(parent, child);
                for direction in [Vec3::X, Vec3::Y, Vec3::Z] {
                    rows.push(Row::angular(error.dot(direction), direction, bias));
                }
            }
            JointDesc::Corkscrew { .. } => {
                let (u, v) = axis_parent.any_orthonormal_pair();
                point_rows(&mut rows, &[u, v]);
                perpendicular_row(&mut rows, axis_child, u);
                perpendicular_row(&mut rows, axis_child, v);
            }
            JointDesc::Universal { .. } => {
                point_rows(&mut rows, &[Vec3::X, Vec3::Y, Vec3::Z]);
                let secondary = child.orientation * self.secondary_child;
                perpendicular_row(&mut rows, secondary, axis_parent);
            }
            JointDesc::UserBilateral { .. } => {}
        }
        rows
    }

    /// Raw hinge angle about the parent's axis.
    pub(crate) fn hinge_angle(&self, parent: &RigidBody, child: &RigidBody) -> (f32, f32) {
        let axis = parent.orientation * self.axis_parent;
        let reference_parent = parent.orientation * self.reference_parent;
        let reference_child = child.orientation * self.reference_child;
        let sin = reference_parent.cross(reference_child).dot(axis);
        let cos = reference_parent.dot(reference_child);
        let omega = (child.angular_velocity - parent.angular_velocity).dot(axis);
        (sin.atan2(cos), omega)
    }

    pub(crate) fn max_dof(&self) -> usize {
        match self.desc {
            JointDesc::UserBilateral { max_dof, .. } => max_dof as usize,
            _ => 0,
        }
    }
}

pub(crate) struct HingeSlot {
    pub angle: f32,
    pub omega: f32,
    pub timestep: f32,
    pub alpha: Option<f32>,
}

impl HingeAccess for HingeSlot {
    fn angle(&self) -> f32 {
        self.angle
    }

    fn omega(&self) -> f32 {
        self.omega
    }

    fn timestep(&self) -> f32 {
        self.timestep
    }

    fn calculate_stop_alpha(&self, angle: f32) -> f32 {
        ((angle - self.angle) / self.timestep - self.omega) / self.timestep
    }

    fn set_acceleration(&mut self, alpha: f32) {
        self.alpha = Some(alpha);
    }
}

/// Hinge acceleration expressed as an angular motor row.
pub(crate) fn hinge_motor_row(slot: &HingeSlot, axis: Vec3, alpha: f32) -> RowSeed {
    RowSeed {
        kind: RowKind::Angular,
        direction: axis,
        target_speed: slot.omega + alpha * slot.timestep,
    }
}

pub(crate) struct BilateralSlot<'a> {
    pub parent: BodyState,
    pub child: BodyState,
    pub timestep: f32,
    pub stiffness: f32,
    pub max_dof: usize,
    pub previous_forces: &'a [f32],
    pub rows: Vec<RowSeed>,
    pub dropped: usize,
}

impl BilateralAccess for BilateralSlot<'_> {
    fn timestep(&self) -> f32 {
        self.timestep
    }

    fn parent_state(&self) -> BodyState {
        self.parent
    }

    fn child_state(&self) -> BodyState {
        self.child
    }

    fn add_linear_row(&mut self, parent_point: Vec3, child_point: Vec3, direction: Vec3) {
        if self.rows.len() >= self.max_dof {
            self.dropped += 1;
            return;
        }
        let direction = direction.normalize_or_zero();
        let error = (child_point - parent_point).dot(direction);
        self.rows.push(RowSeed {
            kind: RowKind::Linear {
                r_parent: parent_point - self.parent.position,
                r_child: child_point - self.child.position,
            },
            direction,
            target_speed: -error * BAUMGARTE * self.stiffness / self.timestep,
        });
    }

    fn add_angular_row(&mut self, relative_angle: f32, direction: Vec3) {
        if self.rows.len() >= self.max_dof {
            self.dropped += 1;
            return;
        }
        self.rows.push(RowSeed {
            kind: RowKind::Angular,
            direction: direction.normalize_or_zero(),
            target_speed: -relative_angle * BAUMGARTE * self.stiffness / self.timestep,
        });
    }

    fn set_row_stiffness(&mut self, stiffness: f32) {
        let stiffness = stiffness.clamp(0.0, 1.0);
        if let Some(row) = self.rows.last_mut() {
            // Targets were seeded with the joint stiffness; rescale to the row's.
            if self.stiffness > 0.0 {
                row.target_speed *= stiffness / self.stiffness;
            }
        }
    }

    fn row_force(&self, row: usize) -> f32 {
        self.previous_forces.get(row).copied().unwrap_or(0.0)
    }
}

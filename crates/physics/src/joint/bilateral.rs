//! # User Bilateral Constraints
//!
//! A composite joint assembled from constraint rows. The native joint is
//! allocated with a fixed number of degrees of freedom, so the rows must add
//! up to exactly that count before the joint can be built.

use glam::{Quat, Vec3};
use solver::{BilateralAccess, BodyState};

use crate::error::{PhysicsError, Result};

/// One building block of a user constraint. Pivots and axes are given in the
/// local frame of the body they belong to (axes: the parent's frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintRow {
    /// Keeps two points together. Three degrees of freedom.
    PointToPoint { parent_pivot: Vec3, child_pivot: Vec3 },
    /// Keeps two points level along one axis.
    LinearAxis {
        parent_pivot: Vec3,
        child_pivot: Vec3,
        axis: Vec3,
    },
    /// Stops relative rotation about one axis.
    AngularAxis { axis: Vec3 },
    /// Stops all relative rotation. Three degrees of freedom.
    AngularLock,
}

impl ConstraintRow {
    #[must_use]
    pub const fn dof(&self) -> u32 {
        match self {
            ConstraintRow::PointToPoint { .. } | ConstraintRow::AngularLock => 3,
            ConstraintRow::LinearAxis { .. } | ConstraintRow::AngularAxis { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSpec {
    pub row: ConstraintRow,
    /// The joint breaks when any of this row's forces exceeds the limit.
    pub max_force: Option<f32>,
    /// Per-row stiffness in `[0, 1]`.
    pub stiffness: Option<f32>,
}

impl From<ConstraintRow> for RowSpec {
    fn from(row: ConstraintRow) -> Self {
        Self {
            row,
            max_force: None,
            stiffness: None,
        }
    }
}

impl RowSpec {
    #[must_use]
    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = Some(max_force);
        self
    }

    #[must_use]
    pub fn with_stiffness(mut self, stiffness: f32) -> Self {
        self.stiffness = Some(stiffness);
        self
    }
}

/// What happens to a user constraint when it breaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BreakStrategy {
    /// Disable the joint and let its bodies collide with each other.
    #[default]
    DisableAndCollidable,
    DisableOnly,
    Dispose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserBilateralConstraint {
    max_dof: u32,
    rows: Vec<RowSpec>,
    /// The joint breaks when the combined row force exceeds the limit.
    pub max_force: Option<f32>,
    pub break_strategy: BreakStrategy,
    rest: Quat,
}

impl UserBilateralConstraint {
    #[must_use]
    pub fn new(max_dof: u32) -> Self {
        Self {
            max_dof,
            rows: Vec::new(),
            max_force: None,
            break_strategy: BreakStrategy::default(),
            rest: Quat::IDENTITY,
        }
    }

    #[must_use]
    pub fn with_row(mut self, row: impl Into<RowSpec>) -> Self {
        self.rows.push(row.into());
        self
    }

    #[must_use]
    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = Some(max_force);
        self
    }

    #[must_use]
    pub fn with_break_strategy(mut self, strategy: BreakStrategy) -> Self {
        self.break_strategy = strategy;
        self
    }

    #[must_use]
    pub fn max_dof(&self) -> u32 {
        self.max_dof
    }

    #[must_use]
    pub fn rows(&self) -> &[RowSpec] {
        &self.rows
    }

    /// Degrees of freedom provided by the current rows.
    #[must_use]
    pub fn dof(&self) -> u32 {
        self.rows.iter().map(|entry| entry.row.dof()).sum()
    }

    pub(crate) fn push_row(&mut self, row: RowSpec) {
        self.rows.push(row);
    }

    pub(crate) fn remove_row(&mut self, index: usize) -> Option<RowSpec> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    /// # Errors
    ///
    /// Returns [`PhysicsError::DofMismatch`] unless the rows fill the
    /// declared degrees of freedom exactly, and
    /// [`PhysicsError::InvalidConfiguration`] for a row stiffness outside `[0, 1]`.
    pub fn check(&self) -> Result<()> {
        let actual = self.dof();
        if actual != self.max_dof {
            return Err(PhysicsError::DofMismatch {
                expected: self.max_dof,
                actual,
            });
        }
        if let Some(stiffness) = self
            .rows
            .iter()
            .filter_map(|entry| entry.stiffness)
            .find(|s| !(0.0..=1.0).contains(s))
        {
            return Err(PhysicsError::InvalidConfiguration(format!(
                "row stiffness must be within [0, 1], got {stiffness}"
            )));
        }
        Ok(())
    }

    /// Captures the current relative orientation as the rest pose.
    pub(crate) fn capture_rest(&mut self, parent: &BodyState, child: &BodyState) {
        self.rest = parent.orientation.inverse() * child.orientation;
    }

    /// Child rotation away from the rest pose, as a world-space scaled axis.
    fn rotation_error(&self, parent: &BodyState, child: &BodyState) -> Vec3 {
        let rest = parent.orientation * self.rest;
        let error = child.orientation * rest.inverse();
        let error = if error.w < 0.0 { -error } else { error };
        error.to_scaled_axis()
    }

    /// Submits every row for this step and checks the forces the rows
    /// carried in the previous step. Returns whether a break threshold was
    /// exceeded.
    pub(crate) fn submit(&self, access: &mut dyn BilateralAccess) -> bool {
        let parent = access.parent_state();
        let child = access.child_state();
        let rotation_error = self.rotation_error(&parent, &child);
        let world_point = |state: &BodyState, local: Vec3| state.position + state.orientation * local;

        let mut broken = false;
        let mut total_squared = 0.0;
        let mut row_index = 0;
        for entry in &self.rows {
            for k in 0..entry.row.dof() as usize {
                let force = access.row_force(row_index + k);
                total_squared += force * force;
                if entry.max_force.is_some_and(|max| force.abs() > max) {
                    broken = true;
                }
            }
            row_index += entry.row.dof() as usize;

            let add_linear = |access: &mut dyn BilateralAccess, p: Vec3, c: Vec3, dir: Vec3| {
                access.add_linear_row(p, c, dir);
                if let Some(stiffness) = entry.stiffness {
                    access.set_row_stiffness(stiffness);
                }
            };
            match entry.row {
                ConstraintRow::PointToPoint {
                    parent_pivot,
                    child_pivot,
                } => {
                    let p = world_point(&parent, parent_pivot);
                    let c = world_point(&child, child_pivot);
                    for dir in [Vec3::X, Vec3::Y, Vec3::Z] {
                        add_linear(access, p, c, dir);
                    }
                }
                ConstraintRow::LinearAxis {
                    parent_pivot,
                    child_pivot,
                    axis,
                } => {
                    let p = world_point(&parent, parent_pivot);
                    let c = world_point(&child, child_pivot);
                    add_linear(access, p, c, parent.orientation * axis);
                }
                ConstraintRow::AngularAxis { axis } => {
                    let dir = (parent.orientation * axis).normalize_or_zero();
                    access.add_angular_row(rotation_error.dot(dir), dir);
                    if let Some(stiffness) = entry.stiffness {
                        access.set_row_stiffness(stiffness);
                    }
                }
                ConstraintRow::AngularLock => {
                    for dir in [Vec3::X, Vec3::Y, Vec3::Z] {
                        access.add_angular_row(rotation_error.dot(dir), dir);
                        if let Some(stiffness) = entry.stiffness {
                            access.set_row_stiffness(stiffness);
                        }
                    }
                }
            }
        }

        if self.max_force.is_some_and(|max| total_squared.sqrt() > max) {
            broken = true;
        }
        broken
    }
}

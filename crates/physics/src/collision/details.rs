use std::cell::OnceCell;

use glam::Vec3;
use solver::ContactAccess;

use super::{flip_if, CollisionStart};
use crate::types::{BodyId, MaterialId};

/// One contact, as seen by a contact handler.
///
/// Geometry is queried from the solver on first access and cached, so a
/// handler reading several properties, or several handlers sharing one
/// contact, hit the solver once per property.
pub struct Contact<'a> {
    start: CollisionStart,
    flipped: bool,
    access: &'a dyn ContactAccess,
    position: OnceCell<Vec3>,
    normal: OnceCell<Vec3>,
    normal_speed: OnceCell<f32>,
    force: OnceCell<Vec3>,
    tangents: OnceCell<(Vec3, Vec3)>,
}

impl<'a> Contact<'a> {
    pub(crate) fn new(start: CollisionStart, flipped: bool, access: &'a dyn ContactAccess) -> Self {
        Self {
            start,
            flipped,
            access,
            position: OnceCell::new(),
            normal: OnceCell::new(),
            normal_speed: OnceCell::new(),
            force: OnceCell::new(),
            tangents: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn body_a(&self) -> Option<BodyId> {
        self.start.body_a
    }

    #[must_use]
    pub fn body_b(&self) -> Option<BodyId> {
        self.start.body_b
    }

    #[must_use]
    pub fn materials(&self) -> (MaterialId, MaterialId) {
        (self.start.material_a, self.start.material_b)
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        *self.position.get_or_init(|| self.access.position())
    }

    /// Unit normal pointing from `body_a` towards `body_b`.
    #[must_use]
    pub fn normal(&self) -> Vec3 {
        *self
            .normal
            .get_or_init(|| flip_if(self.flipped, self.access.normal()))
    }

    /// Approach speed along the normal; positive while closing.
    #[must_use]
    pub fn normal_speed(&self) -> f32 {
        *self.normal_speed.get_or_init(|| self.access.normal_speed())
    }

    /// Estimated force on `body_b`.
    #[must_use]
    pub fn force(&self) -> Vec3 {
        *self
            .force
            .get_or_init(|| flip_if(self.flipped, self.access.force()))
    }

    #[must_use]
    pub fn tangent_directions(&self) -> (Vec3, Vec3) {
        *self.tangents.get_or_init(|| {
            let (t1, t2) = self.access.tangent_directions();
            (flip_if(self.flipped, t1), t2)
        })
    }
}

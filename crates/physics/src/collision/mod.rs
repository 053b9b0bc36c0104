//! # Collision Events
//!
//! User-facing side of material-pair collision hooks. A hook may carry a
//! start handler, run once when a contact begins, and a contact handler, run
//! at most once per contact no matter how many manifold points the solver
//! reports. Either handler can veto the collision response.

mod details;
pub mod dispatcher;

use glam::Vec3;

use crate::types::{BodyId, MaterialId};

pub use details::Contact;
pub use dispatcher::CollisionEventDispatcher;

/// Handler verdict for a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContactResponse {
    #[default]
    Allow,
    /// Suppress the collision response for this contact.
    Veto,
}

impl ContactResponse {
    #[must_use]
    pub fn is_veto(self) -> bool {
        self == ContactResponse::Veto
    }
}

/// Bodies and materials of a beginning contact.
///
/// `body_a` always carries the lower material id. Boundary walls have no
/// world body and appear as `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionStart {
    pub body_a: Option<BodyId>,
    pub body_b: Option<BodyId>,
    pub material_a: MaterialId,
    pub material_b: MaterialId,
}

pub type StartHandler = Box<dyn FnMut(&CollisionStart) -> ContactResponse>;
pub type ContactHandler = Box<dyn FnMut(&Contact<'_>) -> ContactResponse>;

#[derive(Default)]
pub struct CollisionHook {
    pub(crate) on_start: Option<StartHandler>,
    pub(crate) on_contact: Option<ContactHandler>,
}

impl CollisionHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_start(mut self, handler: impl FnMut(&CollisionStart) -> ContactResponse + 'static) -> Self {
        self.on_start = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_contact(mut self, handler: impl FnMut(&Contact<'_>) -> ContactResponse + 'static) -> Self {
        self.on_contact = Some(Box::new(handler));
        self
    }
}

/// Canonical unordered material pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialPairKey(pub MaterialId, pub MaterialId);

impl MaterialPairKey {
    #[must_use]
    pub fn new(a: MaterialId, b: MaterialId) -> Self {
        if a <= b {
            MaterialPairKey(a, b)
        } else {
            MaterialPairKey(b, a)
        }
    }
}

/// Negates `v` when the pair was swapped into canonical order.
pub(crate) fn flip_if(flipped: bool, v: Vec3) -> Vec3 {
    if flipped {
        -v
    } else {
        v
    }
}

//! # Shared World Types
//!
//! Identifiers handed out by [`PhysicsWorld`](crate::PhysicsWorld) and the
//! plain data it returns from queries and updates.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId(pub u32);

/// Index into the material registry. `MaterialId(0)` is the default material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

impl MaterialId {
    pub const DEFAULT: MaterialId = MaterialId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub u32);

/// One edge of a boundary box, laid out for direct upload to a vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineSegment {
    pub from: [f32; 3],
    pub to: [f32; 3],
}

impl LineSegment {
    #[must_use]
    pub fn new(from: Vec3, to: Vec3) -> Self {
        Self {
            from: from.to_array(),
            to: to.to_array(),
        }
    }

    #[must_use]
    pub fn length(&self) -> f32 {
        Vec3::from(self.from).distance(Vec3::from(self.to))
    }
}

/// Edges of the collision boundary: the exact box and the outside of its walls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundaryEdges {
    pub inner: Vec<LineSegment>,
    pub outer: Vec<LineSegment>,
}

/// Body filter for ray casts.
#[derive(Clone, Copy, Debug, Default)]
pub enum RayFilter<'a> {
    #[default]
    All,
    Include(&'a [BodyId]),
    Exclude(&'a [BodyId]),
}

impl RayFilter<'_> {
    #[must_use]
    pub fn accepts(&self, body: BodyId) -> bool {
        match self {
            RayFilter::All => true,
            RayFilter::Include(bodies) => bodies.contains(&body),
            RayFilter::Exclude(bodies) => !bodies.contains(&body),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub body: BodyId,
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
    pub normal: Vec3,
    /// Parametric position of the hit along the cast, in `[0, 1]`.
    pub fraction: f32,
}

/// Payload of the world-stepped notification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldStepped {
    /// Simulated seconds covered by the update.
    pub elapsed: f32,
    pub frame: u64,
    pub substeps: usize,
}

/// What a single `update`/`advance` call did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateSummary {
    /// Duration of every native step, in order.
    pub substeps: Vec<f32>,
    /// Simulated seconds after applying the simulation speed.
    pub elapsed: f32,
    pub frame: u64,
    /// Bodies disposed by the post-step flush.
    pub disposed: usize,
}

impl UpdateSummary {
    /// Summary of an update that did nothing because the world is paused.
    #[must_use]
    pub fn idle(frame: u64) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.substeps.is_empty() && self.elapsed <= 0.0
    }
}

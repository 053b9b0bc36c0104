//! # Step Pipeline
//!
//! The pieces one `update` is made of: planning native sub-steps, the
//! framework force pass run for every body, and the bridge that routes the
//! solver's callbacks back into the world.

pub(crate) mod callbacks;
pub mod forces;

pub use forces::ForceEnvironment;

/// A trailing remainder at or below this fraction of a step is rounding
/// noise and is dropped rather than handed to the solver.
const REMAINDER_TOLERANCE: f32 = 1e-4;

/// Upper bound on native steps per update. Time beyond it is dropped.
pub const MAX_SUBSTEPS: usize = 4096;

/// Splits `elapsed` seconds into native steps of at most `max_step`.
///
/// Every step but the last is exactly `max_step`; the last carries the
/// remainder. Every planned step is positive. Non-positive or non-finite
/// input plans nothing, and plans longer than [`MAX_SUBSTEPS`] are cut short.
#[must_use]
pub fn plan_substeps(elapsed: f32, max_step: f32) -> Vec<f32> {
    if !(elapsed.is_finite() && elapsed > 0.0 && max_step.is_finite() && max_step > 0.0) {
        return Vec::new();
    }
    if elapsed <= max_step {
        return vec![elapsed];
    }

    let ratio = elapsed / max_step;
    #[allow(clippy::cast_precision_loss)]
    let limit = MAX_SUBSTEPS as f32;
    if ratio > limit {
        tracing::warn!(elapsed, max_step, limit = MAX_SUBSTEPS, "sub-step plan truncated");
        return vec![max_step; MAX_SUBSTEPS];
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut full = ratio.floor() as usize;
    #[allow(clippy::cast_precision_loss)]
    let mut remainder = elapsed - max_step * full as f32;
    if remainder < 0.0 {
        // The ratio rounded up past a whole number of steps.
        full -= 1;
        remainder += max_step;
    }

    let mut steps = vec![max_step; full];
    if remainder > max_step * REMAINDER_TOLERANCE {
        steps.push(remainder.min(max_step));
    }
    steps
}

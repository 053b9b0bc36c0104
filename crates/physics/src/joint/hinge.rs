//! Hinge angle tracking and limit enforcement.

use std::f32::consts::{PI, TAU};

use solver::HingeAccess;

/// Optional motion bounds of a hinge, in radians of accumulated rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HingeSettings {
    pub limits: Option<(f32, f32)>,
    /// Angle the hinge is driven towards and held at.
    pub target: Option<f32>,
}

impl HingeSettings {
    /// Angle the hinge must be stopped at for `angle`, if any.
    #[must_use]
    pub fn goal(&self, angle: f32) -> Option<f32> {
        match (self.target, self.limits) {
            (Some(target), Some((min, max))) => Some(target.clamp(min, max)),
            (Some(target), None) => Some(target),
            (None, Some((min, _))) if angle < min => Some(min),
            (None, Some((_, max))) if angle > max => Some(max),
            _ => None,
        }
    }
}

/// Wraps an angle into `(-pi, pi]`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Follows the raw native angle across the `pi` seam so the hinge can turn
/// any number of times.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct AngleTracker {
    accumulated: f32,
    last_raw: f32,
}

impl AngleTracker {
    pub(crate) fn update(&mut self, raw: f32) -> f32 {
        self.accumulated += wrap_angle(raw - self.last_raw);
        self.last_raw = raw;
        self.accumulated
    }

    /// A freshly built native hinge reports zero at its current pose.
    pub(crate) fn rebase(&mut self) {
        self.last_raw = 0.0;
    }

    pub(crate) fn angle(&self) -> f32 {
        self.accumulated
    }
}

/// Per-step hinge work: track the angle, then apply the stopping
/// acceleration towards the goal, scaled by `stiffness`.
pub(crate) fn hinge_step(
    settings: &HingeSettings,
    tracker: &mut AngleTracker,
    stiffness: f32,
    access: &mut dyn HingeAccess,
) {
    let raw = access.angle();
    let angle = tracker.update(raw);
    if let Some(goal) = settings.goal(angle) {
        let alpha = access.calculate_stop_alpha(raw + (goal - angle));
        access.set_acceleration(alpha * stiffness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHinge {
        angle: f32,
        alpha: Option<f32>,
    }

    impl HingeAccess for FakeHinge {
        fn angle(&self) -> f32 {
            self.angle
        }

        fn omega(&self) -> f32 {
            0.0
        }

        fn timestep(&self) -> f32 {
            0.1
        }

        fn calculate_stop_alpha(&self, angle: f32) -> f32 {
            (angle - self.angle) / 0.01
        }

        fn set_acceleration(&mut self, alpha: f32) {
            self.alpha = Some(alpha);
        }
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        assert!((wrap_angle(2.5 * PI) - 0.5 * PI).abs() < 1e-5);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-5);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tracker_accumulates_across_the_seam() {
        let mut tracker = AngleTracker::default();
        let mut raw = 0.0_f32;
        for _ in 0..40 {
            raw = wrap_angle(raw + 0.2);
            tracker.update(raw);
        }
        assert!((tracker.angle() - 8.0).abs() < 1e-3, "angle={}", tracker.angle());
    }

    #[test]
    fn limit_pushes_back_with_stiffness() {
        let settings = HingeSettings {
            limits: Some((-0.5, 0.5)),
            target: None,
        };
        let mut tracker = AngleTracker::default();
        let mut hinge = FakeHinge {
            angle: 0.7,
            alpha: None,
        };
        hinge_step(&settings, &mut tracker, 0.5, &mut hinge);
        let alpha = hinge.alpha.unwrap();
        assert!((alpha - 0.5 * (-0.2 / 0.01)).abs() < 1e-3);
    }

    #[test]
    fn within_limits_is_left_alone() {
        let settings = HingeSettings {
            limits: Some((-0.5, 0.5)),
            target: None,
        };
        let mut tracker = AngleTracker::default();
        let mut hinge = FakeHinge {
            angle: 0.2,
            alpha: None,
        };
        hinge_step(&settings, &mut tracker, 1.0, &mut hinge);
        assert!(hinge.alpha.is_none());
    }

    #[test]
    fn target_is_clamped_into_limits() {
        let settings = HingeSettings {
            limits: Some((0.0, 1.0)),
            target: Some(2.0),
        };
        assert_eq!(settings.goal(0.3), Some(1.0));
    }
}

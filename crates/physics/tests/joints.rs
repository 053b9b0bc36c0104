//! Joint lifecycle against the reference engine.

use physics::{
    BodyDescription, BodyId, BreakStrategy, ConstraintRow, JointKind, JointState, ManualClock,
    PhysicsError, PhysicsWorld, RowSpec, UserBilateralConstraint, Vec3, WorldConfig,
};
use solver::ReferenceSolver;

/// A static anchor at the origin and a unit-mass bob one unit along +X.
fn pendulum() -> (PhysicsWorld, BodyId, BodyId) {
    let (clock, _handle) = ManualClock::new();
    let mut world = PhysicsWorld::with_solver(
        &WorldConfig::default(),
        Box::new(ReferenceSolver::new()),
        Box::new(clock),
    )
    .unwrap();
    world.unpause();
    let anchor = world
        .add_body(&BodyDescription::sphere(0.1).with_mass(0.0))
        .unwrap();
    let bob = world
        .add_body(&BodyDescription::sphere(0.1).at(Vec3::X))
        .unwrap();
    (world, anchor, bob)
}

fn weld() -> UserBilateralConstraint {
    UserBilateralConstraint::new(6)
        .with_row(ConstraintRow::PointToPoint {
            parent_pivot: Vec3::new(0.5, 0.0, 0.0),
            child_pivot: Vec3::new(-0.5, 0.0, 0.0),
        })
        .with_row(ConstraintRow::AngularLock)
}

#[test]
fn batched_changes_rebuild_once() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let hinge = world.connect(JointKind::hinge(Vec3::ZERO, Vec3::Z), anchor, bob)?;

    {
        let mut joint = world.joint_mut(hinge)?;
        joint.begin_update();
        joint.set_pivot(Vec3::new(0.1, 0.0, 0.0))?;
        joint.set_axis(Vec3::Y)?;
        joint.set_hinge_limits(Some((-0.5, 0.5)))?;
        assert!(world.joint(hinge)?.pending_rebuild);
    }
    assert_eq!(world.joint(hinge)?.rebuild_count, 0);
    world.joint_mut(hinge)?.end_update()?;

    let info = world.joint(hinge)?;
    assert_eq!(info.rebuild_count, 1);
    assert!(!info.pending_rebuild);
    assert_eq!(world.solver()?.joint_count(), 1);
    Ok(())
}

#[test]
fn unbatched_changes_rebuild_each_time() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let hinge = world.connect(JointKind::hinge(Vec3::ZERO, Vec3::Z), anchor, bob)?;
    let mut joint = world.joint_mut(hinge)?;
    joint.set_pivot(Vec3::new(0.1, 0.0, 0.0))?;
    joint.set_axis(Vec3::Y)?;
    joint.set_hinge_limits(Some((-0.5, 0.5)))?;
    // Targets and collision do not touch the native geometry.
    joint.set_hinge_target(Some(0.2))?;
    joint.set_collision_state(true)?;
    assert_eq!(world.joint(hinge)?.rebuild_count, 3);
    assert!(world.joint(hinge)?.collision);
    Ok(())
}

#[test]
fn initialise_rules() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let joint = world.create_joint(JointKind::BallSocket { pivot: Vec3::ZERO })?;
    assert_eq!(world.joint(joint)?.state, JointState::Uninitialized);

    world.initialise_joint(joint, anchor, bob)?;
    world.initialise_joint(joint, anchor, bob)?;
    assert_eq!(
        world.initialise_joint(joint, bob, anchor),
        Err(PhysicsError::JointAlreadyInitialised(joint))
    );
    assert_eq!(world.solver()?.joint_count(), 1);

    let stray = world.create_joint(JointKind::BallSocket { pivot: Vec3::ZERO })?;
    assert!(matches!(
        world.initialise_joint(stray, anchor, BodyId(99)),
        Err(PhysicsError::JointPrecondition { .. })
    ));
    assert!(world.connect(JointKind::BallSocket { pivot: Vec3::ZERO }, anchor, anchor).is_err());
    Ok(())
}

#[test]
fn scope_and_dispose_misuse_is_reported() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let joint = world.connect(JointKind::BallSocket { pivot: Vec3::ZERO }, anchor, bob)?;

    assert_eq!(
        world.joint_mut(joint)?.end_update(),
        Err(PhysicsError::UnbalancedUpdate(joint))
    );
    assert!(world.joint_mut(joint)?.set_stiffness(-0.1).is_err());
    assert!(world.joint_mut(joint)?.set_axis(Vec3::Y).is_err());

    world.dispose_joint(joint)?;
    assert_eq!(world.dispose_joint(joint), Err(PhysicsError::JointDisposed(joint)));
    assert_eq!(world.rebuild_joint(joint), Err(PhysicsError::JointDisposed(joint)));
    assert_eq!(world.solver()?.joint_count(), 0);
    Ok(())
}

#[test]
fn hinge_limits_hold_the_pendulum() -> anyhow::Result<()> {
    let (mut free_world, anchor, bob) = pendulum();
    let free = free_world.connect(JointKind::hinge(Vec3::ZERO, Vec3::Z), anchor, bob)?;

    let (mut limited_world, anchor, bob) = pendulum();
    let limited = limited_world.connect(JointKind::hinge(Vec3::ZERO, Vec3::Z), anchor, bob)?;
    limited_world
        .joint_mut(limited)?
        .set_hinge_limits(Some((-0.3, 0.3)))?;

    let (mut free_swing, mut limited_swing) = (0.0_f32, 0.0_f32);
    for _ in 0..60 {
        free_world.advance(1.0 / 60.0)?;
        limited_world.advance(1.0 / 60.0)?;
        free_swing = free_swing.max(free_world.joint(free)?.hinge_angle.unwrap_or(0.0).abs());
        limited_swing = limited_swing.max(limited_world.joint(limited)?.hinge_angle.unwrap_or(0.0).abs());
    }
    assert!(free_swing > 0.8, "free swing {free_swing}");
    assert!(limited_swing < 0.6, "limited swing {limited_swing}");
    Ok(())
}

#[test]
fn weld_keeps_the_child_in_place() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let joint = world.connect(JointKind::UserBilateral(weld()), anchor, bob)?;
    for _ in 0..60 {
        world.advance(1.0 / 60.0)?;
    }
    let position = world.body(bob)?.position();
    assert!((position - Vec3::X).length() < 0.3, "position={position}");
    assert!(!world.joint(joint)?.broken);
    Ok(())
}

#[test]
fn user_constraint_dof_is_checked_on_build() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let joint = world.create_joint(JointKind::UserBilateral(
        UserBilateralConstraint::new(4).with_row(ConstraintRow::PointToPoint {
            parent_pivot: Vec3::ZERO,
            child_pivot: Vec3::ZERO,
        }),
    ))?;
    assert_eq!(
        world.initialise_joint(joint, anchor, bob),
        Err(PhysicsError::DofMismatch {
            expected: 4,
            actual: 3
        })
    );
    world
        .joint_mut(joint)?
        .add_row(ConstraintRow::AngularAxis { axis: Vec3::Z })?;
    world.initialise_joint(joint, anchor, bob)?;

    // Dropping a row while active forces a rebuild, which now fails.
    let removed = world.joint_mut(joint)?.remove_row(1);
    assert!(matches!(removed, Err(PhysicsError::DofMismatch { .. })));
    assert_eq!(world.joint(joint)?.state, JointState::Uninitialized);
    assert_eq!(world.solver()?.joint_count(), 0);
    Ok(())
}

#[test]
fn overloaded_weld_breaks_after_the_step() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let joint = world.connect(
        JointKind::UserBilateral(weld().with_max_force(1e-3)),
        anchor,
        bob,
    )?;
    // Three native micro-steps: the second sees the forces of the first.
    world.advance(0.05)?;

    let info = world.joint(joint)?;
    assert!(info.broken);
    assert!(info.collision);
    assert_eq!(info.state, JointState::Initialized);
    Ok(())
}

#[test]
fn row_limit_with_dispose_strategy_removes_the_joint() -> anyhow::Result<()> {
    let (mut world, anchor, bob) = pendulum();
    let constraint = UserBilateralConstraint::new(3)
        .with_row(
            RowSpec::from(ConstraintRow::PointToPoint {
                parent_pivot: Vec3::new(0.5, 0.0, 0.0),
                child_pivot: Vec3::new(-0.5, 0.0, 0.0),
            })
            .with_max_force(1e-3),
        )
        .with_break_strategy(BreakStrategy::Dispose);
    let joint = world.connect(JointKind::UserBilateral(constraint), anchor, bob)?;

    world.advance(0.05)?;
    assert_eq!(world.joint(joint), Err(PhysicsError::JointDisposed(joint)));
    assert!(world.joint_ids().is_empty());
    assert_eq!(world.solver()?.joint_count(), 0);
    Ok(())
}

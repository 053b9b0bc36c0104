//! Turning elapsed time into native sub-steps.

use std::cell::RefCell;
use std::rc::Rc;

use physics::{
    BodyDescription, ClockHandle, ManualClock, PhysicsWorld, Vec3, WorldConfig, WorldStepped,
    MAX_STEP_SECONDS,
};
use solver::ReferenceSolver;

fn running_world() -> (PhysicsWorld, ClockHandle) {
    let (clock, handle) = ManualClock::new();
    let mut world = PhysicsWorld::with_solver(
        &WorldConfig::default(),
        Box::new(ReferenceSolver::new()),
        Box::new(clock),
    )
    .unwrap();
    world.unpause();
    (world, handle)
}

/// Records the timestep of every force callback the body receives.
fn timestep_log(world: &mut PhysicsWorld) -> Rc<RefCell<Vec<f32>>> {
    let body = world
        .add_body(&BodyDescription::sphere(0.5).without_gravity())
        .unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    world
        .on_apply_force(body, move |ctx| sink.borrow_mut().push(ctx.timestep()))
        .unwrap();
    log
}

#[test]
fn long_frame_is_split_into_bounded_steps() {
    let (mut world, clock) = running_world();
    clock.advance(0.13);
    let summary = world.update().unwrap();

    assert_eq!(summary.substeps.len(), 3);
    assert!((summary.substeps[0] - MAX_STEP_SECONDS).abs() < f32::EPSILON);
    assert!((summary.substeps[1] - MAX_STEP_SECONDS).abs() < f32::EPSILON);
    assert!((summary.substeps[2] - 0.03).abs() < 1e-5);
    assert_eq!(summary.frame, 1);
}

#[test]
fn short_frame_takes_one_step() {
    let (mut world, clock) = running_world();
    clock.advance(1.0 / 60.0);
    let summary = world.update().unwrap();
    assert_eq!(summary.substeps.len(), 1);
}

#[test]
fn simulated_time_matches_elapsed_time() {
    let (mut world, _clock) = running_world();
    let log = timestep_log(&mut world);
    for elapsed in [0.013, 0.05, 0.137, 0.4] {
        log.borrow_mut().clear();
        world.advance(elapsed).unwrap();
        let total: f32 = log.borrow().iter().sum();
        assert!((total - elapsed).abs() < 1e-4, "elapsed={elapsed} total={total}");
        assert!(log.borrow().iter().all(|dt| *dt <= 1.0 / 60.0 + 1e-6));
    }
}

#[test]
fn clock_is_rearmed_by_update() {
    let (mut world, clock) = running_world();
    clock.advance(0.2);
    world.update().unwrap();
    assert_eq!(clock.pending(), 0.0);

    let summary = world.update().unwrap();
    assert!(summary.substeps.is_empty());
    assert_eq!(summary.frame, 1);
}

#[test]
fn advance_leaves_the_clock_alone() {
    let (mut world, clock) = running_world();
    clock.advance(0.02);
    world.advance(0.1).unwrap();
    assert!((clock.pending() - 0.02).abs() < f32::EPSILON);
}

#[test]
fn simulation_speed_scales_steps() {
    let (mut world, _clock) = running_world();
    world.set_simulation_speed(0.5).unwrap();
    let summary = world.advance(0.2).unwrap();
    assert!((summary.elapsed - 0.1).abs() < 1e-6);
    assert_eq!(summary.substeps.len(), 2);
}

#[test]
fn paused_world_does_not_step() {
    let (mut world, clock) = running_world();
    let log = timestep_log(&mut world);
    world.pause();
    world.pause();
    clock.advance(0.1);
    assert!(world.update().unwrap().is_idle());
    assert!(world.advance(0.1).unwrap().is_idle());
    assert!(log.borrow().is_empty());
    assert_eq!(world.frame(), 0);
}

#[test]
fn stepped_listeners_see_every_stepping_update() {
    let (mut world, _clock) = running_world();
    let events: Rc<RefCell<Vec<WorldStepped>>> = Rc::default();
    let sink = Rc::clone(&events);
    world.on_stepped(move |event| sink.borrow_mut().push(*event));

    world.advance(0.12).unwrap();
    world.advance(0.0).unwrap();
    world.advance(0.01).unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].frame, 1);
    assert_eq!(events[0].substeps, 3);
    assert!((events[0].elapsed - 0.12).abs() < 1e-6);
    assert_eq!(events[1].frame, 2);
}

#[test]
fn invalid_elapsed_is_rejected() {
    let (mut world, _clock) = running_world();
    assert!(world.advance(-0.1).is_err());
    assert!(world.advance(f32::NAN).is_err());
    let body = world.add_body(&BodyDescription::sphere(0.5)).unwrap();
    assert_eq!(world.body(body).unwrap().position(), Vec3::ZERO);
}

#[test]
fn whole_multiples_of_the_step_update_cleanly() {
    let (mut world, clock) = running_world();
    let _log = timestep_log(&mut world);

    clock.advance(42.0 * MAX_STEP_SECONDS);
    let summary = world.update().unwrap();
    assert_eq!(summary.substeps.len(), 42);
    assert!(summary.substeps.iter().all(|&dt| dt > 0.0));
    assert_eq!(summary.frame, 1);

    world.set_simulation_speed(42.0).unwrap();
    let summary = world.advance(MAX_STEP_SECONDS).unwrap();
    assert!(summary.substeps.iter().all(|&dt| dt > 0.0));
    assert_eq!(summary.frame, 2);
}

//! Collision hooks driven by real contacts in the reference engine.

use std::cell::RefCell;
use std::rc::Rc;

use physics::{
    BodyDescription, BodyId, CollisionHook, ContactResponse, ManualClock, MaterialDefinition,
    MaterialId, PhysicsWorld, Vec3, WorldConfig,
};
use solver::ReferenceSolver;

type Log = Rc<RefCell<Vec<String>>>;

struct Scene {
    world: PhysicsWorld,
    floor_material: MaterialId,
    box_material: MaterialId,
    floor: BodyId,
    crate_body: BodyId,
}

/// A static slab of one material with a box of another already touching it,
/// so the first step reports a four-point manifold.
fn scene() -> Scene {
    let (clock, _handle) = ManualClock::new();
    let mut world = PhysicsWorld::with_solver(
        &WorldConfig::default(),
        Box::new(ReferenceSolver::new()),
        Box::new(clock),
    )
    .unwrap();
    world.unpause();
    let floor_material = world.add_material(MaterialDefinition::default()).unwrap();
    let box_material = world.add_material(MaterialDefinition::default()).unwrap();
    let floor = world
        .add_body(
            &BodyDescription::cuboid(Vec3::new(5.0, 0.5, 5.0))
                .with_mass(0.0)
                .with_material(floor_material),
        )
        .unwrap();
    let crate_body = world
        .add_body(
            &BodyDescription::cuboid(Vec3::splat(0.5))
                .at(Vec3::new(0.0, 0.98, 0.0))
                .with_material(box_material),
        )
        .unwrap();
    Scene {
        world,
        floor_material,
        box_material,
        floor,
        crate_body,
    }
}

fn logging_hook(log: &Log, name: &'static str, start: ContactResponse, contact: ContactResponse) -> CollisionHook {
    let (on_start, on_contact) = (Rc::clone(log), Rc::clone(log));
    CollisionHook::new()
        .on_start(move |_| {
            on_start.borrow_mut().push(format!("{name}:start"));
            start
        })
        .on_contact(move |_| {
            on_contact.borrow_mut().push(format!("{name}:contact"));
            contact
        })
}

#[test]
fn start_precedes_a_single_contact_event() {
    let mut s = scene();
    let log = Log::default();
    s.world
        .register_collision_hook(
            s.box_material,
            s.floor_material,
            logging_hook(&log, "hook", ContactResponse::Allow, ContactResponse::Allow),
        )
        .unwrap();

    // One native step, one engine micro-step, four manifold points.
    s.world.advance(1.0 / 60.0).unwrap();
    assert_eq!(*log.borrow(), vec!["hook:start", "hook:contact"]);
}

#[test]
fn bodies_arrive_ordered_by_material() {
    let mut s = scene();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (starts, contacts) = (Rc::clone(&seen), Rc::clone(&seen));
    let hook = CollisionHook::new()
        .on_start(move |start| {
            starts.borrow_mut().push((start.body_a, start.body_b, None));
            ContactResponse::Allow
        })
        .on_contact(move |contact| {
            let normal = contact.normal();
            contacts
                .borrow_mut()
                .push((contact.body_a(), contact.body_b(), Some(normal)));
            ContactResponse::Allow
        });
    // Registered with the materials swapped on purpose.
    s.world
        .register_collision_hook(s.box_material, s.floor_material, hook)
        .unwrap();
    s.world.advance(1.0 / 60.0).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    for (a, b, _) in seen.iter() {
        assert_eq!(*a, Some(s.floor));
        assert_eq!(*b, Some(s.crate_body));
    }
    let normal = seen[1].2.unwrap();
    assert!(normal.y > 0.9, "normal={normal}");
}

#[test]
fn start_veto_suppresses_contact_and_response() {
    let mut s = scene();
    let log = Log::default();
    s.world
        .register_collision_hook(
            s.floor_material,
            s.box_material,
            logging_hook(&log, "hook", ContactResponse::Veto, ContactResponse::Allow),
        )
        .unwrap();

    for _ in 0..30 {
        s.world.advance(1.0 / 60.0).unwrap();
    }
    assert!(log.borrow().iter().all(|entry| entry == "hook:start"));
    assert!(!log.borrow().is_empty());
    // Nothing holds the box up.
    assert!(s.world.body(s.crate_body).unwrap().position().y < 0.5);
}

#[test]
fn contact_veto_lets_the_box_sink() {
    let mut s = scene();
    let log = Log::default();
    s.world
        .register_collision_hook(
            s.floor_material,
            s.box_material,
            logging_hook(&log, "hook", ContactResponse::Allow, ContactResponse::Veto),
        )
        .unwrap();
    s.world.advance(1.0 / 60.0).unwrap();
    assert_eq!(*log.borrow(), vec!["hook:start", "hook:contact"]);

    for _ in 0..30 {
        s.world.advance(1.0 / 60.0).unwrap();
    }
    assert!(s.world.body(s.crate_body).unwrap().position().y < 0.5);
}

#[test]
fn every_subscriber_gets_its_own_events() {
    let mut s = scene();
    let log = Log::default();
    for name in ["first", "second"] {
        s.world
            .register_collision_hook(
                s.floor_material,
                s.box_material,
                logging_hook(&log, name, ContactResponse::Allow, ContactResponse::Allow),
            )
            .unwrap();
    }
    assert_eq!(s.world.collision_hook_count(s.box_material, s.floor_material), 2);

    s.world.advance(1.0 / 60.0).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["first:start", "second:start", "first:contact", "second:contact"]
    );
}

#[test]
fn removing_the_last_hook_silences_the_pair() {
    let mut s = scene();
    let log = Log::default();
    let id = s
        .world
        .register_collision_hook(
            s.floor_material,
            s.box_material,
            logging_hook(&log, "hook", ContactResponse::Allow, ContactResponse::Allow),
        )
        .unwrap();
    s.world.remove_collision_hook(id).unwrap();
    assert!(s.world.remove_collision_hook(id).is_err());

    for _ in 0..5 {
        s.world.advance(1.0 / 60.0).unwrap();
    }
    assert!(log.borrow().is_empty());
    // Contacts still resolve without a hook.
    assert!(s.world.body(s.crate_body).unwrap().position().y > 0.8);
}

#[test]
fn boundary_walls_have_no_body() {
    let (clock, _handle) = ManualClock::new();
    let mut world = PhysicsWorld::with_solver(
        &WorldConfig::default(),
        Box::new(ReferenceSolver::new()),
        Box::new(clock),
    )
    .unwrap();
    world.unpause();
    world
        .set_collision_boundary(Vec3::splat(-2.0), Vec3::splat(2.0))
        .unwrap();
    let ball = world
        .add_body(&BodyDescription::sphere(0.5).at(Vec3::new(0.0, -1.6, 0.0)))
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    world
        .register_collision_hook(
            MaterialId::DEFAULT,
            MaterialId::DEFAULT,
            CollisionHook::new().on_start(move |start| {
                sink.borrow_mut().push((start.body_a, start.body_b));
                ContactResponse::Allow
            }),
        )
        .unwrap();
    world.advance(1.0 / 60.0).unwrap();

    let seen = seen.borrow();
    assert!(!seen.is_empty());
    assert!(seen
        .iter()
        .all(|&(a, b)| (a, b) == (Some(ball), None) || (a, b) == (None, Some(ball))));
}

#[test]
fn one_veto_does_not_silence_other_subscribers() {
    let mut s = scene();
    let log = Log::default();
    s.world
        .register_collision_hook(
            s.floor_material,
            s.box_material,
            logging_hook(&log, "vetoer", ContactResponse::Veto, ContactResponse::Allow),
        )
        .unwrap();
    s.world
        .register_collision_hook(
            s.floor_material,
            s.box_material,
            logging_hook(&log, "observer", ContactResponse::Allow, ContactResponse::Allow),
        )
        .unwrap();

    s.world.advance(1.0 / 60.0).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["vetoer:start", "observer:start", "observer:contact"]
    );

    // The veto still removes the response.
    for _ in 0..30 {
        s.world.advance(1.0 / 60.0).unwrap();
    }
    assert!(!log.borrow().iter().any(|entry| entry == "vetoer:contact"));
    assert!(s.world.body(s.crate_body).unwrap().position().y < 0.5);
}

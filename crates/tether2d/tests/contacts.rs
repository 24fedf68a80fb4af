//! Integration tests for contact dispatch and the deferred-change queue.

use std::sync::{Arc, Mutex};

use glam::Vec2;
use tether2d::{
    BodyDef, BodyId, Contact, ContactCallbacks, ContactDelegate, FixtureDef, JointType, Shape,
    World,
};

type Action = Box<dyn FnMut(&mut World) + Send>;

const DT: f32 = 1.0 / 60.0;

/// A static floor with its top at y = 16 and a ball resting 8 points above it.
fn floor_and_ball(world: &mut World, sensor_floor: bool) -> (BodyId, BodyId) {
    let floor = world.spawn_body(BodyDef::fixed(Vec2::ZERO));
    world
        .attach_fixture(
            floor,
            FixtureDef::new(Shape::rect(Vec2::new(320.0, 32.0)).unwrap()).with_sensor(sensor_floor),
        )
        .unwrap();
    let ball = world.spawn_body(BodyDef::dynamic(Vec2::new(0.0, 40.0)));
    world
        .attach_fixture(ball, FixtureDef::new(Shape::circle(16.0).unwrap()))
        .unwrap();
    (floor, ball)
}

#[derive(Default)]
struct Log {
    began: usize,
    ended: usize,
    pre_solve: usize,
    sensor_seen: bool,
    member_during_callback: Option<bool>,
    locked_during_callback: Option<bool>,
    frozen_rejected: Option<bool>,
    enabled_seen: Vec<bool>,
}

struct Recorder {
    log: Arc<Mutex<Log>>,
    remove_on_begin: Option<BodyId>,
    also_remove: Option<BodyId>,
    disable_in_pre_solve: bool,
    callbacks: ContactCallbacks,
}

impl Recorder {
    fn new(log: Arc<Mutex<Log>>) -> Self {
        Self {
            log,
            remove_on_begin: None,
            also_remove: None,
            disable_in_pre_solve: false,
            callbacks: ContactCallbacks::ALL,
        }
    }
}

impl ContactDelegate for Recorder {
    fn callbacks(&self) -> ContactCallbacks {
        self.callbacks
    }

    fn contact_began(&mut self, world: &mut World, contact: &Contact) {
        let mut log = self.log.lock().unwrap();
        log.began += 1;
        log.sensor_seen |= contact.is_sensor();
        log.enabled_seen.push(contact.is_enabled());
        log.locked_during_callback = Some(world.is_locked());
        if let Some(body) = self.remove_on_begin {
            world.remove_body(body).unwrap();
            log.member_during_callback = Some(world.contains_body(body));
            if let Some(other) = self.also_remove {
                world.remove_body(other).unwrap();
            }
        }
    }

    fn contact_ended(&mut self, _world: &mut World, contact: &Contact) {
        let mut log = self.log.lock().unwrap();
        log.ended += 1;
        log.sensor_seen |= contact.is_sensor();
    }

    fn contact_pre_solve(&mut self, contact: &mut Contact) {
        let mut log = self.log.lock().unwrap();
        log.pre_solve += 1;
        if self.disable_in_pre_solve {
            assert!(contact.is_modifiable());
            assert!(contact.set_enabled(false));
            assert!(contact.set_enabled(true));
            assert!(contact.set_enabled(false));
        }
    }
}

fn step_until(world: &mut World, steps: usize, mut done: impl FnMut(&World) -> bool) -> bool {
    for _ in 0..steps {
        world.step(DT, 8, 3);
        if done(world) {
            return true;
        }
    }
    false
}

#[test]
fn ball_landing_fires_begin_and_pre_solve() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    let log = Arc::new(Mutex::new(Log::default()));
    world.set_delegate(Recorder::new(log.clone()));

    let landed = step_until(&mut world, 120, |_| log.lock().unwrap().began > 0);
    assert!(landed, "ball never touched the floor");

    let log = log.lock().unwrap();
    assert!(log.pre_solve > 0, "pre-solve runs for touching pairs");
    assert_eq!(log.locked_during_callback, Some(true));
    assert!(log.enabled_seen.iter().all(|e| *e));
    assert!(world.body(ball).unwrap().position().y > 16.0, "ball rests on the floor");
}

#[test]
fn removing_a_body_from_a_contact_callback_is_deferred() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    let log = Arc::new(Mutex::new(Log::default()));
    let mut recorder = Recorder::new(log.clone());
    recorder.remove_on_begin = Some(ball);
    world.set_delegate(recorder);

    let landed = step_until(&mut world, 120, |_| log.lock().unwrap().began > 0);
    assert!(landed, "ball never touched the floor");

    assert_eq!(
        log.lock().unwrap().member_during_callback,
        Some(true),
        "body stays in the world until the step returns"
    );
    assert!(!world.contains_body(ball));
    assert!(!world.body(ball).unwrap().is_operational());
    assert!(!world.is_locked());
}

#[test]
fn disabled_contacts_let_the_ball_fall_through() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    let log = Arc::new(Mutex::new(Log::default()));
    let mut recorder = Recorder::new(log.clone());
    recorder.disable_in_pre_solve = true;
    world.set_delegate(recorder);

    for _ in 0..120 {
        world.step(DT, 8, 3);
    }
    let y = world.body(ball).unwrap().position().y;
    assert!(y < -32.0, "ball should pass through the floor: y={}", y);

    let log = log.lock().unwrap();
    assert!(log.pre_solve > 0);
    assert!(
        log.enabled_seen.iter().all(|e| !*e),
        "begin sees the last pre-solve decision: {:?}",
        log.enabled_seen
    );
}

#[test]
fn delegate_without_pre_solve_is_never_asked() {
    let mut world = World::default();
    floor_and_ball(&mut world, false);
    let log = Arc::new(Mutex::new(Log::default()));
    let mut recorder = Recorder::new(log.clone());
    recorder.callbacks = ContactCallbacks {
        pre_solve: false,
        ..ContactCallbacks::ALL
    };
    world.set_delegate(recorder);

    let landed = step_until(&mut world, 120, |_| log.lock().unwrap().began > 0);
    assert!(landed);
    assert_eq!(log.lock().unwrap().pre_solve, 0);
}

#[test]
fn sensor_reports_begin_and_end() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, true);
    let log = Arc::new(Mutex::new(Log::default()));
    world.set_delegate(Recorder::new(log.clone()));

    let left = step_until(&mut world, 240, |_| log.lock().unwrap().ended > 0);
    assert!(left, "ball never left the sensor");

    let log = log.lock().unwrap();
    assert_eq!(log.began, 1);
    assert_eq!(log.ended, 1);
    assert!(log.sensor_seen);
    assert!(world.body(ball).unwrap().position().y < -16.0);
}

#[test]
fn frozen_contact_rejects_changes() {
    struct TryMutate(Arc<Mutex<Log>>);

    impl ContactDelegate for TryMutate {
        fn contact_began(&mut self, _world: &mut World, contact: &Contact) {
            // Begin contacts are shared, so only a copy could be mutated;
            // the flag itself reports the freeze.
            self.0.lock().unwrap().frozen_rejected = Some(!contact.is_modifiable());
        }
    }

    let mut world = World::default();
    floor_and_ball(&mut world, false);
    let log = Arc::new(Mutex::new(Log::default()));
    world.set_delegate(TryMutate(log.clone()));
    step_until(&mut world, 120, |_| log.lock().unwrap().frozen_rejected.is_some());
    assert_eq!(log.lock().unwrap().frozen_rejected, Some(true));
}

#[test]
fn joint_with_both_endpoints_removed_mid_step_waits() {
    let mut world = World::default();
    let (floor, ball) = floor_and_ball(&mut world, false);
    let joint = world.constrain(floor, ball, JointType::Rope).unwrap();
    assert!(world.joint(joint).unwrap().is_operational());

    let log = Arc::new(Mutex::new(Log::default()));
    let mut recorder = Recorder::new(log.clone());
    recorder.remove_on_begin = Some(ball);
    recorder.also_remove = Some(floor);
    world.set_delegate(recorder);

    let landed = step_until(&mut world, 120, |_| log.lock().unwrap().began > 0);
    assert!(landed);
    assert_eq!(world.body_count(), 0);

    let j = world.joint(joint).unwrap();
    assert!(!j.is_operational(), "joint is disassembled with its endpoints");
    assert_eq!(world.body(floor).unwrap().joint_edges().len(), 1);
    assert_eq!(world.body(ball).unwrap().joint_edges().len(), 1);

    world.clear_delegate();
    world.add_body(floor).unwrap();
    assert!(!world.joint(joint).unwrap().is_operational());
    world.add_body(ball).unwrap();
    assert!(world.joint(joint).unwrap().is_operational());
}

#[test]
fn replacing_the_delegate_mid_dispatch_sticks() {
    struct Swapper(Arc<Mutex<Log>>);

    impl ContactDelegate for Swapper {
        fn contact_began(&mut self, world: &mut World, _contact: &Contact) {
            self.0.lock().unwrap().began += 1;
            let mut next = Recorder::new(self.0.clone());
            next.callbacks = ContactCallbacks::NONE;
            world.set_delegate(next);
        }
    }

    let mut world = World::default();
    floor_and_ball(&mut world, false);
    let log = Arc::new(Mutex::new(Log::default()));
    world.set_delegate(Swapper(log.clone()));

    step_until(&mut world, 120, |_| log.lock().unwrap().began > 0);
    for _ in 0..30 {
        world.step(DT, 8, 3);
    }
    assert!(world.has_delegate());
    assert_eq!(log.lock().unwrap().began, 1, "the replacement ignores contacts");
}

/// Runs `action` once, from the first `contact_began` it sees.
struct OnFirstContact {
    action: Option<Action>,
    fired: Arc<Mutex<bool>>,
}

impl ContactDelegate for OnFirstContact {
    fn contact_began(&mut self, world: &mut World, _contact: &Contact) {
        if let Some(mut action) = self.action.take() {
            action(world);
            *self.fired.lock().unwrap() = true;
        }
    }
}

/// Step until the ball lands and `action` has run inside that step.
fn on_landing(world: &mut World, action: impl FnMut(&mut World) + Send + 'static) {
    let fired = Arc::new(Mutex::new(false));
    world.set_delegate(OnFirstContact {
        action: Some(Box::new(action)),
        fired: fired.clone(),
    });
    let landed = step_until(world, 120, |_| *fired.lock().unwrap());
    assert!(landed, "ball never touched the floor");
    assert!(!world.is_locked());
}

#[test]
fn body_added_and_removed_in_one_callback_ends_outside() {
    let mut world = World::default();
    floor_and_ball(&mut world, false);
    let created = Arc::new(Mutex::new(None));
    let slot = created.clone();
    on_landing(&mut world, move |world| {
        let body = world.create_body(BodyDef::dynamic(Vec2::new(0.0, 200.0)));
        world.add_body(body).unwrap();
        world.remove_body(body).unwrap();
        *slot.lock().unwrap() = Some(body);
    });

    let body = created.lock().unwrap().unwrap();
    assert!(!world.contains_body(body));
    assert!(!world.body(body).unwrap().is_operational());
    assert_eq!(world.body_count(), 2);
}

#[test]
fn remove_add_remove_in_one_callback_ends_outside() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    on_landing(&mut world, move |world| {
        world.remove_body(ball).unwrap();
        world.add_body(ball).unwrap();
        world.remove_body(ball).unwrap();
        assert!(world.contains_body(ball));
    });
    assert!(!world.contains_body(ball));
    assert!(!world.body(ball).unwrap().is_operational());
}

#[test]
fn fixture_removed_from_callback_detaches_after_the_step() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    let fixture = world.body(ball).unwrap().fixtures()[0];
    let seen = Arc::new(Mutex::new(None));
    let record = seen.clone();
    on_landing(&mut world, move |world| {
        world.remove_fixture(ball, fixture).unwrap();
        let state = world.fixture(fixture).unwrap();
        *record.lock().unwrap() = Some((state.body(), state.is_operational()));
    });

    assert_eq!(*seen.lock().unwrap(), Some((Some(ball), true)));
    let state = world.fixture(fixture).unwrap();
    assert_eq!(state.body(), None);
    assert!(!state.is_operational());
    assert!(world.body(ball).unwrap().fixtures().is_empty());
}

#[test]
fn remove_all_fixtures_from_callback_is_deferred() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    let extra = world
        .attach_fixture(ball, FixtureDef::new(Shape::circle(4.0).unwrap()))
        .unwrap();
    let first = world.body(ball).unwrap().fixtures()[0];
    let seen = Arc::new(Mutex::new(0));
    let record = seen.clone();
    on_landing(&mut world, move |world| {
        world.remove_all_fixtures(ball).unwrap();
        *record.lock().unwrap() = world.body(ball).unwrap().fixtures().len();
    });

    assert_eq!(*seen.lock().unwrap(), 2, "both stay attached during the callback");
    assert!(world.body(ball).unwrap().fixtures().is_empty());
    for fixture in [first, extra] {
        let state = world.fixture(fixture).unwrap();
        assert_eq!(state.body(), None);
        assert!(!state.is_operational());
    }
}

#[test]
fn break_constraint_from_callback_frees_the_joint_after_the_step() {
    let mut world = World::default();
    let (_, ball) = floor_and_ball(&mut world, false);
    // Slides along the vertical line through the ball, so it can still land.
    let rail = world.spawn_body(BodyDef::fixed(Vec2::new(0.0, 200.0)));
    let joint = world.constrain(rail, ball, JointType::Prismatic).unwrap();
    let seen = Arc::new(Mutex::new(None));
    let record = seen.clone();
    on_landing(&mut world, move |world| {
        let broken = world.break_constraint(ball, rail).unwrap();
        let j = world.joint(joint).unwrap();
        *record.lock().unwrap() = Some((broken, j.is_operational()));
    });

    assert_eq!(*seen.lock().unwrap(), Some((1, true)));
    assert!(world.joint(joint).is_none());
    assert_eq!(world.joint_count(), 0);
    assert!(world.body(ball).unwrap().joint_edges().is_empty());
    assert!(world.body(rail).unwrap().joint_edges().is_empty());
}

#[test]
fn destroy_body_from_callback_frees_everything_after_the_step() {
    let mut world = World::default();
    let (floor, ball) = floor_and_ball(&mut world, false);
    let fixture = world.body(ball).unwrap().fixtures()[0];
    let rail = world.spawn_body(BodyDef::fixed(Vec2::new(0.0, 200.0)));
    let joint = world.constrain(rail, ball, JointType::Prismatic).unwrap();
    let seen = Arc::new(Mutex::new(None));
    let record = seen.clone();
    on_landing(&mut world, move |world| {
        world.destroy_body(ball).unwrap();
        let body = world.body(ball).unwrap();
        *record.lock().unwrap() = Some((body.is_operational(), world.joint(joint).is_some()));
    });

    assert_eq!(*seen.lock().unwrap(), Some((true, true)));
    assert!(world.body(ball).is_none());
    assert!(world.fixture(fixture).is_none());
    assert!(world.joint(joint).is_none());
    assert!(world.body(rail).unwrap().joint_edges().is_empty());
    assert!(world.contains_body(floor));
    assert_eq!(world.body_count(), 2);
}

#[test]
fn fixture_added_from_callback_assembles_after_the_step() {
    let mut world = World::default();
    let (floor, _) = floor_and_ball(&mut world, false);
    let added = Arc::new(Mutex::new(None));
    let record = added.clone();
    on_landing(&mut world, move |world| {
        let fixture = world
            .attach_fixture(floor, FixtureDef::new(Shape::circle(8.0).unwrap()))
            .unwrap();
        let state = world.fixture(fixture).unwrap();
        *record.lock().unwrap() = Some((fixture, state.body(), state.is_operational()));
    });

    let (fixture, owner, operational) = added.lock().unwrap().unwrap();
    assert_eq!(owner, Some(floor));
    assert!(!operational, "native shape waits for the step to end");
    assert!(world.fixture(fixture).unwrap().is_operational());
    assert!(world.body(floor).unwrap().fixtures().contains(&fixture));
}

#[test]
fn constrain_from_callback_links_now_and_assembles_after_the_step() {
    let mut world = World::default();
    let (floor, ball) = floor_and_ball(&mut world, false);
    let made = Arc::new(Mutex::new(None));
    let record = made.clone();
    on_landing(&mut world, move |world| {
        let joint = world.constrain(floor, ball, JointType::Weld).unwrap();
        let edges = world.body(ball).unwrap().joint_edges().len();
        let operational = world.joint(joint).unwrap().is_operational();
        *record.lock().unwrap() = Some((joint, edges, operational));
    });

    let (joint, edges, operational) = made.lock().unwrap().unwrap();
    assert_eq!(edges, 1, "edges exist as soon as constrain returns");
    assert!(!operational);
    assert!(world.joint(joint).unwrap().is_operational());
    assert_eq!(world.body(floor).unwrap().joint_edges().len(), 1);
}

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use glam::Vec2;
use log::trace;
use rapier2d::prelude::*;

use crate::core::contact::Contact;
use crate::core::solver::{na_to_vec2, point_to_vec2};
use crate::core::world::World;
use crate::ids::{FixtureId, WorldId};
use crate::units::UnitScale;

/// Which delegate callbacks the listener forwards. Read once when the
/// delegate is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactCallbacks {
    pub began: bool,
    pub ended: bool,
    pub pre_solve: bool,
}

impl ContactCallbacks {
    pub const ALL: Self = Self {
        began: true,
        ended: true,
        pre_solve: true,
    };

    pub const NONE: Self = Self {
        began: false,
        ended: false,
        pre_solve: false,
    };
}

impl Default for ContactCallbacks {
    fn default() -> Self {
        Self::ALL
    }
}

/// Receives contact notifications from a stepping world.
///
/// `contact_began` and `contact_ended` run after the solver pass, while the
/// world is still locked: structural changes requested through `world` are
/// queued and applied when the step returns. `contact_pre_solve` runs inside
/// the solver pass and may only toggle `Contact::set_enabled`.
pub trait ContactDelegate: Send {
    /// Callbacks this delegate implements. Unlisted ones are never invoked.
    fn callbacks(&self) -> ContactCallbacks {
        ContactCallbacks::ALL
    }

    fn contact_began(&mut self, _world: &mut World, _contact: &Contact) {}

    fn contact_ended(&mut self, _world: &mut World, _contact: &Contact) {}

    fn contact_pre_solve(&mut self, _contact: &mut Contact) {}
}

/// Holds the world's delegate and its cached callback flags.
#[derive(Default)]
pub(crate) struct ContactListener {
    delegate: Option<Box<dyn ContactDelegate>>,
    callbacks: Option<ContactCallbacks>,
    generation: u64,
}

impl ContactListener {
    pub(crate) fn set(&mut self, delegate: Box<dyn ContactDelegate>) {
        self.callbacks = Some(delegate.callbacks());
        self.delegate = Some(delegate);
        self.generation += 1;
    }

    pub(crate) fn clear(&mut self) -> Option<Box<dyn ContactDelegate>> {
        self.callbacks = None;
        self.generation += 1;
        self.delegate.take()
    }

    pub(crate) fn has_delegate(&self) -> bool {
        self.callbacks.is_some()
    }

    pub(crate) fn callbacks(&self) -> ContactCallbacks {
        self.callbacks.unwrap_or(ContactCallbacks::NONE)
    }

    /// Borrow the delegate out for a dispatch. The flags stay cached so the
    /// slot still counts as occupied.
    pub(crate) fn take(&mut self) -> Option<(Box<dyn ContactDelegate>, u64)> {
        self.delegate.take().map(|d| (d, self.generation))
    }

    /// Return a borrowed delegate unless the slot was replaced or cleared in
    /// the meantime.
    pub(crate) fn restore(&mut self, delegate: Box<dyn ContactDelegate>, generation: u64) {
        if self.generation == generation {
            self.delegate = Some(delegate);
        } else {
            trace!("contact delegate replaced during dispatch");
        }
    }
}

/// Fixture pair key independent of collider order.
pub(crate) fn pair_key(a: FixtureId, b: FixtureId) -> (FixtureId, FixtureId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

pub(crate) type PreSolveDecisions = Mutex<HashMap<(FixtureId, FixtureId), bool>>;

fn fixture_pair(
    world: WorldId,
    colliders: &ColliderSet,
    h1: ColliderHandle,
    h2: ColliderHandle,
) -> Option<(FixtureId, FixtureId)> {
    let a = colliders.get(h1)?;
    let b = colliders.get(h2)?;
    Some((
        FixtureId::from_user_data(world, a.user_data),
        FixtureId::from_user_data(world, b.user_data),
    ))
}

// ---------------------------------------------------------------------------
// Begin / end collection
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ContactEvent {
    pub(crate) began: bool,
    pub(crate) contact: Contact,
}

/// Buffers begin/end events during the solver pass. Rapier requires
/// `Send + Sync` handlers, hence the mutex.
pub(crate) struct ContactCollector {
    world: WorldId,
    scale: UnitScale,
    events: Mutex<Vec<ContactEvent>>,
}

impl ContactCollector {
    pub(crate) fn new(world: WorldId, scale: UnitScale) -> Self {
        Self {
            world,
            scale,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Drain the buffered events, stamping each with the pre-solve decision
    /// recorded for its pair this step.
    pub(crate) fn into_events(self, decisions: PreSolveDecisions) -> Vec<ContactEvent> {
        let decisions = decisions.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut events = self.events.into_inner().unwrap_or_else(PoisonError::into_inner);
        for event in &mut events {
            let key = pair_key(event.contact.fixture_a, event.contact.fixture_b);
            event.contact.enabled = decisions.get(&key).copied().unwrap_or(true);
        }
        events
    }

    fn build_contact(
        &self,
        fixtures: (FixtureId, FixtureId),
        colliders: &ColliderSet,
        event: &CollisionEvent,
        pair: Option<&ContactPair>,
    ) -> Contact {
        let mut contact = Contact::new(fixtures.0, fixtures.1, false);
        contact.sensor = event.sensor();
        contact.touching = event.started();
        let Some(pair) = pair else {
            return contact;
        };
        contact.touching = pair.has_any_active_contact;
        let Some(manifold) = pair
            .manifolds
            .iter()
            .find(|m| !m.data.solver_contacts.is_empty())
            .or_else(|| pair.manifolds.first())
        else {
            return contact;
        };

        let normal = na_to_vec2(&manifold.data.normal);
        let points: Vec<Vec2> = if manifold.data.solver_contacts.is_empty() {
            // Contacts disabled in pre-solve have no solver points; fall back
            // to the raw manifold.
            let Some(collider) = colliders.get(pair.collider1) else {
                return contact.with_geometry(normal, []);
            };
            let frame = match manifold.subshape_pos1 {
                Some(sub) => collider.position() * sub,
                None => *collider.position(),
            };
            manifold
                .points
                .iter()
                .map(|p| point_to_vec2(&(frame * p.local_p1)))
                .collect()
        } else {
            manifold
                .data
                .solver_contacts
                .iter()
                .map(|c| point_to_vec2(&c.point))
                .collect()
        };
        contact.with_geometry(normal, points.into_iter().map(|p| self.scale.vec_to_points(p)))
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        contact_pair: Option<&ContactPair>,
    ) {
        let Some(fixtures) = fixture_pair(self.world, colliders, event.collider1(), event.collider2())
        else {
            // One side was removed from the solver; its fixture is no longer
            // operational and gets no notification.
            trace!("dropping collision event for removed collider: {:?}", event);
            return;
        };
        let contact = self.build_contact(fixtures, colliders, &event, contact_pair);
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ContactEvent {
                began: event.started(),
                contact,
            });
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}

// ---------------------------------------------------------------------------
// Pre-solve
// ---------------------------------------------------------------------------

/// Hands every solver contact to the delegate as a modifiable `Contact`, then
/// freezes it and applies the final `enabled` value.
pub(crate) struct PreSolveHook<'a> {
    world: WorldId,
    scale: UnitScale,
    delegate: Mutex<&'a mut dyn ContactDelegate>,
    decisions: &'a PreSolveDecisions,
}

impl<'a> PreSolveHook<'a> {
    pub(crate) fn new(
        world: WorldId,
        scale: UnitScale,
        delegate: &'a mut dyn ContactDelegate,
        decisions: &'a PreSolveDecisions,
    ) -> Self {
        Self {
            world,
            scale,
            delegate: Mutex::new(delegate),
            decisions,
        }
    }
}

impl PhysicsHooks for PreSolveHook<'_> {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let Some(fixtures) =
            fixture_pair(self.world, context.colliders, context.collider1, context.collider2)
        else {
            return;
        };
        let points: Vec<Vec2> = context
            .solver_contacts
            .iter()
            .map(|c| self.scale.vec_to_points(point_to_vec2(&c.point)))
            .collect();
        let mut contact =
            Contact::new(fixtures.0, fixtures.1, true).with_geometry(na_to_vec2(context.normal), points);
        contact.touching = true;
        contact.sensor = context.colliders[context.collider1].is_sensor()
            || context.colliders[context.collider2].is_sensor();

        {
            let mut delegate = self.delegate.lock().unwrap_or_else(PoisonError::into_inner);
            delegate.contact_pre_solve(&mut contact);
        }
        contact.end_modifiability();

        if !contact.enabled {
            context.solver_contacts.clear();
        }
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pair_key(fixtures.0, fixtures.1), contact.enabled);
    }
}

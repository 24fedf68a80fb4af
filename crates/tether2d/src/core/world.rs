use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use glam::Vec2;
use log::{debug, trace, warn};
use rapier2d::prelude::RigidBodyHandle;

use crate::config::WorldConfig;
use crate::core::body::{apply_sleep_policy, BodyDef, BodyMut, BodyRef, BodyState};
use crate::core::fixture::{FixtureDef, FixtureMut, FixtureRef, FixtureState};
use crate::core::joint::{JointEdge, JointMut, JointRef, JointState, JointType, JointVariant};
use crate::core::listener::{
    ContactCollector, ContactDelegate, ContactEvent, ContactListener, PreSolveHook,
};
use crate::core::raycast::{RayCastCollector, RayCastIntersection, RayIntersectionType};
use crate::core::solver::Solver;
use crate::error::{PhysicsError, Result};
use crate::ids::{BodyId, FixtureId, IndexAllocator, JointId, WorldId};
use crate::units::UnitScale;

/// A structural change requested while the world was locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    AddBody(BodyId),
    RemoveBody(BodyId),
    DestroyBody(BodyId),
    AddFixture(BodyId, FixtureId),
    AssembleFixture(FixtureId),
    RemoveFixture(FixtureId),
    DestroyFixture(FixtureId),
    AssembleJoint(JointId),
    DestroyJoint(JointId),
}

fn operational_handle(
    members: &BTreeSet<BodyId>,
    bodies: &BTreeMap<BodyId, BodyState>,
    id: BodyId,
) -> Option<RigidBodyHandle> {
    if !members.contains(&id) {
        return None;
    }
    bodies.get(&id).and_then(|b| b.handle)
}

/// Top-level container: owns every body, fixture and joint created through it,
/// drives the solver and defers structural changes made mid-step.
pub struct World {
    id: WorldId,
    config: WorldConfig,
    scale: UnitScale,
    solver: Solver,
    bodies: BTreeMap<BodyId, BodyState>,
    fixtures: BTreeMap<FixtureId, FixtureState>,
    joints: BTreeMap<JointId, JointState>,
    members: BTreeSet<BodyId>,
    body_ids: IndexAllocator,
    fixture_ids: IndexAllocator,
    joint_ids: IndexAllocator,
    locked: bool,
    pending: VecDeque<PendingOp>,
    listener: ContactListener,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    /// A world with default settings and the given gravity in points / s².
    pub fn new(gravity: Vec2) -> Self {
        Self::with_config(WorldConfig::default().with_gravity(gravity))
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!("world config rejected, falling back to defaults where needed: {}", err);
                config.sanitized()
            }
        };
        let scale = config.scale();
        let id = WorldId::next();
        debug!("world {:?} created, {} points per meter", id, scale.points_per_meter());
        Self {
            id,
            solver: Solver::new(scale.vec_to_meters(config.gravity)),
            config,
            scale,
            bodies: BTreeMap::new(),
            fixtures: BTreeMap::new(),
            joints: BTreeMap::new(),
            members: BTreeSet::new(),
            body_ids: IndexAllocator::default(),
            fixture_ids: IndexAllocator::default(),
            joint_ids: IndexAllocator::default(),
            locked: false,
            pending: VecDeque::new(),
            listener: ContactListener::default(),
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn scale(&self) -> UnitScale {
        self.scale
    }

    /// Points / s².
    pub fn gravity(&self) -> Vec2 {
        self.scale.vec_to_points(self.solver.gravity())
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
        self.solver.set_gravity(self.scale.vec_to_meters(gravity));
    }

    pub fn allow_sleep(&self) -> bool {
        self.config.allow_sleep
    }

    /// Applies to every live body immediately.
    pub fn set_allow_sleep(&mut self, allow: bool) {
        self.config.allow_sleep = allow;
        for body in self.bodies.values() {
            let Some(rb) = body.handle.and_then(|h| self.solver.bodies.get_mut(h)) else {
                continue;
            };
            apply_sleep_policy(rb, allow && body.def.allow_sleep);
        }
    }

    pub fn auto_clear_forces(&self) -> bool {
        self.config.auto_clear_forces
    }

    pub fn set_auto_clear_forces(&mut self, enabled: bool) {
        self.config.auto_clear_forces = enabled;
    }

    /// True exactly while a step is in progress.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Member bodies, in creation order.
    pub fn bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.members.iter().copied()
    }

    pub fn contains_body(&self, id: BodyId) -> bool {
        self.members.contains(&id)
    }

    pub fn body_count(&self) -> usize {
        self.members.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // -- Delegate --

    /// Install the contact delegate. Its `callbacks()` are read once, here.
    pub fn set_delegate<D: ContactDelegate + 'static>(&mut self, delegate: D) {
        self.listener.set(Box::new(delegate));
    }

    pub fn clear_delegate(&mut self) -> Option<Box<dyn ContactDelegate>> {
        self.listener.clear()
    }

    pub fn has_delegate(&self) -> bool {
        self.listener.has_delegate()
    }

    // -- Stepping --

    /// Advance the simulation by `time_step` seconds.
    ///
    /// The world is locked for the duration. Previous transforms are recorded
    /// first; a non-positive or non-finite `time_step` skips the solver but
    /// still records transforms and flushes queued changes. Calling `step`
    /// from inside a contact callback is ignored.
    pub fn step(&mut self, time_step: f32, velocity_iterations: usize, position_iterations: usize) {
        if self.locked {
            warn!("step() called while world {:?} is already stepping", self.id);
            return;
        }
        self.locked = true;

        for (id, body) in self.bodies.iter_mut() {
            if self.members.contains(id) {
                body.record_transform(&self.solver, self.scale);
            }
        }

        if time_step > 0.0 && time_step.is_finite() {
            trace!(
                "step {}s: {} bodies, {} colliders, {} joints",
                time_step,
                self.solver.body_count(),
                self.solver.collider_count(),
                self.solver.joint_count()
            );
            let events = self.run_solver(time_step, velocity_iterations, position_iterations);
            self.dispatch_contacts(events);
        } else {
            debug!("no-op step, time_step={}", time_step);
        }

        self.locked = false;
        self.flush_pending();

        if self.config.auto_clear_forces {
            self.solver.clear_forces();
        }
    }

    /// Step with the iteration counts from the world's config.
    pub fn step_default(&mut self, time_step: f32) {
        self.step(
            time_step,
            self.config.velocity_iterations,
            self.config.position_iterations,
        );
    }

    /// Zero accumulated forces and torques on every body.
    pub fn clear_forces(&mut self) {
        self.solver.clear_forces();
    }

    fn run_solver(
        &mut self,
        dt: f32,
        velocity_iterations: usize,
        position_iterations: usize,
    ) -> Vec<ContactEvent> {
        let collector = ContactCollector::new(self.id, self.scale);
        let decisions = Mutex::new(HashMap::new());

        let pre_solve = if self.listener.callbacks().pre_solve {
            self.listener.take()
        } else {
            None
        };
        match pre_solve {
            Some((mut delegate, generation)) => {
                {
                    let hook = PreSolveHook::new(self.id, self.scale, delegate.as_mut(), &decisions);
                    self.solver
                        .step(dt, velocity_iterations, position_iterations, &hook, &collector);
                }
                self.listener.restore(delegate, generation);
            }
            None => self
                .solver
                .step(dt, velocity_iterations, position_iterations, &(), &collector),
        }

        collector.into_events(decisions)
    }

    fn dispatch_contacts(&mut self, events: Vec<ContactEvent>) {
        let callbacks = self.listener.callbacks();
        if events.is_empty() || !(callbacks.began || callbacks.ended) {
            return;
        }
        let Some((mut delegate, generation)) = self.listener.take() else {
            return;
        };
        for event in &events {
            if event.began && callbacks.began {
                delegate.contact_began(self, &event.contact);
            } else if !event.began && callbacks.ended {
                delegate.contact_ended(self, &event.contact);
            }
        }
        self.listener.restore(delegate, generation);
    }

    fn defer(&mut self, op: PendingOp) {
        trace!("deferring {:?} until the step ends", op);
        self.pending.push_back(op);
    }

    fn is_queued(&self, op: PendingOp) -> bool {
        self.pending.contains(&op)
    }

    fn flush_pending(&mut self) {
        while let Some(op) = self.pending.pop_front() {
            debug!("flushing {:?}", op);
            let result = match op {
                PendingOp::AddBody(id) => self.add_body(id),
                PendingOp::RemoveBody(id) => self.remove_body(id),
                PendingOp::DestroyBody(id) => self.destroy_body(id),
                PendingOp::AddFixture(body, fixture) => self.add_fixture(body, fixture),
                PendingOp::AssembleFixture(id) => {
                    self.assemble_fixture(id);
                    Ok(())
                }
                PendingOp::RemoveFixture(id) => self.detach_fixture(id),
                PendingOp::DestroyFixture(id) => self.destroy_fixture(id),
                PendingOp::AssembleJoint(id) => {
                    self.assemble_joint(id);
                    Ok(())
                }
                PendingOp::DestroyJoint(id) => {
                    self.destroy_joint(id);
                    Ok(())
                }
            };
            if let Err(err) = result {
                warn!("deferred {:?} failed: {}", op, err);
            }
        }
    }

    // -- Identity checks --

    fn check_body(&self, id: BodyId) -> Result<()> {
        if id.world() != self.id {
            return Err(PhysicsError::ForeignBody {
                body: id,
                owner: id.world(),
                world: self.id,
            });
        }
        if !self.bodies.contains_key(&id) {
            return Err(PhysicsError::UnknownBody(id));
        }
        Ok(())
    }

    fn check_fixture(&self, id: FixtureId) -> Result<()> {
        if id.world() != self.id {
            return Err(PhysicsError::ForeignFixture {
                fixture: id,
                owner: id.world(),
                world: self.id,
            });
        }
        if !self.fixtures.contains_key(&id) {
            return Err(PhysicsError::UnknownFixture(id));
        }
        Ok(())
    }

    fn check_joint(&self, id: JointId) -> Result<()> {
        if id.world() != self.id {
            return Err(PhysicsError::ForeignJoint {
                joint: id,
                owner: id.world(),
                world: self.id,
            });
        }
        if !self.joints.contains_key(&id) {
            return Err(PhysicsError::UnknownJoint(id));
        }
        Ok(())
    }

    fn is_operational(&self, id: BodyId) -> bool {
        operational_handle(&self.members, &self.bodies, id).is_some()
    }

    // -- Bodies --

    /// Create a body that is not yet part of the simulation.
    pub fn create_body(&mut self, def: BodyDef) -> BodyId {
        let id = BodyId::new(self.id, self.body_ids.allocate());
        self.bodies.insert(id, BodyState::new(def));
        trace!("body {:?} created", id);
        id
    }

    /// Make a body a member of the world and assemble it. Adding a member
    /// again is a no-op.
    pub fn add_body(&mut self, id: BodyId) -> Result<()> {
        self.check_body(id)?;
        if self.locked {
            self.defer(PendingOp::AddBody(id));
            return Ok(());
        }
        if !self.members.insert(id) {
            return Ok(());
        }
        if let Some(body) = self.bodies.get_mut(&id) {
            body.previous = None;
        }
        self.assemble_body(id);
        debug!("body {:?} added", id);
        Ok(())
    }

    /// Convenience for `create_body` followed by `add_body`.
    pub fn spawn_body(&mut self, def: BodyDef) -> BodyId {
        let id = self.create_body(def);
        if self.locked {
            self.defer(PendingOp::AddBody(id));
        } else {
            self.members.insert(id);
            self.assemble_body(id);
        }
        id
    }

    /// Take a body out of the simulation, keeping its record, fixtures and
    /// joints so it can be added again. Deferred while locked; membership is
    /// decided when the queue is drained, so add/remove pairs keep their order.
    pub fn remove_body(&mut self, id: BodyId) -> Result<()> {
        self.check_body(id)?;
        if self.locked {
            self.defer(PendingOp::RemoveBody(id));
            return Ok(());
        }
        if !self.members.contains(&id) {
            return Ok(());
        }
        if self.bodies.get(&id).is_some_and(BodyState::is_assembled) {
            self.disassemble_body(id);
        }
        self.members.remove(&id);
        debug!("body {:?} removed", id);
        Ok(())
    }

    pub fn remove_all_bodies(&mut self) {
        let ids: Vec<BodyId> = self.members.iter().copied().collect();
        for id in ids {
            if let Err(err) = self.remove_body(id) {
                warn!("remove_all_bodies: {}", err);
            }
        }
    }

    /// Free a body's record along with its fixtures and joints.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        self.check_body(id)?;
        if self.locked {
            self.defer(PendingOp::DestroyBody(id));
            return Ok(());
        }
        self.remove_body(id)?;
        let Some(body) = self.bodies.remove(&id) else {
            return Ok(());
        };
        for edge in &body.joint_edges {
            self.destroy_joint(edge.joint);
        }
        for fixture in &body.fixtures {
            self.fixtures.remove(fixture);
        }
        debug!("body {:?} destroyed", id);
        Ok(())
    }

    pub fn body(&self, id: BodyId) -> Option<BodyRef<'_>> {
        if id.world() != self.id {
            return None;
        }
        let state = self.bodies.get(&id)?;
        Some(BodyRef {
            id,
            state,
            solver: &self.solver,
            scale: self.scale,
            member: self.members.contains(&id),
        })
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<BodyMut<'_>> {
        if id.world() != self.id {
            return None;
        }
        let state = self.bodies.get_mut(&id)?;
        Some(BodyMut {
            state,
            solver: &mut self.solver,
            scale: self.scale,
            world_allows_sleep: self.config.allow_sleep,
        })
    }

    fn assemble_body(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get_mut(&id) else {
            return;
        };
        let Some(handle) = body.assemble(id, &mut self.solver, self.scale, self.config.allow_sleep)
        else {
            return;
        };
        let fixtures = body.fixtures.clone();
        let edges = body.joint_edges.clone();
        for fixture_id in fixtures {
            if let Some(fixture) = self.fixtures.get_mut(&fixture_id) {
                if !fixture.is_assembled() {
                    fixture.assemble(fixture_id, handle, &mut self.solver, self.scale);
                }
            }
        }
        for edge in edges {
            if self.is_operational(edge.other_body) {
                self.assemble_joint(edge.joint);
            }
        }
    }

    /// Joints first, then fixtures, then the body, each capturing live state
    /// before its native object goes away.
    fn disassemble_body(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get_mut(&id) else {
            return;
        };
        for edge in &body.joint_edges {
            if let Some(joint) = self.joints.get_mut(&edge.joint) {
                if joint.is_assembled() {
                    joint.disassemble(&mut self.solver);
                }
            }
        }
        for fixture_id in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture_id) {
                if fixture.is_assembled() {
                    fixture.disassemble(&mut self.solver, self.scale);
                }
            }
        }
        body.disassemble(&mut self.solver, self.scale);
        trace!("body {:?} disassembled", id);
    }

    // -- Fixtures --

    /// Create an unattached fixture. The shape is validated here.
    pub fn create_fixture(&mut self, def: FixtureDef) -> Result<FixtureId> {
        def.shape.validate()?;
        let id = FixtureId::new(self.id, self.fixture_ids.allocate());
        self.fixtures.insert(id, FixtureState::new(def));
        Ok(id)
    }

    /// Attach a fixture to a body, assembling it if the body is operational.
    /// A fixture whose removal is queued is re-attached after that removal.
    pub fn add_fixture(&mut self, body: BodyId, fixture: FixtureId) -> Result<()> {
        self.check_body(body)?;
        self.check_fixture(fixture)?;
        if self.locked && self.is_queued(PendingOp::RemoveFixture(fixture)) {
            self.defer(PendingOp::AddFixture(body, fixture));
            return Ok(());
        }
        let Some(state) = self.fixtures.get_mut(&fixture) else {
            return Err(PhysicsError::UnknownFixture(fixture));
        };
        match state.body {
            Some(owner) if owner == body => return Ok(()),
            Some(owner) => {
                return Err(PhysicsError::FixtureAlreadyAttached {
                    fixture,
                    body: owner,
                })
            }
            None => state.body = Some(body),
        }
        if let Some(owner) = self.bodies.get_mut(&body) {
            owner.fixtures.push(fixture);
        }
        if self.is_operational(body) {
            if self.locked {
                self.defer(PendingOp::AssembleFixture(fixture));
            } else {
                self.assemble_fixture(fixture);
            }
        }
        Ok(())
    }

    /// Convenience for `create_fixture` followed by `add_fixture`.
    pub fn attach_fixture(&mut self, body: BodyId, def: FixtureDef) -> Result<FixtureId> {
        self.check_body(body)?;
        let fixture = self.create_fixture(def)?;
        self.add_fixture(body, fixture)?;
        Ok(fixture)
    }

    /// Detach `fixture` from `body`. A fixture owned by another body is left
    /// alone.
    pub fn remove_fixture(&mut self, body: BodyId, fixture: FixtureId) -> Result<()> {
        self.check_body(body)?;
        self.check_fixture(fixture)?;
        if self.fixtures.get(&fixture).and_then(|f| f.body) != Some(body) {
            warn!("fixture {:?} is not attached to {:?}", fixture, body);
            return Ok(());
        }
        self.detach_fixture(fixture)
    }

    pub fn remove_all_fixtures(&mut self, body: BodyId) -> Result<()> {
        self.check_body(body)?;
        let fixtures = self
            .bodies
            .get(&body)
            .map(|b| b.fixtures.clone())
            .unwrap_or_default();
        for fixture in fixtures {
            self.detach_fixture(fixture)?;
        }
        Ok(())
    }

    /// Detach a fixture from whichever body owns it. The native shape is
    /// destroyed after the current step if the world is locked.
    pub fn detach_fixture(&mut self, fixture: FixtureId) -> Result<()> {
        self.check_fixture(fixture)?;
        let Some(state) = self.fixtures.get_mut(&fixture) else {
            return Err(PhysicsError::UnknownFixture(fixture));
        };
        let Some(body) = state.body else {
            return Ok(());
        };
        if state.is_assembled() {
            if self.locked {
                self.defer(PendingOp::RemoveFixture(fixture));
                return Ok(());
            }
            state.disassemble(&mut self.solver, self.scale);
        }
        state.body = None;
        if let Some(owner) = self.bodies.get_mut(&body) {
            owner.fixtures.retain(|f| *f != fixture);
        }
        trace!("fixture {:?} detached from {:?}", fixture, body);
        Ok(())
    }

    pub fn destroy_fixture(&mut self, fixture: FixtureId) -> Result<()> {
        self.check_fixture(fixture)?;
        if self.locked {
            self.defer(PendingOp::DestroyFixture(fixture));
            return Ok(());
        }
        self.detach_fixture(fixture)?;
        self.fixtures.remove(&fixture);
        Ok(())
    }

    pub fn fixture(&self, id: FixtureId) -> Option<FixtureRef<'_>> {
        if id.world() != self.id {
            return None;
        }
        let state = self.fixtures.get(&id)?;
        let operational = state.body.is_some_and(|b| self.is_operational(b)) && state.is_assembled();
        Some(FixtureRef {
            id,
            state,
            solver: &self.solver,
            scale: self.scale,
            operational,
        })
    }

    pub fn fixture_mut(&mut self, id: FixtureId) -> Option<FixtureMut<'_>> {
        if id.world() != self.id {
            return None;
        }
        let state = self.fixtures.get_mut(&id)?;
        Some(FixtureMut {
            state,
            solver: &mut self.solver,
            scale: self.scale,
        })
    }

    fn assemble_fixture(&mut self, id: FixtureId) {
        let Some(fixture) = self.fixtures.get_mut(&id) else {
            return;
        };
        if fixture.is_assembled() {
            return;
        }
        let Some(parent) = fixture
            .body
            .and_then(|b| operational_handle(&self.members, &self.bodies, b))
        else {
            return;
        };
        fixture.assemble(id, parent, &mut self.solver, self.scale);
    }

    // -- Joints --

    /// Join two bodies with a joint of the given type. The joint's parameters
    /// and anchors come from the bodies' current poses. It is assembled as
    /// soon as both bodies are operational.
    pub fn constrain(&mut self, body_a: BodyId, body_b: BodyId, kind: JointType) -> Result<JointId> {
        self.check_body(body_a)?;
        self.check_body(body_b)?;
        if body_a == body_b {
            return Err(PhysicsError::SelfConstraint(body_a));
        }
        let pose = |id: BodyId| -> (Vec2, f32) {
            match self.bodies.get(&id) {
                Some(body) => {
                    let (pos, rot) = body.transform(&self.solver, self.scale);
                    (self.scale.vec_to_meters(pos), rot.to_radians())
                }
                None => (Vec2::ZERO, 0.0),
            }
        };
        let (variant, frame) = JointVariant::from_poses(kind, pose(body_a), pose(body_b))?;

        let id = JointId::new(self.id, self.joint_ids.allocate());
        self.joints
            .insert(id, JointState::new(variant, frame, body_a, body_b));
        if let Some(a) = self.bodies.get_mut(&body_a) {
            a.joint_edges.push(JointEdge {
                joint: id,
                other_body: body_b,
            });
        }
        if let Some(b) = self.bodies.get_mut(&body_b) {
            b.joint_edges.push(JointEdge {
                joint: id,
                other_body: body_a,
            });
        }
        debug!("joint {:?} ({:?}) links {:?} and {:?}", id, kind, body_a, body_b);

        if self.is_operational(body_a) && self.is_operational(body_b) {
            if self.locked {
                self.defer(PendingOp::AssembleJoint(id));
            } else {
                self.assemble_joint(id);
            }
        }
        Ok(id)
    }

    /// Remove every joint linking `a` and `b`. Returns how many were found;
    /// while locked they are freed after the step, and joints already queued
    /// for destruction are not counted again.
    pub fn break_constraint(&mut self, a: BodyId, b: BodyId) -> Result<usize> {
        self.check_body(a)?;
        self.check_body(b)?;
        let joints: Vec<JointId> = self
            .bodies
            .get(&a)
            .map(|body| {
                body.joint_edges
                    .iter()
                    .filter(|edge| edge.other_body == b)
                    .map(|edge| edge.joint)
                    .filter(|joint| !self.is_queued(PendingOp::DestroyJoint(*joint)))
                    .collect()
            })
            .unwrap_or_default();
        for joint in &joints {
            if self.locked {
                self.defer(PendingOp::DestroyJoint(*joint));
            } else {
                self.destroy_joint(*joint);
            }
        }
        Ok(joints.len())
    }

    pub fn joint(&self, id: JointId) -> Option<JointRef<'_>> {
        if id.world() != self.id {
            return None;
        }
        let state = self.joints.get(&id)?;
        let operational = state.is_assembled()
            && self.is_operational(state.body_a)
            && self.is_operational(state.body_b);
        let active = [state.body_a, state.body_b].iter().all(|b| {
            self.body(*b).is_some_and(|body| body.is_active())
        });
        Some(JointRef {
            id,
            state,
            solver: &self.solver,
            scale: self.scale,
            operational,
            active,
        })
    }

    pub fn joint_mut(&mut self, id: JointId) -> Option<JointMut<'_>> {
        self.check_joint(id).ok()?;
        let state = self.joints.get_mut(&id)?;
        Some(JointMut {
            state,
            solver: &mut self.solver,
            scale: self.scale,
        })
    }

    fn assemble_joint(&mut self, id: JointId) {
        let Some(joint) = self.joints.get_mut(&id) else {
            return;
        };
        if joint.is_assembled() {
            return;
        }
        let a = operational_handle(&self.members, &self.bodies, joint.body_a);
        let b = operational_handle(&self.members, &self.bodies, joint.body_b);
        if let (Some(a), Some(b)) = (a, b) {
            joint.assemble(id, a, b, &mut self.solver);
        }
    }

    /// Free a joint and both of its edges.
    fn destroy_joint(&mut self, id: JointId) {
        let Some(mut joint) = self.joints.remove(&id) else {
            return;
        };
        if joint.is_assembled() {
            joint.disassemble(&mut self.solver);
        }
        for body in [joint.body_a, joint.body_b] {
            if let Some(state) = self.bodies.get_mut(&body) {
                state.joint_edges.retain(|edge| edge.joint != id);
            }
        }
        trace!("joint {:?} destroyed", id);
    }

    // -- Ray casting --

    /// Fixtures crossed by the segment `start .. end` (points), filtered by
    /// `policy`. Empty when nothing is hit or the segment has no length.
    pub fn cast_ray(
        &self,
        start: Vec2,
        end: Vec2,
        policy: RayIntersectionType,
    ) -> Vec<RayCastIntersection> {
        let delta = end - start;
        let dir = self.scale.vec_to_meters(delta);
        if !dir.is_finite() || dir.length_squared() <= f32::EPSILON * f32::EPSILON {
            return Vec::new();
        }
        let world = self.id;
        let mut collector = RayCastCollector::new(policy);
        self.solver.intersections_with_ray(
            self.scale.vec_to_meters(start),
            dir,
            |user_data, fraction, normal| {
                collector.report(RayCastIntersection {
                    fixture: FixtureId::from_user_data(world, user_data),
                    point: start + delta * fraction,
                    normal,
                    fraction,
                })
            },
        );
        collector.into_results()
    }

    /// Every fixture crossed by the segment.
    pub fn cast_ray_all(&self, start: Vec2, end: Vec2) -> Vec<RayCastIntersection> {
        self.cast_ray(start, end, RayIntersectionType::All)
    }
}

use glam::Vec2;
use log::{trace, warn};
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::joint::JointEdge;
use crate::core::solver::{na_iso_to_pos_rot, na_to_vec2, vec2_to_na, vec2_to_point, Solver};
use crate::ids::{BodyId, FixtureId, JointId, WorldId};
use crate::units::UnitScale;

/// The type of simulation performed on a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero mass, zero velocity. Never moves.
    Static,
    /// Zero mass, velocity set by the client.
    Kinematic,
    /// Positive mass, velocity determined by forces.
    #[default]
    Dynamic,
}

impl BodyType {
    fn to_rapier(self) -> RigidBodyType {
        match self {
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
            BodyType::Dynamic => RigidBodyType::Dynamic,
        }
    }

    fn from_rapier(body_type: RigidBodyType) -> Self {
        match body_type {
            RigidBodyType::Fixed => BodyType::Static,
            RigidBodyType::KinematicVelocityBased | RigidBodyType::KinematicPositionBased => {
                BodyType::Kinematic
            }
            RigidBodyType::Dynamic => BodyType::Dynamic,
        }
    }
}

/// Cached configuration of a body, in display units and degrees.
///
/// While the body is assembled this is a shadow of the live Rapier body; it is
/// refreshed from the live body immediately before every disassembly so that
/// re-adding the body reproduces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// Position in points.
    pub position: Vec2,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Points per second.
    pub linear_velocity: Vec2,
    /// Degrees per second.
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Scales the world's gravity for this body.
    pub gravity_scale: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    /// Inactive bodies take no part in the simulation.
    pub active: bool,
    pub fixed_rotation: bool,
    /// Continuous collision detection for fast movers.
    pub bullet: bool,
    /// Free for client use.
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            rotation: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            allow_sleep: true,
            awake: true,
            active: true,
            fixed_rotation: false,
            bullet: false,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn new(body_type: BodyType, position: Vec2, rotation: f32) -> Self {
        Self {
            body_type,
            position,
            rotation,
            ..Self::default()
        }
    }

    pub fn dynamic(position: Vec2) -> Self {
        Self::new(BodyType::Dynamic, position, 0.0)
    }

    pub fn fixed(position: Vec2) -> Self {
        Self::new(BodyType::Static, position, 0.0)
    }

    pub fn kinematic(position: Vec2) -> Self {
        Self::new(BodyType::Kinematic, position, 0.0)
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_velocity(mut self, vel: Vec2) -> Self {
        self.linear_velocity = vel;
        self
    }

    pub fn with_angular_velocity(mut self, degrees_per_second: f32) -> Self {
        self.angular_velocity = degrees_per_second;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_bullet(mut self, enabled: bool) -> Self {
        self.bullet = enabled;
        self
    }

    /// Set the linear damping (velocity decay). Higher values slow the body faster.
    pub fn with_linear_damping(mut self, damping: f32) -> Self {
        self.linear_damping = damping;
        self
    }

    /// Set the angular damping (rotation decay).
    pub fn with_angular_damping(mut self, damping: f32) -> Self {
        self.angular_damping = damping;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

fn locked_axes(fixed_rotation: bool) -> LockedAxes {
    if fixed_rotation {
        LockedAxes::ROTATION_LOCKED
    } else {
        LockedAxes::empty()
    }
}

pub(crate) fn apply_sleep_policy(rb: &mut RigidBody, can_sleep: bool) {
    let activation = rb.activation_mut();
    if can_sleep {
        activation.normalized_linear_threshold =
            RigidBodyActivation::default_normalized_linear_threshold();
        activation.angular_threshold = RigidBodyActivation::default_angular_threshold();
    } else {
        activation.normalized_linear_threshold = -1.0;
        activation.angular_threshold = -1.0;
        rb.wake_up(true);
    }
}

// ---------------------------------------------------------------------------
// Arena record and assembly
// ---------------------------------------------------------------------------

pub(crate) struct BodyState {
    pub(crate) def: BodyDef,
    pub(crate) handle: Option<RigidBodyHandle>,
    pub(crate) fixtures: Vec<FixtureId>,
    pub(crate) joint_edges: Vec<JointEdge>,
    /// Transform before the last step, in points and degrees.
    pub(crate) previous: Option<(Vec2, f32)>,
}

impl BodyState {
    pub(crate) fn new(def: BodyDef) -> Self {
        Self {
            def,
            handle: None,
            fixtures: Vec::new(),
            joint_edges: Vec::new(),
            previous: None,
        }
    }

    pub(crate) fn is_assembled(&self) -> bool {
        self.handle.is_some()
    }

    /// Construct the native body from the cached definition. Fixtures and
    /// joints are assembled by the world afterwards.
    pub(crate) fn assemble(
        &mut self,
        id: BodyId,
        solver: &mut Solver,
        scale: UnitScale,
        world_allows_sleep: bool,
    ) -> Option<RigidBodyHandle> {
        debug_assert!(self.handle.is_none(), "body {:?} assembled twice", id);
        if self.handle.is_some() {
            warn!("body {:?} is already assembled", id);
            return None;
        }
        let def = &self.def;
        let rb = RigidBodyBuilder::new(def.body_type.to_rapier())
            .translation(vec2_to_na(scale.vec_to_meters(def.position)))
            .rotation(def.rotation.to_radians())
            .linvel(vec2_to_na(scale.vec_to_meters(def.linear_velocity)))
            .angvel(def.angular_velocity.to_radians())
            .linear_damping(def.linear_damping)
            .angular_damping(def.angular_damping)
            .gravity_scale(def.gravity_scale)
            .can_sleep(world_allows_sleep && def.allow_sleep)
            .sleeping(!def.awake)
            .enabled(def.active)
            .locked_axes(locked_axes(def.fixed_rotation))
            .ccd_enabled(def.bullet)
            .user_data(id.user_data())
            .build();
        let handle = solver.insert_body(rb);
        self.handle = Some(handle);
        trace!("body {:?} assembled", id);
        Some(handle)
    }

    /// Capture live state into the definition, then destroy the native body.
    /// Fixtures and joints must already be disassembled.
    pub(crate) fn disassemble(&mut self, solver: &mut Solver, scale: UnitScale) {
        debug_assert!(self.handle.is_some(), "body disassembled twice");
        let Some(handle) = self.handle.take() else {
            warn!("body is not assembled");
            return;
        };
        if let Some(rb) = solver.bodies.get(handle) {
            self.capture(rb, scale);
        }
        solver.remove_body(handle);
    }

    fn capture(&mut self, rb: &RigidBody, scale: UnitScale) {
        let (pos, rot) = na_iso_to_pos_rot(rb.position());
        let def = &mut self.def;
        def.body_type = BodyType::from_rapier(rb.body_type());
        def.position = scale.vec_to_points(pos);
        def.rotation = rot.to_degrees();
        def.linear_velocity = scale.vec_to_points(na_to_vec2(rb.linvel()));
        def.angular_velocity = rb.angvel().to_degrees();
        def.linear_damping = rb.linear_damping();
        def.angular_damping = rb.angular_damping();
        def.gravity_scale = rb.gravity_scale();
        def.awake = !rb.is_sleeping();
        def.active = rb.is_enabled();
        def.fixed_rotation = rb.locked_axes().contains(LockedAxes::ROTATION_LOCKED);
        def.bullet = rb.is_ccd_enabled();
    }

    /// Live transform in points and degrees, falling back to the definition.
    pub(crate) fn transform(&self, solver: &Solver, scale: UnitScale) -> (Vec2, f32) {
        match self.handle.and_then(|h| solver.bodies.get(h)) {
            Some(rb) => {
                let (pos, rot) = na_iso_to_pos_rot(rb.position());
                (scale.vec_to_points(pos), rot.to_degrees())
            }
            None => (self.def.position, self.def.rotation),
        }
    }

    pub(crate) fn record_transform(&mut self, solver: &Solver, scale: UnitScale) {
        if self.handle.is_some() {
            self.previous = Some(self.transform(solver, scale));
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read access to a body. Values come from the live body while assembled and
/// from the cached definition otherwise.
pub struct BodyRef<'a> {
    pub(crate) id: BodyId,
    pub(crate) state: &'a BodyState,
    pub(crate) solver: &'a Solver,
    pub(crate) scale: UnitScale,
    pub(crate) member: bool,
}

impl BodyRef<'_> {
    fn live(&self) -> Option<&RigidBody> {
        self.state.handle.and_then(|h| self.solver.bodies.get(h))
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Member of the world *and* backed by a live native body.
    pub fn is_operational(&self) -> bool {
        self.member && self.state.is_assembled()
    }

    /// The owning world; `None` unless operational.
    pub fn world(&self) -> Option<WorldId> {
        self.is_operational().then_some(self.id.world())
    }

    pub fn fixtures(&self) -> &[FixtureId] {
        &self.state.fixtures
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.state.joint_edges
    }

    /// Every joint touching this body.
    pub fn joints(&self) -> impl Iterator<Item = JointId> + '_ {
        self.state.joint_edges.iter().map(|edge| edge.joint())
    }

    pub fn body_type(&self) -> BodyType {
        self.live()
            .map(|rb| BodyType::from_rapier(rb.body_type()))
            .unwrap_or(self.state.def.body_type)
    }

    /// Position in points.
    pub fn position(&self) -> Vec2 {
        self.state.transform(self.solver, self.scale).0
    }

    /// Rotation in degrees.
    pub fn rotation(&self) -> f32 {
        self.state.transform(self.solver, self.scale).1
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.live()
            .map(|rb| self.scale.vec_to_points(na_to_vec2(rb.linvel())))
            .unwrap_or(self.state.def.linear_velocity)
    }

    /// Degrees per second.
    pub fn angular_velocity(&self) -> f32 {
        self.live()
            .map(|rb| rb.angvel().to_degrees())
            .unwrap_or(self.state.def.angular_velocity)
    }

    pub fn linear_damping(&self) -> f32 {
        self.live()
            .map(|rb| rb.linear_damping())
            .unwrap_or(self.state.def.linear_damping)
    }

    pub fn angular_damping(&self) -> f32 {
        self.live()
            .map(|rb| rb.angular_damping())
            .unwrap_or(self.state.def.angular_damping)
    }

    pub fn gravity_scale(&self) -> f32 {
        self.live()
            .map(|rb| rb.gravity_scale())
            .unwrap_or(self.state.def.gravity_scale)
    }

    pub fn allow_sleep(&self) -> bool {
        self.state.def.allow_sleep
    }

    pub fn is_awake(&self) -> bool {
        self.live()
            .map(|rb| !rb.is_sleeping())
            .unwrap_or(self.state.def.awake)
    }

    pub fn is_active(&self) -> bool {
        self.live()
            .map(|rb| rb.is_enabled())
            .unwrap_or(self.state.def.active)
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.live()
            .map(|rb| rb.locked_axes().contains(LockedAxes::ROTATION_LOCKED))
            .unwrap_or(self.state.def.fixed_rotation)
    }

    pub fn is_bullet(&self) -> bool {
        self.live()
            .map(|rb| rb.is_ccd_enabled())
            .unwrap_or(self.state.def.bullet)
    }

    /// Position before the last step. `None` until a step has run while the
    /// body was operational.
    pub fn previous_position(&self) -> Option<Vec2> {
        self.state.previous.map(|(pos, _)| pos)
    }

    /// Rotation (degrees) before the last step.
    pub fn previous_rotation(&self) -> Option<f32> {
        self.state.previous.map(|(_, rot)| rot)
    }

    /// Mass in kilograms; zero while not operational.
    pub fn mass(&self) -> f32 {
        if !self.is_operational() {
            return 0.0;
        }
        self.live().map(|rb| rb.mass()).unwrap_or(0.0)
    }

    pub fn user_data(&self) -> u64 {
        self.state.def.user_data
    }

    /// The cached configuration, refreshed with live values when assembled.
    pub fn def(&self) -> BodyDef {
        BodyDef {
            body_type: self.body_type(),
            position: self.position(),
            rotation: self.rotation(),
            linear_velocity: self.linear_velocity(),
            angular_velocity: self.angular_velocity(),
            linear_damping: self.linear_damping(),
            angular_damping: self.angular_damping(),
            gravity_scale: self.gravity_scale(),
            awake: self.is_awake(),
            active: self.is_active(),
            fixed_rotation: self.is_fixed_rotation(),
            bullet: self.is_bullet(),
            ..self.state.def.clone()
        }
    }
}

/// Write access to a body's kinematic and behavioural properties.
///
/// Setters update the cached definition and, when assembled, the live body.
/// Impulses and forces only act on an assembled body.
pub struct BodyMut<'a> {
    pub(crate) state: &'a mut BodyState,
    pub(crate) solver: &'a mut Solver,
    pub(crate) scale: UnitScale,
    pub(crate) world_allows_sleep: bool,
}

impl BodyMut<'_> {
    fn live(&mut self) -> Option<&mut RigidBody> {
        self.state.handle.and_then(|h| self.solver.bodies.get_mut(h))
    }

    pub fn set_body_type(&mut self, body_type: BodyType) {
        self.state.def.body_type = body_type;
        if let Some(rb) = self.live() {
            rb.set_body_type(body_type.to_rapier(), true);
        }
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.state.def.position = position;
        let meters = vec2_to_na(self.scale.vec_to_meters(position));
        if let Some(rb) = self.live() {
            rb.set_translation(meters, true);
        }
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.state.def.rotation = degrees;
        if let Some(rb) = self.live() {
            rb.set_rotation(nalgebra::UnitComplex::new(degrees.to_radians()), true);
        }
    }

    pub fn set_linear_velocity(&mut self, vel: Vec2) {
        self.state.def.linear_velocity = vel;
        let meters = vec2_to_na(self.scale.vec_to_meters(vel));
        if let Some(rb) = self.live() {
            rb.set_linvel(meters, true);
        }
    }

    pub fn set_angular_velocity(&mut self, degrees_per_second: f32) {
        self.state.def.angular_velocity = degrees_per_second;
        if let Some(rb) = self.live() {
            rb.set_angvel(degrees_per_second.to_radians(), true);
        }
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.state.def.linear_damping = damping;
        if let Some(rb) = self.live() {
            rb.set_linear_damping(damping);
        }
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.state.def.angular_damping = damping;
        if let Some(rb) = self.live() {
            rb.set_angular_damping(damping);
        }
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.state.def.gravity_scale = scale;
        if let Some(rb) = self.live() {
            rb.set_gravity_scale(scale, true);
        }
    }

    pub fn set_allow_sleep(&mut self, allow: bool) {
        self.state.def.allow_sleep = allow;
        let can_sleep = allow && self.world_allows_sleep;
        if let Some(rb) = self.live() {
            apply_sleep_policy(rb, can_sleep);
        }
    }

    pub fn set_awake(&mut self, awake: bool) {
        self.state.def.awake = awake;
        if let Some(rb) = self.live() {
            if awake {
                rb.wake_up(true);
            } else {
                rb.sleep();
            }
        }
    }

    pub fn set_active(&mut self, active: bool) {
        self.state.def.active = active;
        if let Some(rb) = self.live() {
            rb.set_enabled(active);
        }
    }

    pub fn set_fixed_rotation(&mut self, fixed: bool) {
        self.state.def.fixed_rotation = fixed;
        if let Some(rb) = self.live() {
            rb.set_locked_axes(locked_axes(fixed), true);
        }
    }

    pub fn set_bullet(&mut self, bullet: bool) {
        self.state.def.bullet = bullet;
        if let Some(rb) = self.live() {
            rb.enable_ccd(bullet);
        }
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.state.def.user_data = user_data;
    }

    /// Apply an impulse (kg·points/s) at the center of mass.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2) {
        let impulse = vec2_to_na(self.scale.vec_to_meters(impulse));
        if let Some(rb) = self.live() {
            rb.apply_impulse(impulse, true);
        }
    }

    /// Apply an impulse at a world point (points).
    pub fn apply_linear_impulse_at_point(&mut self, impulse: Vec2, point: Vec2) {
        let impulse = vec2_to_na(self.scale.vec_to_meters(impulse));
        let point = vec2_to_point(self.scale.vec_to_meters(point));
        if let Some(rb) = self.live() {
            rb.apply_impulse_at_point(impulse, point, true);
        }
    }

    /// Add a force (kg·points/s²) that persists until forces are cleared.
    pub fn apply_force(&mut self, force: Vec2) {
        let force = vec2_to_na(self.scale.vec_to_meters(force));
        if let Some(rb) = self.live() {
            rb.add_force(force, true);
        }
    }

    pub fn apply_force_at_point(&mut self, force: Vec2, point: Vec2) {
        let force = vec2_to_na(self.scale.vec_to_meters(force));
        let point = vec2_to_point(self.scale.vec_to_meters(point));
        if let Some(rb) = self.live() {
            rb.add_force_at_point(force, point, true);
        }
    }

    /// Add a torque in kg·points²/s².
    pub fn apply_torque(&mut self, torque: f32) {
        let ppm = self.scale.points_per_meter();
        if let Some(rb) = self.live() {
            rb.add_torque(torque / (ppm * ppm), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorldId;

    fn body_id() -> BodyId {
        BodyId::new(WorldId::next(), 0)
    }

    #[test]
    fn builder_pattern() {
        let def = BodyDef::dynamic(Vec2::new(10.0, 20.0))
            .with_velocity(Vec2::new(1.0, 2.0))
            .with_gravity_scale(0.5)
            .with_fixed_rotation(true)
            .with_bullet(true);

        assert_eq!(def.body_type, BodyType::Dynamic);
        assert_eq!(def.position, Vec2::new(10.0, 20.0));
        assert_eq!(def.linear_velocity, Vec2::new(1.0, 2.0));
        assert!((def.gravity_scale - 0.5).abs() < 0.001);
        assert!(def.fixed_rotation);
        assert!(def.bullet);
        assert!(def.awake && def.active && def.allow_sleep);
    }

    #[test]
    fn body_type_maps_to_rapier_and_back() {
        for t in [BodyType::Static, BodyType::Kinematic, BodyType::Dynamic] {
            assert_eq!(BodyType::from_rapier(t.to_rapier()), t);
        }
    }

    #[test]
    fn capture_before_destroy_keeps_live_state() {
        let scale = UnitScale::default();
        let mut solver = Solver::new(Vec2::ZERO);
        let mut state = BodyState::new(BodyDef::dynamic(Vec2::new(64.0, 32.0)).with_rotation(30.0));
        let handle = state.assemble(body_id(), &mut solver, scale, true).unwrap();

        let rb = &mut solver.bodies[handle];
        rb.set_linvel(vec2_to_na(Vec2::new(2.0, -1.0)), true);
        rb.set_angvel(1.0, true);
        rb.set_linear_damping(0.25);

        state.disassemble(&mut solver, scale);
        assert!(!state.is_assembled());
        assert_eq!(solver.body_count(), 0);

        let def = &state.def;
        assert!((def.position - Vec2::new(64.0, 32.0)).length() < 0.001);
        assert!((def.rotation - 30.0).abs() < 0.001);
        assert!((def.linear_velocity - Vec2::new(64.0, -32.0)).length() < 0.001);
        assert!((def.angular_velocity - 1.0f32.to_degrees()).abs() < 0.001);
        assert!((def.linear_damping - 0.25).abs() < 0.001);
    }

    #[test]
    fn transform_falls_back_to_definition() {
        let scale = UnitScale::default();
        let solver = Solver::new(Vec2::ZERO);
        let state = BodyState::new(BodyDef::fixed(Vec2::new(5.0, 6.0)).with_rotation(90.0));
        let (pos, rot) = state.transform(&solver, scale);
        assert_eq!(pos, Vec2::new(5.0, 6.0));
        assert!((rot - 90.0).abs() < 0.001);
    }

    #[test]
    fn body_def_from_json() {
        let json = r#"{ "body_type": "Kinematic", "position": [1.0, 2.0], "bullet": true }"#;
        let def: BodyDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.body_type, BodyType::Kinematic);
        assert_eq!(def.position, Vec2::new(1.0, 2.0));
        assert!(def.bullet);
        assert!((def.gravity_scale - 1.0).abs() < 0.001);
    }
}

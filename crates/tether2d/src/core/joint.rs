use glam::Vec2;
use log::{trace, warn};
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::solver::{point_to_vec2, vec2_to_na, vec2_to_point, Solver};
use crate::error::{PhysicsError, Result};
use crate::ids::{BodyId, JointId};
use crate::units::UnitScale;

/// Every joint type the model knows about. Only some have a solver mapping;
/// constraining with the others fails with `PhysicsError::UnsupportedJointType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Distance,
    Friction,
    Gear,
    Mouse,
    Prismatic,
    Pulley,
    Revolute,
    Rope,
    Weld,
    Wheel,
}

/// A link from a body to one of its joints and the body at the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointEdge {
    pub(crate) joint: JointId,
    pub(crate) other_body: BodyId,
}

impl JointEdge {
    pub fn joint(&self) -> JointId {
        self.joint
    }

    pub fn other_body(&self) -> BodyId {
        self.other_body
    }
}

/// Attachment points of a joint, local to each body, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointFrame {
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
}

/// The variant-specific half of a joint.
///
/// Attachment, edges and operational state are handled uniformly by the
/// world; a joint type only describes how to turn its own parameters into a
/// native joint and how to read them back from a live one.
pub trait JointDefinition {
    /// A native joint description carrying this variant's parameters.
    fn build_definition(&self, frame: &JointFrame) -> GenericJoint;

    /// Copy this variant's parameters out of a live native joint.
    fn refresh_from_live(&mut self, live: &GenericJoint);
}

/// Keeps the distance between the two anchors fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceJoint {
    /// Meters.
    pub length: f32,
}

impl JointDefinition for DistanceJoint {
    fn build_definition(&self, frame: &JointFrame) -> GenericJoint {
        GenericJointBuilder::new(JointAxesMask::empty())
            .coupled_axes(JointAxesMask::LIN_AXES)
            .limits(JointAxis::LinX, [self.length, self.length])
            .local_anchor1(vec2_to_point(frame.anchor_a))
            .local_anchor2(vec2_to_point(frame.anchor_b))
            .build()
    }

    fn refresh_from_live(&mut self, live: &GenericJoint) {
        if let Some(limits) = live.limits(JointAxis::LinX) {
            self.length = limits.max;
        }
    }
}

/// Caps the distance between the anchors without pushing them apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RopeJoint {
    /// Meters.
    pub max_length: f32,
}

impl JointDefinition for RopeJoint {
    fn build_definition(&self, frame: &JointFrame) -> GenericJoint {
        GenericJointBuilder::new(JointAxesMask::empty())
            .coupled_axes(JointAxesMask::LIN_AXES)
            .limits(JointAxis::LinX, [0.0, self.max_length])
            .local_anchor1(vec2_to_point(frame.anchor_a))
            .local_anchor2(vec2_to_point(frame.anchor_b))
            .build()
    }

    fn refresh_from_live(&mut self, live: &GenericJoint) {
        if let Some(limits) = live.limits(JointAxis::LinX) {
            self.max_length = limits.max;
        }
    }
}

/// Free rotation about a shared pivot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RevoluteJoint;

impl JointDefinition for RevoluteJoint {
    fn build_definition(&self, frame: &JointFrame) -> GenericJoint {
        RevoluteJointBuilder::new()
            .local_anchor1(vec2_to_point(frame.anchor_a))
            .local_anchor2(vec2_to_point(frame.anchor_b))
            .build()
            .into()
    }

    fn refresh_from_live(&mut self, _live: &GenericJoint) {}
}

/// Locks the relative pose of the two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeldJoint {
    /// Rotation of body B relative to body A, radians.
    pub reference_angle: f32,
}

impl JointDefinition for WeldJoint {
    fn build_definition(&self, frame: &JointFrame) -> GenericJoint {
        FixedJointBuilder::new()
            .local_frame1(nalgebra::Isometry2::new(vec2_to_na(frame.anchor_a), 0.0))
            .local_frame2(nalgebra::Isometry2::new(
                vec2_to_na(frame.anchor_b),
                -self.reference_angle,
            ))
            .build()
            .into()
    }

    fn refresh_from_live(&mut self, live: &GenericJoint) {
        self.reference_angle = -live.local_frame2.rotation.angle();
    }
}

/// Translation along one axis of body A; the relative rotation stays at
/// `reference_angle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrismaticJoint {
    /// Unit axis in body A's frame.
    pub axis: Vec2,
    /// Rotation of body B relative to body A, radians.
    pub reference_angle: f32,
}

impl JointDefinition for PrismaticJoint {
    fn build_definition(&self, frame: &JointFrame) -> GenericJoint {
        let axis_a = self.axis.try_normalize().unwrap_or(Vec2::X);
        // The same world axis seen from body B.
        let axis_b = Vec2::from_angle(-self.reference_angle).rotate(axis_a);
        PrismaticJointBuilder::new(nalgebra::Unit::new_normalize(vec2_to_na(axis_a)))
            .local_axis2(nalgebra::Unit::new_normalize(vec2_to_na(axis_b)))
            .local_anchor1(vec2_to_point(frame.anchor_a))
            .local_anchor2(vec2_to_point(frame.anchor_b))
            .build()
            .into()
    }

    fn refresh_from_live(&mut self, live: &GenericJoint) {
        let axis = live.local_axis1();
        self.axis = Vec2::new(axis.x, axis.y);
        self.reference_angle =
            live.local_frame1.rotation.angle() - live.local_frame2.rotation.angle();
    }
}

/// The closed set of joint variants with a solver mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointVariant {
    Distance(DistanceJoint),
    Rope(RopeJoint),
    Revolute(RevoluteJoint),
    Weld(WeldJoint),
    Prismatic(PrismaticJoint),
}

impl JointVariant {
    /// Derive the variant and its attachment frame from the current poses of
    /// both bodies (meters, radians). Distance-like joints hook the body
    /// origins together; pivoting joints pivot about body A's origin.
    pub(crate) fn from_poses(
        kind: JointType,
        pose_a: (Vec2, f32),
        pose_b: (Vec2, f32),
    ) -> Result<(Self, JointFrame)> {
        let (pa, ra) = pose_a;
        let (pb, rb) = pose_b;
        let origins = JointFrame::default();
        // Body A's origin expressed in body B's frame.
        let pivot = JointFrame {
            anchor_a: Vec2::ZERO,
            anchor_b: Vec2::from_angle(-rb).rotate(pa - pb),
        };
        let separation = pa.distance(pb);
        match kind {
            JointType::Distance => Ok((
                JointVariant::Distance(DistanceJoint { length: separation }),
                origins,
            )),
            JointType::Rope => Ok((
                JointVariant::Rope(RopeJoint {
                    max_length: separation,
                }),
                origins,
            )),
            JointType::Revolute => Ok((JointVariant::Revolute(RevoluteJoint), pivot)),
            JointType::Weld => Ok((
                JointVariant::Weld(WeldJoint {
                    reference_angle: rb - ra,
                }),
                pivot,
            )),
            JointType::Prismatic => {
                let axis = Vec2::from_angle(-ra)
                    .rotate(pb - pa)
                    .try_normalize()
                    .unwrap_or(Vec2::X);
                Ok((
                    JointVariant::Prismatic(PrismaticJoint {
                        axis,
                        reference_angle: rb - ra,
                    }),
                    pivot,
                ))
            }
            JointType::Friction
            | JointType::Gear
            | JointType::Mouse
            | JointType::Pulley
            | JointType::Wheel => Err(PhysicsError::UnsupportedJointType(kind)),
        }
    }

    pub fn joint_type(&self) -> JointType {
        match self {
            JointVariant::Distance(_) => JointType::Distance,
            JointVariant::Rope(_) => JointType::Rope,
            JointVariant::Revolute(_) => JointType::Revolute,
            JointVariant::Weld(_) => JointType::Weld,
            JointVariant::Prismatic(_) => JointType::Prismatic,
        }
    }

    fn definition(&self) -> &dyn JointDefinition {
        match self {
            JointVariant::Distance(j) => j,
            JointVariant::Rope(j) => j,
            JointVariant::Revolute(j) => j,
            JointVariant::Weld(j) => j,
            JointVariant::Prismatic(j) => j,
        }
    }

    fn definition_mut(&mut self) -> &mut dyn JointDefinition {
        match self {
            JointVariant::Distance(j) => j,
            JointVariant::Rope(j) => j,
            JointVariant::Revolute(j) => j,
            JointVariant::Weld(j) => j,
            JointVariant::Prismatic(j) => j,
        }
    }

    /// Length in meters for distance and rope joints.
    fn length(&self) -> Option<f32> {
        match self {
            JointVariant::Distance(j) => Some(j.length),
            JointVariant::Rope(j) => Some(j.max_length),
            _ => None,
        }
    }

    fn set_length(&mut self, meters: f32) -> bool {
        match self {
            JointVariant::Distance(j) => j.length = meters,
            JointVariant::Rope(j) => j.max_length = meters,
            _ => return false,
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Arena record and assembly
// ---------------------------------------------------------------------------

pub(crate) struct JointState {
    pub(crate) variant: JointVariant,
    pub(crate) frame: JointFrame,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) handle: Option<ImpulseJointHandle>,
    pub(crate) user_data: u64,
}

impl JointState {
    pub(crate) fn new(variant: JointVariant, frame: JointFrame, body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            variant,
            frame,
            body_a,
            body_b,
            handle: None,
            user_data: 0,
        }
    }

    pub(crate) fn is_assembled(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn assemble(
        &mut self,
        id: JointId,
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
        solver: &mut Solver,
    ) {
        debug_assert!(self.handle.is_none(), "joint {:?} assembled twice", id);
        if self.handle.is_some() {
            warn!("joint {:?} is already assembled", id);
            return;
        }
        let mut joint = self.variant.definition().build_definition(&self.frame);
        joint.user_data = id.user_data();
        self.handle = Some(solver.insert_joint(body_a, body_b, joint));
        trace!("joint {:?} assembled", id);
    }

    /// Refresh the variant and frame from the live joint, then destroy it.
    pub(crate) fn disassemble(&mut self, solver: &mut Solver) {
        debug_assert!(self.handle.is_some(), "joint disassembled twice");
        let Some(handle) = self.handle.take() else {
            warn!("joint is not assembled");
            return;
        };
        if let Some(live) = solver.impulse_joints.get(handle) {
            self.capture(&live.data);
        }
        solver.remove_joint(handle);
    }

    fn capture(&mut self, live: &GenericJoint) {
        self.variant.definition_mut().refresh_from_live(live);
        self.frame.anchor_a = point_to_vec2(&live.local_anchor1());
        self.frame.anchor_b = point_to_vec2(&live.local_anchor2());
    }

    /// Swap the live joint for one built from the current definition.
    fn rebuild(&mut self, solver: &mut Solver) {
        let Some(handle) = self.handle else {
            return;
        };
        let Some(old) = solver.remove_joint(handle) else {
            self.handle = None;
            return;
        };
        let mut joint = self.variant.definition().build_definition(&self.frame);
        joint.user_data = old.data.user_data;
        self.handle = Some(solver.insert_joint(old.body1, old.body2, joint));
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read access to a joint.
pub struct JointRef<'a> {
    pub(crate) id: JointId,
    pub(crate) state: &'a JointState,
    pub(crate) solver: &'a Solver,
    pub(crate) scale: UnitScale,
    pub(crate) operational: bool,
    pub(crate) active: bool,
}

impl JointRef<'_> {
    fn live(&self) -> Option<&ImpulseJoint> {
        if !self.operational {
            return None;
        }
        self.state.handle.and_then(|h| self.solver.impulse_joints.get(h))
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    pub fn joint_type(&self) -> JointType {
        self.state.variant.joint_type()
    }

    pub fn variant(&self) -> JointVariant {
        self.state.variant
    }

    pub fn body_a(&self) -> BodyId {
        self.state.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.state.body_b
    }

    /// Both endpoint bodies are operational.
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Both endpoint bodies are active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn user_data(&self) -> u64 {
        self.state.user_data
    }

    /// Distance or rope length in points; `None` for other variants.
    pub fn length(&self) -> Option<f32> {
        self.state.variant.length().map(|m| self.scale.to_points(m))
    }

    fn world_anchor(&self, on_a: bool) -> Vec2 {
        let Some(live) = self.live() else {
            return Vec2::ZERO;
        };
        let (body, local) = if on_a {
            (live.body1, live.data.local_anchor1())
        } else {
            (live.body2, live.data.local_anchor2())
        };
        match self.solver.bodies.get(body) {
            Some(rb) => self.scale.vec_to_points(point_to_vec2(&(rb.position() * local))),
            None => Vec2::ZERO,
        }
    }

    /// Anchor on body A in world points; `Vec2::ZERO` unless operational.
    pub fn anchor_a(&self) -> Vec2 {
        self.world_anchor(true)
    }

    /// Anchor on body B in world points; `Vec2::ZERO` unless operational.
    pub fn anchor_b(&self) -> Vec2 {
        self.world_anchor(false)
    }

    /// Linear (world frame, meters) and angular impulse the joint applied
    /// during the last step. Locked axes report through `impulses`, limited
    /// axes through their limit.
    fn last_impulse(&self, live: &ImpulseJoint) -> (Vec2, f32) {
        let Some(rb1) = self.solver.bodies.get(live.body1) else {
            return (Vec2::ZERO, 0.0);
        };
        let frame = (rb1.position() * live.data.local_frame1).rotation;
        let locked = frame * nalgebra::Vector2::new(live.impulses.x, live.impulses.y);
        let mut linear = Vec2::new(locked.x, locked.y);

        if live.data.coupled_axes.contains(JointAxesMask::LIN_AXES) {
            if let Some(limit) = live.data.limits(JointAxis::LinX) {
                let dir = (self.anchor_b() - self.anchor_a()).normalize_or_zero();
                linear += dir * limit.impulse;
            }
        } else {
            for (axis, unit) in [(JointAxis::LinX, Vec2::X), (JointAxis::LinY, Vec2::Y)] {
                if let Some(limit) = live.data.limits(axis) {
                    let world = frame * vec2_to_na(unit);
                    linear += Vec2::new(world.x, world.y) * limit.impulse;
                }
            }
        }

        let mut angular = live.impulses.z;
        if let Some(limit) = live.data.limits(JointAxis::AngX) {
            angular += limit.impulse;
        }
        (linear, angular)
    }

    /// Reaction force on body B (kg·points/s²) over a step of `1 / inv_dt`
    /// seconds; `Vec2::ZERO` unless operational.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match self.live() {
            Some(live) => {
                let (impulse, _) = self.last_impulse(live);
                self.scale.vec_to_points(impulse * inv_dt)
            }
            None => Vec2::ZERO,
        }
    }

    /// Reaction torque on body B (kg·points²/s²); zero unless operational.
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        match self.live() {
            Some(live) => {
                let (_, impulse) = self.last_impulse(live);
                let ppm = self.scale.points_per_meter();
                impulse * inv_dt * ppm * ppm
            }
            None => 0.0,
        }
    }
}

/// Write access to a joint.
pub struct JointMut<'a> {
    pub(crate) state: &'a mut JointState,
    pub(crate) solver: &'a mut Solver,
    pub(crate) scale: UnitScale,
}

impl JointMut<'_> {
    /// Change a distance or rope joint's length (points). A live joint is
    /// rebuilt in place.
    pub fn set_length(&mut self, length: f32) -> Result<()> {
        if !length.is_finite() || length < 0.0 {
            return Err(PhysicsError::InvalidDimension {
                what: "joint length",
                value: length,
            });
        }
        let kind = self.state.variant.joint_type();
        if !self.state.variant.set_length(self.scale.to_meters(length)) {
            return Err(PhysicsError::NoLength(kind));
        }
        self.state.rebuild(self.solver);
        Ok(())
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.state.user_data = user_data;
    }
}

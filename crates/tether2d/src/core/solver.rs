use std::cell::RefCell;
use std::num::NonZeroUsize;

use glam::Vec2;
use rapier2d::prelude::*;

// ---------------------------------------------------------------------------
// Conversion helpers: glam to nalgebra and back
// ---------------------------------------------------------------------------

pub(crate) fn vec2_to_na(v: Vec2) -> nalgebra::Vector2<f32> {
    nalgebra::Vector2::new(v.x, v.y)
}

pub(crate) fn vec2_to_point(v: Vec2) -> nalgebra::Point2<f32> {
    nalgebra::Point2::new(v.x, v.y)
}

pub(crate) fn na_to_vec2(v: &nalgebra::Vector2<f32>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

pub(crate) fn point_to_vec2(p: &nalgebra::Point2<f32>) -> Vec2 {
    Vec2::new(p.x, p.y)
}

pub(crate) fn na_iso_to_pos_rot(iso: &nalgebra::Isometry2<f32>) -> (Vec2, f32) {
    let pos = Vec2::new(iso.translation.x, iso.translation.y);
    let rot = iso.rotation.angle();
    (pos, rot)
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

/// Every Rapier set and pipeline stage a world needs, in solver units.
///
/// The lifecycle layer only ever reaches the native objects through here.
pub(crate) struct Solver {
    gravity: nalgebra::Vector2<f32>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    pub(crate) island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    pub(crate) bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    pub(crate) impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    // Ray casts take `&self`; the pipeline is refreshed lazily before each query.
    query_pipeline: RefCell<QueryPipeline>,
}

impl Solver {
    /// Gravity is in m/s².
    pub(crate) fn new(gravity: Vec2) -> Self {
        Self {
            gravity: vec2_to_na(gravity),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: RefCell::new(QueryPipeline::new()),
        }
    }

    pub(crate) fn gravity(&self) -> Vec2 {
        na_to_vec2(&self.gravity)
    }

    pub(crate) fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = vec2_to_na(gravity);
    }

    /// Advance the native simulation by `dt` seconds.
    ///
    /// Velocity iterations drive the outer solver loop; position iterations
    /// drive the inner stabilization passes. Both are clamped to at least one.
    pub(crate) fn step(
        &mut self,
        dt: f32,
        velocity_iterations: usize,
        position_iterations: usize,
        hooks: &dyn PhysicsHooks,
        events: &dyn EventHandler,
    ) {
        self.integration_parameters.dt = dt;
        self.integration_parameters.num_solver_iterations =
            NonZeroUsize::new(velocity_iterations.max(1)).unwrap_or(NonZeroUsize::MIN);
        self.integration_parameters.num_internal_pgs_iterations = position_iterations.max(1);

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(self.query_pipeline.get_mut()),
            hooks,
            events,
        );
    }

    pub(crate) fn insert_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.bodies.insert(body)
    }

    /// Remove a body. Attached colliders and joints go with it, so callers must
    /// capture them first.
    pub(crate) fn remove_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        )
    }

    pub(crate) fn insert_collider(
        &mut self,
        collider: Collider,
        parent: RigidBodyHandle,
    ) -> ColliderHandle {
        self.colliders
            .insert_with_parent(collider, parent, &mut self.bodies)
    }

    pub(crate) fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider> {
        self.colliders
            .remove(handle, &mut self.island_manager, &mut self.bodies, true)
    }

    pub(crate) fn insert_joint(
        &mut self,
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
        joint: GenericJoint,
    ) -> ImpulseJointHandle {
        self.impulse_joints.insert(body_a, body_b, joint, true)
    }

    pub(crate) fn remove_joint(&mut self, handle: ImpulseJointHandle) -> Option<ImpulseJoint> {
        self.impulse_joints.remove(handle, true)
    }

    /// Zero the user force and torque accumulators on every body.
    pub(crate) fn clear_forces(&mut self) {
        for (_, rb) in self.bodies.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
    }

    /// Visit every collider crossed by the segment `origin .. origin + dir`.
    ///
    /// The callback receives the collider's `user_data`, the fraction along the
    /// segment and the surface normal; returning `false` stops the query.
    pub(crate) fn intersections_with_ray(
        &self,
        origin: Vec2,
        dir: Vec2,
        mut callback: impl FnMut(u128, f32, Vec2) -> bool,
    ) {
        let mut query = self.query_pipeline.borrow_mut();
        query.update(&self.colliders);

        let ray = Ray::new(vec2_to_point(origin), vec2_to_na(dir));
        query.intersections_with_ray(
            &self.bodies,
            &self.colliders,
            &ray,
            1.0,
            true,
            QueryFilter::default(),
            |handle, intersection| match self.colliders.get(handle) {
                Some(collider) => callback(
                    collider.user_data,
                    intersection.time_of_impact,
                    na_to_vec2(&intersection.normal),
                ),
                None => true,
            },
        );
    }

    pub(crate) fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub(crate) fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub(crate) fn joint_count(&self) -> usize {
        self.impulse_joints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_body(solver: &mut Solver, pos: Vec2) -> (RigidBodyHandle, ColliderHandle) {
        let body = solver.insert_body(
            RigidBodyBuilder::dynamic()
                .translation(vec2_to_na(pos))
                .build(),
        );
        let collider = solver.insert_collider(ColliderBuilder::ball(0.5).build(), body);
        (body, collider)
    }

    #[test]
    fn insert_and_remove_body_takes_colliders() {
        let mut solver = Solver::new(Vec2::ZERO);
        let (body, _) = ball_body(&mut solver, Vec2::ZERO);
        assert_eq!(solver.body_count(), 1);
        assert_eq!(solver.collider_count(), 1);
        assert!(solver.remove_body(body).is_some());
        assert_eq!(solver.body_count(), 0);
        assert_eq!(solver.collider_count(), 0);
    }

    #[test]
    fn gravity_moves_dynamic_body() {
        let mut solver = Solver::new(Vec2::new(0.0, -9.8));
        let (body, _) = ball_body(&mut solver, Vec2::ZERO);
        for _ in 0..10 {
            solver.step(1.0 / 60.0, 4, 1, &(), &());
        }
        let y = solver.bodies[body].translation().y;
        assert!(y < 0.0, "Body should fall: y={}", y);
    }

    #[test]
    fn ray_reports_fraction() {
        let mut solver = Solver::new(Vec2::ZERO);
        ball_body(&mut solver, Vec2::new(5.0, 0.0));
        let mut hits = Vec::new();
        solver.intersections_with_ray(Vec2::ZERO, Vec2::new(10.0, 0.0), |_, fraction, normal| {
            hits.push((fraction, normal));
            true
        });
        assert_eq!(hits.len(), 1);
        assert!((hits[0].0 - 0.45).abs() < 0.001, "fraction={}", hits[0].0);
        assert!((hits[0].1.x + 1.0).abs() < 0.001);
    }

    #[test]
    fn joints_follow_bodies_out() {
        let mut solver = Solver::new(Vec2::ZERO);
        let (a, _) = ball_body(&mut solver, Vec2::ZERO);
        let (b, _) = ball_body(&mut solver, Vec2::new(2.0, 0.0));
        solver.insert_joint(a, b, FixedJointBuilder::new().build().into());
        assert_eq!(solver.joint_count(), 1);
        solver.remove_body(a);
        assert_eq!(solver.joint_count(), 0);
    }
}

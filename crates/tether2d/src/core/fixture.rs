use glam::Vec2;
use log::{trace, warn};
use rapier2d::parry::query::PointQuery;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::solver::{vec2_to_na, vec2_to_point, Solver};
use crate::error::{PhysicsError, Result};
use crate::ids::{BodyId, FixtureId};
use crate::units::UnitScale;

/// The maximum number of vertices allowed for a polygon-shaped fixture.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// The minimum number of vertices allowed for a polygon-shaped fixture.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Collision geometry in body-local display units. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// A hollow chain of edges, optionally closed into a loop.
    EdgeChain { vertices: Vec<Vec2>, closed: bool },
    /// A filled convex polygon.
    Polygon { vertices: Vec<Vec2> },
    Circle { radius: f32, center: Vec2 },
    /// A box of the given full size, offset and rotated relative to the body.
    Rect { size: Vec2, center: Vec2, angle: f32 },
}

impl Shape {
    pub fn edge_chain(vertices: Vec<Vec2>, closed: bool) -> Result<Self> {
        Self::EdgeChain { vertices, closed }.validated()
    }

    /// A convex polygon with between `MIN_POLYGON_VERTICES` and
    /// `MAX_POLYGON_VERTICES` vertices.
    pub fn polygon(vertices: Vec<Vec2>) -> Result<Self> {
        Self::Polygon { vertices }.validated()
    }

    /// A circle located at the body's origin.
    pub fn circle(radius: f32) -> Result<Self> {
        Self::circle_at(radius, Vec2::ZERO)
    }

    pub fn circle_at(radius: f32, center: Vec2) -> Result<Self> {
        Self::Circle { radius, center }.validated()
    }

    /// An axis-aligned box centered on the body's origin.
    pub fn rect(size: Vec2) -> Result<Self> {
        Self::oriented_box(size, Vec2::ZERO, 0.0)
    }

    pub fn rect_at(size: Vec2, center: Vec2) -> Result<Self> {
        Self::oriented_box(size, center, 0.0)
    }

    pub fn oriented_box(size: Vec2, center: Vec2, angle: f32) -> Result<Self> {
        Self::Rect { size, center, angle }.validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Reject shapes the solver cannot build.
    pub fn validate(&self) -> Result<()> {
        match self {
            Shape::EdgeChain { vertices, .. } => {
                if vertices.len() < 2 {
                    return Err(PhysicsError::TooFewVertices {
                        count: vertices.len(),
                        min: 2,
                    });
                }
                check_finite_points(vertices)
            }
            Shape::Polygon { vertices } => {
                if vertices.len() < MIN_POLYGON_VERTICES {
                    return Err(PhysicsError::TooFewVertices {
                        count: vertices.len(),
                        min: MIN_POLYGON_VERTICES,
                    });
                }
                if vertices.len() > MAX_POLYGON_VERTICES {
                    return Err(PhysicsError::TooManyVertices {
                        count: vertices.len(),
                        max: MAX_POLYGON_VERTICES,
                    });
                }
                check_finite_points(vertices)?;
                if polygon_area(vertices).abs() <= f32::EPSILON {
                    return Err(PhysicsError::DegeneratePolygon);
                }
                let points: Vec<_> = vertices.iter().map(|v| vec2_to_point(*v)).collect();
                if ColliderBuilder::convex_hull(&points).is_none() {
                    return Err(PhysicsError::DegeneratePolygon);
                }
                Ok(())
            }
            Shape::Circle { radius, center } => {
                check_positive("radius", *radius)?;
                check_finite_points(std::slice::from_ref(center))
            }
            Shape::Rect { size, center, angle } => {
                check_positive("box width", size.x)?;
                check_positive("box height", size.y)?;
                if !angle.is_finite() {
                    return Err(PhysicsError::InvalidDimension {
                        what: "box angle",
                        value: *angle,
                    });
                }
                check_finite_points(std::slice::from_ref(center))
            }
        }
    }

    /// Build the native collider geometry in solver units.
    fn build(&self, scale: UnitScale) -> Option<ColliderBuilder> {
        let to_point = |v: &Vec2| vec2_to_point(scale.vec_to_meters(*v));
        match self {
            Shape::EdgeChain { vertices, closed } => {
                let points: Vec<_> = vertices.iter().map(to_point).collect();
                let n = points.len() as u32;
                let mut indices: Vec<[u32; 2]> = (0..n.saturating_sub(1)).map(|i| [i, i + 1]).collect();
                if *closed && n > 2 {
                    indices.push([n - 1, 0]);
                }
                Some(ColliderBuilder::polyline(points, Some(indices)))
            }
            Shape::Polygon { vertices } => {
                let points: Vec<_> = vertices.iter().map(to_point).collect();
                ColliderBuilder::convex_hull(&points)
            }
            Shape::Circle { radius, center } => Some(
                ColliderBuilder::ball(scale.to_meters(*radius))
                    .translation(vec2_to_na(scale.vec_to_meters(*center))),
            ),
            Shape::Rect { size, center, angle } => {
                let half = scale.vec_to_meters(*size) * 0.5;
                Some(
                    ColliderBuilder::cuboid(half.x, half.y)
                        .translation(vec2_to_na(scale.vec_to_meters(*center)))
                        .rotation(angle.to_radians()),
                )
            }
        }
    }
}

/// Signed shoelace area; zero for collinear or repeated vertices.
fn polygon_area(vertices: &[Vec2]) -> f32 {
    let n = vertices.len();
    let twice: f32 = (0..n)
        .map(|i| vertices[i].perp_dot(vertices[(i + 1) % n]))
        .sum();
    twice * 0.5
}

fn check_positive(what: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidDimension { what, value })
    }
}

fn check_finite_points(points: &[Vec2]) -> Result<()> {
    match points.iter().find(|p| !p.is_finite()) {
        Some(p) => Err(PhysicsError::InvalidDimension {
            what: "vertex",
            value: if p.x.is_finite() { p.y } else { p.x },
        }),
        None => Ok(()),
    }
}

/// Physical material properties for a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Friction, usually in [0, 1].
    pub friction: f32,
    /// Restitution (bounciness), usually in [0, 1].
    pub restitution: f32,
    /// Density in kg / point².
    pub density: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.3,
            friction: 0.5,
            density: 1.0,
        }
    }
}

/// Collision filtering. Two fixtures collide when each one's category is in
/// the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Category bits, typically a single bit.
    pub category: u16,
    /// Categories this fixture may collide with.
    pub mask: u16,
    /// Sensors report contacts but never produce a collision response.
    pub sensor: bool,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category: 0x0001,
            mask: 0xFFFF,
            sensor: false,
        }
    }
}

impl Filter {
    fn groups(&self) -> InteractionGroups {
        InteractionGroups::new(
            Group::from_bits_truncate(self.category as u32),
            Group::from_bits_truncate(self.mask as u32),
        )
    }
}

/// Configuration from which a fixture is (re)assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDef {
    pub shape: Shape,
    #[serde(default)]
    pub material: Material,
    #[serde(default)]
    pub filter: Filter,
    /// Free for client use.
    #[serde(default)]
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            material: Material::default(),
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.filter.sensor = sensor;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

// ---------------------------------------------------------------------------
// Arena record and assembly
// ---------------------------------------------------------------------------

pub(crate) struct FixtureState {
    pub(crate) def: FixtureDef,
    pub(crate) body: Option<BodyId>,
    pub(crate) handle: Option<ColliderHandle>,
}

impl FixtureState {
    pub(crate) fn new(def: FixtureDef) -> Self {
        Self {
            def,
            body: None,
            handle: None,
        }
    }

    pub(crate) fn is_assembled(&self) -> bool {
        self.handle.is_some()
    }

    /// Build a native collider from the cached definition and attach it.
    pub(crate) fn assemble(
        &mut self,
        id: FixtureId,
        parent: RigidBodyHandle,
        solver: &mut Solver,
        scale: UnitScale,
    ) {
        debug_assert!(self.handle.is_none(), "fixture {:?} assembled twice", id);
        if self.handle.is_some() {
            warn!("fixture {:?} is already assembled", id);
            return;
        }
        let Some(builder) = self.def.shape.build(scale) else {
            warn!("fixture {:?} has a shape the solver rejected", id);
            return;
        };
        let material = self.def.material;
        let collider = builder
            .friction(material.friction)
            .restitution(material.restitution)
            .density(scale.density_to_solver(material.density))
            .collision_groups(self.def.filter.groups())
            .sensor(self.def.filter.sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .user_data(id.user_data())
            .build();
        self.handle = Some(solver.insert_collider(collider, parent));
        trace!("fixture {:?} assembled", id);
    }

    /// Capture the live material back into the definition, then destroy the
    /// native collider.
    pub(crate) fn disassemble(&mut self, solver: &mut Solver, scale: UnitScale) {
        debug_assert!(self.handle.is_some(), "fixture disassembled twice");
        let Some(handle) = self.handle.take() else {
            warn!("fixture is not assembled");
            return;
        };
        if let Some(collider) = solver.colliders.get(handle) {
            self.capture(collider, scale);
        }
        solver.remove_collider(handle);
    }

    fn capture(&mut self, collider: &Collider, scale: UnitScale) {
        self.def.material = Material {
            friction: collider.friction(),
            restitution: collider.restitution(),
            density: scale.density_to_points(collider.density()),
        };
        self.def.filter.sensor = collider.is_sensor();
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Read access to a fixture.
pub struct FixtureRef<'a> {
    pub(crate) id: FixtureId,
    pub(crate) state: &'a FixtureState,
    pub(crate) solver: &'a Solver,
    pub(crate) scale: UnitScale,
    pub(crate) operational: bool,
}

impl FixtureRef<'_> {
    pub fn id(&self) -> FixtureId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.state.def.shape
    }

    pub fn friction(&self) -> f32 {
        self.state.def.material.friction
    }

    pub fn restitution(&self) -> f32 {
        self.state.def.material.restitution
    }

    pub fn density(&self) -> f32 {
        self.state.def.material.density
    }

    pub fn material(&self) -> Material {
        self.state.def.material
    }

    pub fn filter(&self) -> Filter {
        self.state.def.filter
    }

    pub fn is_sensor(&self) -> bool {
        self.state.def.filter.sensor
    }

    pub fn user_data(&self) -> u64 {
        self.state.def.user_data
    }

    /// The body this fixture is attached to, if any.
    pub fn body(&self) -> Option<BodyId> {
        self.state.body
    }

    /// Operational iff the owning body is operational.
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Whether a world point (display units) lies inside the fixture.
    /// Always `false` while not operational.
    pub fn test_point(&self, point: Vec2) -> bool {
        if !self.operational {
            return false;
        }
        let Some(collider) = self.state.handle.and_then(|h| self.solver.colliders.get(h)) else {
            return false;
        };
        let pt = vec2_to_point(self.scale.vec_to_meters(point));
        collider.shape().contains_point(collider.position(), &pt)
    }

    /// A copy of the cached configuration.
    pub fn def(&self) -> FixtureDef {
        self.state.def.clone()
    }
}

/// Write access to a fixture's material and filter. Changes reach the live
/// collider immediately and are kept in the cached definition.
pub struct FixtureMut<'a> {
    pub(crate) state: &'a mut FixtureState,
    pub(crate) solver: &'a mut Solver,
    pub(crate) scale: UnitScale,
}

impl FixtureMut<'_> {
    fn live(&mut self) -> Option<&mut Collider> {
        self.state.handle.and_then(|h| self.solver.colliders.get_mut(h))
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.state.def.material.friction = friction;
        if let Some(collider) = self.live() {
            collider.set_friction(friction);
        }
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.state.def.material.restitution = restitution;
        if let Some(collider) = self.live() {
            collider.set_restitution(restitution);
        }
    }

    pub fn set_density(&mut self, density: f32) {
        self.state.def.material.density = density;
        let solver_density = self.scale.density_to_solver(density);
        if let Some(collider) = self.live() {
            collider.set_density(solver_density);
        }
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.state.def.filter = filter;
        if let Some(collider) = self.live() {
            collider.set_collision_groups(filter.groups());
            collider.set_sensor(filter.sensor);
        }
    }

    pub fn set_collision_category(&mut self, category: u16) {
        let filter = Filter {
            category,
            ..self.state.def.filter
        };
        self.set_filter(filter);
    }

    pub fn set_collision_mask(&mut self, mask: u16) {
        let filter = Filter {
            mask,
            ..self.state.def.filter
        };
        self.set_filter(filter);
    }

    pub fn set_sensor(&mut self, sensor: bool) {
        let filter = Filter {
            sensor,
            ..self.state.def.filter
        };
        self.set_filter(filter);
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.state.def.user_data = user_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_vertex_bounds() {
        let two = vec![Vec2::ZERO, Vec2::X];
        assert_eq!(
            Shape::polygon(two),
            Err(PhysicsError::TooFewVertices { count: 2, min: 3 })
        );

        let nine: Vec<Vec2> = (0..9)
            .map(|i| {
                let a = i as f32 / 9.0 * std::f32::consts::TAU;
                Vec2::new(a.cos(), a.sin()) * 10.0
            })
            .collect();
        assert_eq!(
            Shape::polygon(nine),
            Err(PhysicsError::TooManyVertices { count: 9, max: 8 })
        );

        let triangle = vec![Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(0.0, 10.0)];
        assert!(Shape::polygon(triangle).is_ok());
    }

    #[test]
    fn collinear_polygon_is_degenerate() {
        let line = vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert_eq!(Shape::polygon(line), Err(PhysicsError::DegeneratePolygon));
    }

    #[test]
    fn circle_and_box_dimensions() {
        assert!(Shape::circle(0.0).is_err());
        assert!(Shape::circle(-1.0).is_err());
        assert!(Shape::circle(1.0).is_ok());
        assert!(Shape::rect(Vec2::new(0.0, 4.0)).is_err());
        assert!(Shape::oriented_box(Vec2::new(2.0, 4.0), Vec2::ONE, 45.0).is_ok());
    }

    #[test]
    fn edge_chain_needs_two_vertices() {
        assert!(Shape::edge_chain(vec![Vec2::ZERO], false).is_err());
        assert!(Shape::edge_chain(vec![Vec2::ZERO, Vec2::X], false).is_ok());
    }

    #[test]
    fn material_and_filter_defaults() {
        let mat = Material::default();
        assert!((mat.restitution - 0.3).abs() < 0.001);
        assert!((mat.friction - 0.5).abs() < 0.001);
        assert!((mat.density - 1.0).abs() < 0.001);

        let filter = Filter::default();
        assert_eq!(filter.category, 0x0001);
        assert_eq!(filter.mask, 0xFFFF);
        assert!(!filter.sensor);
    }

    #[test]
    fn fixture_def_from_json() {
        let json = r#"{ "shape": { "Circle": { "radius": 4.0, "center": [1.0, 2.0] } },
                        "filter": { "sensor": true } }"#;
        let def: FixtureDef = serde_json::from_str(json).unwrap();
        assert_eq!(
            def.shape,
            Shape::Circle {
                radius: 4.0,
                center: Vec2::new(1.0, 2.0)
            }
        );
        assert!(def.filter.sensor);
        assert_eq!(def.filter.mask, 0xFFFF);
    }

    #[test]
    fn assemble_and_disassemble_round_trip() {
        let scale = UnitScale::default();
        let mut solver = Solver::new(Vec2::ZERO);
        let parent = solver.insert_body(RigidBodyBuilder::dynamic().build());
        let id = FixtureId::new(crate::ids::WorldId::next(), 0);

        let def = FixtureDef::new(Shape::circle(16.0).unwrap()).with_material(Material {
            friction: 0.25,
            restitution: 0.5,
            density: 2.0,
        });
        let mut state = FixtureState::new(def.clone());
        state.assemble(id, parent, &mut solver, scale);
        assert!(state.is_assembled());
        assert_eq!(solver.collider_count(), 1);

        state.disassemble(&mut solver, scale);
        assert!(!state.is_assembled());
        assert_eq!(solver.collider_count(), 0);
        assert!((state.def.material.density - 2.0).abs() < 0.001);
        assert!((state.def.material.friction - 0.25).abs() < 0.001);
    }
}

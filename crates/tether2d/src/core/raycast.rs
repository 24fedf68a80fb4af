use glam::Vec2;

use crate::ids::FixtureId;

/// Which intersections a ray cast keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RayIntersectionType {
    /// The first hit reported; the query stops there.
    Any,
    /// Every hit.
    #[default]
    All,
    /// Only the hit nearest the start point.
    Closest,
    /// Only the hit nearest the end point.
    Farthest,
}

/// One fixture crossed by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastIntersection {
    pub(crate) fixture: FixtureId,
    pub(crate) point: Vec2,
    pub(crate) normal: Vec2,
    pub(crate) fraction: f32,
}

impl RayCastIntersection {
    pub fn fixture(&self) -> FixtureId {
        self.fixture
    }

    /// World point of the hit, in points.
    pub fn point(&self) -> Vec2 {
        self.point
    }

    /// Surface normal at the hit.
    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    /// Position along the cast segment, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        self.fraction
    }
}

/// Applies a `RayIntersectionType` to hits arriving in solver order.
#[derive(Debug, Default)]
pub struct RayCastCollector {
    policy: RayIntersectionType,
    results: Vec<RayCastIntersection>,
}

impl RayCastCollector {
    pub fn new(policy: RayIntersectionType) -> Self {
        Self {
            policy,
            results: Vec::new(),
        }
    }

    /// Offer a hit. Returns whether the query should keep going.
    pub fn report(&mut self, hit: RayCastIntersection) -> bool {
        match self.policy {
            RayIntersectionType::Any => {
                self.results.push(hit);
                false
            }
            RayIntersectionType::All => {
                self.results.push(hit);
                true
            }
            RayIntersectionType::Closest => {
                self.keep_if(hit, |new, old| new < old);
                true
            }
            RayIntersectionType::Farthest => {
                self.keep_if(hit, |new, old| new > old);
                true
            }
        }
    }

    fn keep_if(&mut self, hit: RayCastIntersection, better: impl Fn(f32, f32) -> bool) {
        match self.results.first() {
            Some(best) if !better(hit.fraction, best.fraction) => {}
            _ => {
                self.results.clear();
                self.results.push(hit);
            }
        }
    }

    pub fn into_results(self) -> Vec<RayCastIntersection> {
        self.results
    }
}

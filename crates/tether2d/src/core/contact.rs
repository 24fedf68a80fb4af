use glam::Vec2;
use log::warn;

use crate::ids::FixtureId;

/// At most this many intersection points are reported per contact.
pub const MAX_CONTACT_POINTS: usize = 2;

/// A collision event between two fixtures.
///
/// Contacts handed to `contact_pre_solve` are modifiable until the callback
/// returns; every other contact is frozen from the start. Freezing is one-way.
#[derive(Debug)]
pub struct Contact {
    pub(crate) fixture_a: FixtureId,
    pub(crate) fixture_b: FixtureId,
    pub(crate) normal: Vec2,
    pub(crate) points: Vec<Vec2>,
    pub(crate) touching: bool,
    pub(crate) sensor: bool,
    pub(crate) enabled: bool,
    modifiable: bool,
}

impl Contact {
    pub(crate) fn new(fixture_a: FixtureId, fixture_b: FixtureId, modifiable: bool) -> Self {
        Self {
            fixture_a,
            fixture_b,
            normal: Vec2::ZERO,
            points: Vec::with_capacity(MAX_CONTACT_POINTS),
            touching: false,
            sensor: false,
            enabled: true,
            modifiable,
        }
    }

    pub(crate) fn with_geometry(mut self, normal: Vec2, points: impl IntoIterator<Item = Vec2>) -> Self {
        self.normal = normal;
        self.points = points.into_iter().take(MAX_CONTACT_POINTS).collect();
        self
    }

    pub fn fixture_a(&self) -> FixtureId {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureId {
        self.fixture_b
    }

    /// Unit normal pointing from fixture A to fixture B.
    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    /// Intersection points in world points. Zero to two entries.
    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    /// Average of the intersection points; `Vec2::ZERO` when there are none.
    pub fn center(&self) -> Vec2 {
        if self.points.is_empty() {
            return Vec2::ZERO;
        }
        self.points.iter().copied().sum::<Vec2>() / self.points.len() as f32
    }

    /// The shapes overlap.
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Either fixture is a sensor.
    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_modifiable(&self) -> bool {
        self.modifiable
    }

    /// Enable or disable the collision response for this step.
    ///
    /// Returns `false` and leaves the contact untouched once it is frozen.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if !self.modifiable {
            warn!(
                "ignoring set_enabled({}) on frozen contact {:?}/{:?}",
                enabled, self.fixture_a, self.fixture_b
            );
            return false;
        }
        self.enabled = enabled;
        true
    }

    pub(crate) fn end_modifiability(&mut self) {
        self.modifiable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorldId;

    fn pair() -> (FixtureId, FixtureId) {
        let world = WorldId::next();
        (FixtureId::new(world, 0), FixtureId::new(world, 1))
    }

    #[test]
    fn freeze_is_one_way() {
        let (a, b) = pair();
        let mut contact = Contact::new(a, b, true);
        assert!(contact.set_enabled(false));
        assert!(contact.set_enabled(true));
        assert!(contact.set_enabled(false));
        contact.end_modifiability();

        assert!(!contact.is_modifiable());
        assert!(!contact.set_enabled(true));
        assert!(!contact.is_enabled(), "last pre-solve value must stick");
    }

    #[test]
    fn frozen_from_construction() {
        let (a, b) = pair();
        let mut contact = Contact::new(a, b, false);
        assert!(!contact.set_enabled(false));
        assert!(contact.is_enabled());
    }

    #[test]
    fn center_averages_points() {
        let (a, b) = pair();
        let contact = Contact::new(a, b, false)
            .with_geometry(Vec2::Y, [Vec2::new(0.0, 0.0), Vec2::new(4.0, 2.0), Vec2::new(9.0, 9.0)]);
        assert_eq!(contact.points().len(), MAX_CONTACT_POINTS);
        assert_eq!(contact.center(), Vec2::new(2.0, 1.0));

        let empty = Contact::new(a, b, false);
        assert_eq!(empty.center(), Vec2::ZERO);
    }
}

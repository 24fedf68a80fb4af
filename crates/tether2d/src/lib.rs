pub mod config;
pub mod core;
pub mod error;
pub mod ids;
pub mod units;

// Re-export key types at crate root for convenience
pub use config::WorldConfig;
pub use error::{PhysicsError, Result};
pub use ids::{BodyId, FixtureId, JointId, WorldId};
pub use units::UnitScale;

pub use crate::core::body::{BodyDef, BodyMut, BodyRef, BodyType};
pub use crate::core::contact::{Contact, MAX_CONTACT_POINTS};
pub use crate::core::fixture::{
    Filter, FixtureDef, FixtureMut, FixtureRef, Material, Shape,
    MAX_POLYGON_VERTICES, MIN_POLYGON_VERTICES,
};
pub use crate::core::joint::{
    DistanceJoint, JointDefinition, JointEdge, JointFrame, JointMut, JointRef,
    JointType, JointVariant, PrismaticJoint, RevoluteJoint, RopeJoint, WeldJoint,
};
pub use crate::core::listener::{ContactCallbacks, ContactDelegate};
pub use crate::core::raycast::{RayCastCollector, RayCastIntersection, RayIntersectionType};
pub use crate::core::world::World;

// Solver crate, for implementors of `JointDefinition`.
pub use rapier2d;

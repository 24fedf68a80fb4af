//! Error taxonomy for the lifecycle layer.
//!
//! Only configuration errors and structural conflicts surface as `Err`.
//! Queries made against non-operational objects return neutral values instead,
//! and protocol violations are logged no-ops.

use thiserror::Error;

use crate::core::joint::JointType;
use crate::ids::{BodyId, FixtureId, JointId, WorldId};

/// Errors returned by world, body, fixture and joint operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A polygon was given fewer vertices than the solver accepts.
    #[error("polygon needs at least {min} vertices, got {count}")]
    TooFewVertices {
        /// Vertices supplied.
        count: usize,
        /// Lower bound.
        min: usize,
    },

    /// A polygon was given more vertices than the solver accepts.
    #[error("polygon accepts at most {max} vertices, got {count}")]
    TooManyVertices {
        /// Vertices supplied.
        count: usize,
        /// Upper bound.
        max: usize,
    },

    /// The vertices do not span a convex area (collinear or duplicated points).
    #[error("polygon vertices are degenerate")]
    DegeneratePolygon,

    /// A length, radius or scale was zero, negative or not finite.
    #[error("invalid {what}: {value}")]
    InvalidDimension {
        /// Which parameter was rejected.
        what: &'static str,
        /// The offending value.
        value: f32,
    },

    /// The body id was minted by another world.
    #[error("body {body:?} belongs to {owner:?}, not {world:?}")]
    ForeignBody {
        body: BodyId,
        owner: WorldId,
        world: WorldId,
    },

    /// The fixture id was minted by another world.
    #[error("fixture {fixture:?} belongs to {owner:?}, not {world:?}")]
    ForeignFixture {
        fixture: FixtureId,
        owner: WorldId,
        world: WorldId,
    },

    /// The joint id was minted by another world.
    #[error("joint {joint:?} belongs to {owner:?}, not {world:?}")]
    ForeignJoint {
        joint: JointId,
        owner: WorldId,
        world: WorldId,
    },

    /// The body has been destroyed.
    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),

    /// The fixture has been destroyed.
    #[error("unknown fixture {0:?}")]
    UnknownFixture(FixtureId),

    /// The joint has been destroyed.
    #[error("unknown joint {0:?}")]
    UnknownJoint(JointId),

    /// The fixture is already owned by a different body.
    #[error("fixture {fixture:?} is already attached to {body:?}")]
    FixtureAlreadyAttached { fixture: FixtureId, body: BodyId },

    /// A joint must connect two distinct bodies.
    #[error("cannot constrain {0:?} to itself")]
    SelfConstraint(BodyId),

    /// The joint type is declared but has no solver mapping.
    #[error("joint type {0:?} is not supported")]
    UnsupportedJointType(JointType),

    /// Only distance and rope joints carry a length.
    #[error("joint type {0:?} has no length")]
    NoLength(JointType),

    /// Malformed JSON configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;

impl From<serde_json::Error> for PhysicsError {
    fn from(err: serde_json::Error) -> Self {
        PhysicsError::Config(err.to_string())
    }
}

use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_WORLD_ID: AtomicU32 = AtomicU32::new(1);

/// Unique identifier for a world. Every body, fixture and joint id carries
/// the id of the world whose arena minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(pub(crate) u32);

impl WorldId {
    pub(crate) fn next() -> Self {
        WorldId(NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            pub(crate) world: WorldId,
            pub(crate) index: u32,
        }

        impl $name {
            pub(crate) fn new(world: WorldId, index: u32) -> Self {
                Self { world, index }
            }

            /// The world whose arena owns this object.
            pub fn world(&self) -> WorldId {
                self.world
            }

            /// Packed into Rapier `user_data` so native objects map back to ids.
            pub(crate) fn user_data(&self) -> u128 {
                self.index as u128
            }

        }
    };
}

arena_id!(
    /// Identity of a body. Copyable; resolves through its world.
    BodyId
);
arena_id!(
    /// Identity of a fixture.
    FixtureId
);
arena_id!(
    /// Identity of a joint.
    JointId
);

impl FixtureId {
    /// Recover a fixture id from a collider's `user_data`.
    pub(crate) fn from_user_data(world: WorldId, user_data: u128) -> Self {
        Self::new(world, user_data as u32)
    }
}

/// Monotonic index source for one arena.
#[derive(Debug, Default)]
pub(crate) struct IndexAllocator {
    next: u32,
}

impl IndexAllocator {
    pub(crate) fn allocate(&mut self) -> u32 {
        let index = self.next;
        self.next += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_ids_are_unique() {
        let a = WorldId::next();
        let b = WorldId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn user_data_round_trip() {
        let world = WorldId::next();
        let id = FixtureId::new(world, 42);
        assert_eq!(FixtureId::from_user_data(world, id.user_data()), id);
    }

    #[test]
    fn ids_from_different_worlds_differ() {
        let a = BodyId::new(WorldId::next(), 0);
        let b = BodyId::new(WorldId::next(), 0);
        assert_ne!(a, b);
        assert_ne!(a.world(), b.world());
    }
}

//! ID types for entities, owners and groups.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation-counted handle to an entity slot.
///
/// A handle stays comparable after its entity is despawned, but lookups with it
/// fail once the slot has been reused, since the slot's generation moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    /// Creates an entity ID from a slot index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Creates an entity ID from a packed raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self {
            index: (value & 0xFFFF_FFFF) as u32,
            generation: (value >> 32) as u32,
        }
    }

    /// Returns the packed raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Checks if this is a valid (non-null) entity ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}v{}", self.index, self.generation)
        } else {
            f.write_str("#null")
        }
    }
}

/// Identifier of the connection (player) that owns an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(u32);

impl OwnerId {
    /// Creates an owner ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Owner of server-controlled entities (neutral camps).
    pub const SERVER: Self = Self(u32::MAX);
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::SERVER {
            f.write_str("server")
        } else {
            write!(f, "owner:{}", self.0)
        }
    }
}

/// Identifier of an aggro group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(u32);

impl GroupId {
    /// Creates a group ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Identifier of a neutral camp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampId(u32);

impl CampId {
    /// Creates a camp ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

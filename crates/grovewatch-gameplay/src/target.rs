//! Weak references from an attacker to its target.
//!
//! A [`TargetRef`] stores only a generational [`EntityId`]. Resolving it goes
//! through the arena every time, so a destroyed or deactivated target simply
//! comes back as absent.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use grovewatch_common::EntityId;

use crate::entity::{Entity, EntityArena};

/// Weak, lifetime-safe handle to a potential target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef(Option<EntityId>);

impl TargetRef {
    /// Empty reference.
    pub const NONE: Self = Self(None);

    /// Reference to `id`.
    #[must_use]
    pub const fn to(id: EntityId) -> Self {
        Self(Some(id))
    }

    /// Stored handle, whether or not it still resolves.
    #[must_use]
    pub const fn id(self) -> Option<EntityId> {
        self.0
    }

    /// True if a handle is stored.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0.is_some()
    }

    /// True if this refers to `id`.
    #[must_use]
    pub fn is(self, id: EntityId) -> bool {
        self.0 == Some(id)
    }

    /// Drops the handle, returning what was stored.
    pub fn clear(&mut self) -> Option<EntityId> {
        self.0.take()
    }

    /// Resolves to the entity if it still exists and is active.
    #[must_use]
    pub fn resolve(self, entities: &EntityArena) -> Option<&Entity> {
        self.0
            .and_then(|id| entities.get(id).ok())
            .filter(|e| e.is_active())
    }

    /// Resolves to the entity only if it is a valid, living target.
    #[must_use]
    pub fn resolve_alive(self, entities: &EntityArena) -> Option<&Entity> {
        self.resolve(entities).filter(|e| e.is_alive())
    }

    /// Position of the target if it is still a valid, living target.
    #[must_use]
    pub fn position(self, entities: &EntityArena) -> Option<Vec3> {
        self.resolve_alive(entities).map(|e| e.position)
    }
}

/// True if `id` names an existing, active entity with living health.
#[must_use]
pub fn is_valid_target(entities: &EntityArena, id: EntityId) -> bool {
    entities.get(id).is_ok_and(Entity::is_alive)
}

//! Entity records and the generational arena that owns them.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use grovewatch_common::{EntityId, OwnerId};

use crate::health::Health;

/// Errors that can occur in entity operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EntityError {
    /// No live entity for this handle (never existed, despawned, or slot reused)
    #[error("Entity not found: {0}")]
    NotFound(EntityId),
    /// Entity exists but cannot take damage
    #[error("Entity has no health: {0}")]
    NoHealth(EntityId),
}

/// Result type for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// What kind of thing an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityClass {
    /// Player-controlled character
    Player,
    /// Hostile camp unit driven by the agent state machine
    Neutral,
    /// Stationary plant turret
    Turret,
    /// Player's life object; losing it ends respawns
    LifeFruit,
    /// Projectile in flight
    Projectile,
}

impl EntityClass {
    const fn bit(self) -> u8 {
        match self {
            Self::Player => 1,
            Self::Neutral => 1 << 1,
            Self::Turret => 1 << 2,
            Self::LifeFruit => 1 << 3,
            Self::Projectile => 1 << 4,
        }
    }
}

/// Set of entity classes, used to filter spatial queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassFilter(u8);

impl ClassFilter {
    /// Matches nothing.
    pub const NONE: Self = Self(0);
    /// Matches every class.
    pub const ALL: Self = Self(0b1_1111);
    /// Player characters only.
    pub const PLAYERS: Self = Self::only(EntityClass::Player);
    /// Everything that carries health.
    pub const DAMAGEABLE: Self = Self::PLAYERS
        .with(EntityClass::Neutral)
        .with(EntityClass::Turret)
        .with(EntityClass::LifeFruit);

    /// Filter matching a single class.
    #[must_use]
    pub const fn only(class: EntityClass) -> Self {
        Self(class.bit())
    }

    /// Adds a class to the filter.
    #[must_use]
    pub const fn with(self, class: EntityClass) -> Self {
        Self(self.0 | class.bit())
    }

    /// Removes a class from the filter.
    #[must_use]
    pub const fn without(self, class: EntityClass) -> Self {
        Self(self.0 & !class.bit())
    }

    /// True if `class` passes the filter.
    #[must_use]
    pub const fn contains(self, class: EntityClass) -> bool {
        self.0 & class.bit() != 0
    }
}

/// A simulated object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    class: EntityClass,
    owner: OwnerId,
    /// World position
    pub position: Vec3,
    /// Linear velocity (zeroed on respawn)
    pub velocity: Vec3,
    active: bool,
    health: Option<Health>,
}

impl Entity {
    /// Creates an active entity with no health, owned by the server.
    #[must_use]
    pub fn new(class: EntityClass) -> Self {
        Self {
            id: EntityId::NULL,
            class,
            owner: OwnerId::SERVER,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            active: true,
            health: None,
        }
    }

    /// Builder: set the owning connection.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    /// Builder: set the position.
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Builder: attach a health component.
    #[must_use]
    pub fn with_health(mut self, max: f32) -> Self {
        self.health = Some(Health::new(max));
        self
    }

    /// Builder: start inactive (e.g. waiting for a camp to populate).
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Handle assigned by the arena ([`EntityId::NULL`] before insertion).
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Entity class.
    #[must_use]
    pub const fn class(&self) -> EntityClass {
        self.class
    }

    /// Owning connection.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Hands the entity to another connection.
    pub fn set_owner(&mut self, owner: OwnerId) {
        self.owner = owner;
    }

    /// Whether the entity participates in the simulation.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Activates or deactivates the entity.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Health component, if damageable.
    #[must_use]
    pub const fn health(&self) -> Option<&Health> {
        self.health.as_ref()
    }

    /// Mutable health component, if damageable.
    pub fn health_mut(&mut self) -> Option<&mut Health> {
        self.health.as_mut()
    }

    /// True if the entity is active and has living health.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.active && self.health.as_ref().is_some_and(|h| !h.is_dead())
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Arena of entities addressed by generation-counted handles.
#[derive(Debug, Default)]
pub struct EntityArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    len: usize,
}

impl EntityArena {
    /// Creates a new empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the arena holds no entities.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slots, including free ones.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts an entity and returns its handle.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            },
        };
        let slot = &mut self.slots[index as usize];
        let id = EntityId::new(index, slot.generation);
        entity.id = id;
        slot.entity = Some(entity);
        self.len += 1;
        id
    }

    /// Removes an entity. The slot's generation advances so `id` goes stale.
    pub fn despawn(&mut self, id: EntityId) -> EntityResult<Entity> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .ok_or(EntityError::NotFound(id))?;
        let entity = slot.entity.take().ok_or(EntityError::NotFound(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index());
        self.len -= 1;
        Ok(entity)
    }

    /// Gets a reference to an entity by handle.
    pub fn get(&self, id: EntityId) -> EntityResult<&Entity> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entity.as_ref())
            .ok_or(EntityError::NotFound(id))
    }

    /// Gets a mutable reference to an entity by handle.
    pub fn get_mut(&mut self, id: EntityId) -> EntityResult<&mut Entity> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.entity.as_mut())
            .ok_or(EntityError::NotFound(id))
    }

    /// Mutable health of an entity.
    pub fn health_mut(&mut self, id: EntityId) -> EntityResult<&mut Health> {
        self.get_mut(id)?
            .health_mut()
            .ok_or(EntityError::NoHealth(id))
    }

    /// Checks if a live entity exists for this handle.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_ok()
    }

    /// Iterates over all entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.slots.iter().filter_map(|slot| slot.entity.as_ref())
    }

    /// Mutable iteration over all entities in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.slots.iter_mut().filter_map(|slot| slot.entity.as_mut())
    }

    /// Iterates over entities of one class.
    pub fn iter_by_class(&self, class: EntityClass) -> impl Iterator<Item = &Entity> {
        self.iter().filter(move |e| e.class == class)
    }

    /// Removes everything. Generations are kept so old handles stay stale.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entity.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free_list.push(index as u32);
        }
        self.free_list.reverse();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_insert_and_get() {
        let mut arena = EntityArena::new();
        let id = arena.insert(Entity::new(EntityClass::Player).with_health(100.0));

        assert!(id.is_valid());
        assert_eq!(arena.len(), 1);
        let entity = arena.get(id).expect("Entity should exist");
        assert_eq!(entity.class(), EntityClass::Player);
        assert_eq!(entity.id(), id);
        assert!(entity.is_alive());
    }

    #[test]
    fn test_arena_despawn_makes_handle_stale() {
        let mut arena = EntityArena::new();
        let id = arena.insert(Entity::new(EntityClass::Neutral));

        let entity = arena.despawn(id).expect("Despawn should succeed");
        assert_eq!(entity.class(), EntityClass::Neutral);
        assert!(arena.is_empty());
        assert_eq!(arena.get(id).err(), Some(EntityError::NotFound(id)));
        assert!(arena.despawn(id).is_err());
    }

    #[test]
    fn test_arena_reused_slot_rejects_old_handle() {
        let mut arena = EntityArena::new();
        let old = arena.insert(Entity::new(EntityClass::Player));
        arena.despawn(old).expect("Despawn should succeed");

        let new = arena.insert(Entity::new(EntityClass::Turret));
        assert_eq!(arena.capacity(), 1);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!arena.contains(old));
        assert_eq!(
            arena.get(new).expect("new entity").class(),
            EntityClass::Turret
        );
    }

    #[test]
    fn test_health_mut_requires_health() {
        let mut arena = EntityArena::new();
        let id = arena.insert(Entity::new(EntityClass::Projectile));
        assert_eq!(arena.health_mut(id).err(), Some(EntityError::NoHealth(id)));
    }

    #[test]
    fn test_inactive_entity_is_not_alive() {
        let entity = Entity::new(EntityClass::Neutral).with_health(10.0).inactive();
        assert!(!entity.is_alive());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut arena = EntityArena::new();
        let a = arena.insert(Entity::new(EntityClass::Player));
        let b = arena.insert(Entity::new(EntityClass::Player));
        arena.clear();
        assert!(arena.is_empty());
        assert!(!arena.contains(a));
        assert!(!arena.contains(b));
        let c = arena.insert(Entity::new(EntityClass::Player));
        assert_eq!(c.index(), 0);
    }

    #[test]
    fn test_class_filter() {
        assert!(ClassFilter::PLAYERS.contains(EntityClass::Player));
        assert!(!ClassFilter::PLAYERS.contains(EntityClass::Neutral));
        assert!(ClassFilter::DAMAGEABLE.contains(EntityClass::LifeFruit));
        assert!(!ClassFilter::DAMAGEABLE.contains(EntityClass::Projectile));
        assert!(!ClassFilter::ALL
            .without(EntityClass::Turret)
            .contains(EntityClass::Turret));
        assert!(!ClassFilter::NONE.contains(EntityClass::Player));
    }

    #[test]
    fn test_iter_by_class() {
        let mut arena = EntityArena::new();
        arena.insert(Entity::new(EntityClass::Player));
        arena.insert(Entity::new(EntityClass::Neutral));
        arena.insert(Entity::new(EntityClass::Neutral));
        assert_eq!(arena.iter_by_class(EntityClass::Neutral).count(), 2);
    }
}

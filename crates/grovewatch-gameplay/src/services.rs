//! External collaborators consumed by the simulation.
//!
//! The simulation never owns spatial indexing or pathfinding. It talks to them
//! through [`SpatialQuery`] and [`Navigation`], called synchronously during a
//! tick. In-process implementations are provided for the headless server
//! ([`SpatialSnapshot`], [`StraightLineNavigator`]) along with mocks for tests.

use ahash::{AHashMap, AHashSet};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use grovewatch_common::{
    horizontal_direction, horizontal_distance, segment_intersects_sphere, EntityId,
};

use crate::entity::{ClassFilter, EntityArena, EntityClass};

/// Spatial query interface.
pub trait SpatialQuery {
    /// Entities of the filtered classes within `radius` of `center`. Order is unspecified.
    fn query(&self, center: Vec3, radius: f32, filter: ClassFilter) -> Vec<EntityId>;
    /// Checks if nothing blocks the ray from `from` to `to`.
    fn has_line_of_sight(&self, from: Vec3, to: Vec3) -> bool;
}

/// Navigation interface.
pub trait Navigation {
    /// Starts (or redirects) movement of `entity` towards `destination`.
    fn set_destination(&mut self, entity: EntityId, destination: Vec3);
    /// Cancels any in-flight movement request for `entity`.
    fn stop(&mut self, entity: EntityId);
    /// True if `entity` has no movement request outstanding.
    fn has_arrived(&self, entity: EntityId) -> bool;
}

/// Spherical obstacle that blocks line of sight and projectiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Occluder {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl Occluder {
    /// Creates an occluder.
    #[must_use]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

#[derive(Debug, Clone, Copy)]
struct SnapshotEntry {
    id: EntityId,
    class: EntityClass,
    position: Vec3,
}

/// Brute-force spatial index captured from the arena at the start of a tick.
///
/// Results reflect positions at capture time; movement applied later in the
/// tick is seen on the next capture.
#[derive(Debug, Clone, Default)]
pub struct SpatialSnapshot {
    entries: Vec<SnapshotEntry>,
    occluders: Vec<Occluder>,
}

impl SpatialSnapshot {
    /// Captures every active entity.
    #[must_use]
    pub fn capture(entities: &EntityArena, occluders: &[Occluder]) -> Self {
        let entries = entities
            .iter()
            .filter(|e| e.is_active())
            .map(|e| SnapshotEntry {
                id: e.id(),
                class: e.class(),
                position: e.position,
            })
            .collect();
        Self {
            entries,
            occluders: occluders.to_vec(),
        }
    }

    /// Number of captured entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SpatialQuery for SpatialSnapshot {
    fn query(&self, center: Vec3, radius: f32, filter: ClassFilter) -> Vec<EntityId> {
        self.entries
            .iter()
            .filter(|entry| filter.contains(entry.class))
            .filter(|entry| horizontal_distance(center, entry.position) <= radius)
            .map(|entry| entry.id)
            .collect()
    }

    fn has_line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        !self
            .occluders
            .iter()
            .any(|o| segment_intersects_sphere(from, to, o.center, o.radius))
    }
}

/// Moves entities in straight lines towards their destinations.
#[derive(Debug, Clone)]
pub struct StraightLineNavigator {
    destinations: AHashMap<EntityId, Vec3>,
    speed: f32,
    arrive_distance: f32,
}

impl Default for StraightLineNavigator {
    fn default() -> Self {
        Self::new(3.5)
    }
}

impl StraightLineNavigator {
    /// Creates a navigator moving at `speed` units per second.
    #[must_use]
    pub fn new(speed: f32) -> Self {
        Self {
            destinations: AHashMap::new(),
            speed: speed.max(0.0),
            arrive_distance: 0.1,
        }
    }

    /// Pending destination for `entity`.
    #[must_use]
    pub fn destination(&self, entity: EntityId) -> Option<Vec3> {
        self.destinations.get(&entity).copied()
    }

    /// Number of entities currently moving.
    #[must_use]
    pub fn active_requests(&self) -> usize {
        self.destinations.len()
    }

    /// Advances every moving entity by `dt` seconds.
    ///
    /// Requests for entities that no longer exist or are inactive are dropped.
    pub fn advance(&mut self, entities: &mut EntityArena, dt: f32) {
        let speed = self.speed;
        let step = speed * dt.max(0.0);
        let arrive_distance = self.arrive_distance;
        self.destinations.retain(|id, destination| {
            let Ok(entity) = entities.get_mut(*id) else {
                return false;
            };
            if !entity.is_active() {
                entity.velocity = Vec3::ZERO;
                return false;
            }
            let remaining = horizontal_distance(entity.position, *destination);
            if remaining <= step.max(arrive_distance) {
                entity.position.x = destination.x;
                entity.position.z = destination.z;
                entity.velocity = Vec3::ZERO;
                return false;
            }
            match horizontal_direction(entity.position, *destination) {
                Some(dir) => {
                    entity.position += dir * step;
                    entity.velocity = if dt > 0.0 { dir * speed } else { Vec3::ZERO };
                    true
                },
                None => false,
            }
        });
    }
}

impl Navigation for StraightLineNavigator {
    fn set_destination(&mut self, entity: EntityId, destination: Vec3) {
        self.destinations.insert(entity, destination);
    }

    fn stop(&mut self, entity: EntityId) {
        self.destinations.remove(&entity);
    }

    fn has_arrived(&self, entity: EntityId) -> bool {
        !self.destinations.contains_key(&entity)
    }
}

/// Mock spatial query for testing.
#[derive(Debug, Default)]
pub struct MockSpatialQuery {
    entries: Vec<(EntityId, EntityClass, Vec3)>,
    blocked: AHashSet<EntityId>,
    los_blocked_everywhere: bool,
}

impl MockSpatialQuery {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity the query can return.
    pub fn add(&mut self, id: EntityId, class: EntityClass, position: Vec3) {
        self.entries.retain(|(existing, _, _)| *existing != id);
        self.entries.push((id, class, position));
    }

    /// Blocks line of sight to one entity's position.
    pub fn block(&mut self, id: EntityId) {
        self.blocked.insert(id);
    }

    /// Blocks every line of sight check.
    pub fn set_blind(&mut self, blind: bool) {
        self.los_blocked_everywhere = blind;
    }
}

impl SpatialQuery for MockSpatialQuery {
    fn query(&self, center: Vec3, radius: f32, filter: ClassFilter) -> Vec<EntityId> {
        self.entries
            .iter()
            .filter(|(_, class, pos)| {
                filter.contains(*class) && horizontal_distance(center, *pos) <= radius
            })
            .map(|(id, _, _)| *id)
            .collect()
    }

    fn has_line_of_sight(&self, _from: Vec3, to: Vec3) -> bool {
        if self.los_blocked_everywhere {
            return false;
        }
        !self
            .entries
            .iter()
            .any(|(id, _, pos)| self.blocked.contains(id) && pos.distance(to) < 1e-3)
    }
}

/// Mock navigation for testing. Records requests, never moves anything.
#[derive(Debug, Default)]
pub struct MockNavigation {
    destinations: AHashMap<EntityId, Vec3>,
    /// Every destination ever issued, in order
    pub issued: Vec<(EntityId, Vec3)>,
    /// Every stop request, in order
    pub stops: Vec<EntityId>,
}

impl MockNavigation {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current destination for `entity`.
    #[must_use]
    pub fn destination(&self, entity: EntityId) -> Option<Vec3> {
        self.destinations.get(&entity).copied()
    }

    /// Marks `entity` as having reached its destination.
    pub fn arrive(&mut self, entity: EntityId) {
        self.destinations.remove(&entity);
    }
}

impl Navigation for MockNavigation {
    fn set_destination(&mut self, entity: EntityId, destination: Vec3) {
        self.destinations.insert(entity, destination);
        self.issued.push((entity, destination));
    }

    fn stop(&mut self, entity: EntityId) {
        self.destinations.remove(&entity);
        self.stops.push(entity);
    }

    fn has_arrived(&self, entity: EntityId) -> bool {
        !self.destinations.contains_key(&entity)
    }
}

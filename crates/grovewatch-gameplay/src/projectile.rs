//! Projectiles fired by turrets and player weapons.
//!
//! A projectile moves in a straight line at constant speed. Each step it
//! sweeps the segment it travelled and reports the first valid victim, an
//! occluder hit or lifetime expiry. Damage is not applied here; the caller
//! routes hits through the simulation's damage entry point.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use grovewatch_common::{distance_to_segment, EntityId, OwnerId};

use crate::entity::{ClassFilter, EntityArena, EntityClass};
use crate::services::SpatialQuery;

/// Default projectile speed in units per second.
const DEFAULT_SPEED: f32 = 20.0;
/// Default lifetime in seconds.
const DEFAULT_LIFETIME: f32 = 3.0;
/// Default contact radius.
const DEFAULT_HIT_RADIUS: f32 = 0.5;

/// Kind of projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileKind {
    /// Seed fired by a turret
    Seed,
    /// Bullet fired by a player weapon
    Bullet,
}

impl ProjectileKind {
    /// Classes this kind passes through.
    #[must_use]
    pub const fn ignores(self, class: EntityClass) -> bool {
        match self {
            Self::Seed => matches!(class, EntityClass::Turret | EntityClass::Projectile),
            Self::Bullet => matches!(class, EntityClass::Projectile),
        }
    }
}

/// Projectile tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Travel speed
    pub speed: f32,
    /// Seconds before the projectile expires
    pub lifetime: f32,
    /// Contact radius around the flight path
    pub hit_radius: f32,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            lifetime: DEFAULT_LIFETIME,
            hit_radius: DEFAULT_HIT_RADIUS,
        }
    }
}

/// Request to spawn a projectile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileSpawn {
    /// Projectile kind
    pub kind: ProjectileKind,
    /// Entity that fired it
    pub source: EntityId,
    /// Owner of the source; never damaged by this projectile
    pub owner: OwnerId,
    /// Launch position
    pub origin: Vec3,
    /// Normalized flight direction
    pub direction: Vec3,
    /// Damage dealt on contact
    pub damage: f32,
}

/// Result of one projectile step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileOutcome {
    /// Still flying
    InFlight,
    /// Struck a damageable entity
    Hit {
        /// Entity struck
        victim: EntityId,
    },
    /// Lifetime ran out
    Expired,
    /// Struck an occluder
    Blocked,
}

impl ProjectileOutcome {
    /// True if the projectile should be removed.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

/// A projectile in flight. Its position lives on the arena entity `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    id: EntityId,
    kind: ProjectileKind,
    source: EntityId,
    owner: OwnerId,
    damage: f32,
    direction: Vec3,
    speed: f32,
    hit_radius: f32,
    expires_at: f64,
}

impl Projectile {
    /// Starts a projectile for the arena entity `id`.
    #[must_use]
    pub fn launch(id: EntityId, spawn: &ProjectileSpawn, config: &ProjectileConfig, now: f64) -> Self {
        Self {
            id,
            kind: spawn.kind,
            source: spawn.source,
            owner: spawn.owner,
            damage: spawn.damage,
            direction: spawn.direction.normalize_or_zero(),
            speed: config.speed,
            hit_radius: config.hit_radius,
            expires_at: now + f64::from(config.lifetime),
        }
    }

    /// Arena entity carrying the position.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Projectile kind.
    #[must_use]
    pub const fn kind(&self) -> ProjectileKind {
        self.kind
    }

    /// Entity credited with hits.
    #[must_use]
    pub const fn source(&self) -> EntityId {
        self.source
    }

    /// Owner of the source.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Damage dealt on contact.
    #[must_use]
    pub const fn damage(&self) -> f32 {
        self.damage
    }

    /// Time of expiry.
    #[must_use]
    pub const fn expires_at(&self) -> f64 {
        self.expires_at
    }

    /// Advances the projectile by `dt` and reports what happened.
    pub fn step<Q: SpatialQuery + ?Sized>(
        &self,
        now: f64,
        dt: f32,
        entities: &mut EntityArena,
        spatial: &Q,
    ) -> ProjectileOutcome {
        if now >= self.expires_at {
            return ProjectileOutcome::Expired;
        }
        let Ok(carrier) = entities.get(self.id) else {
            return ProjectileOutcome::Expired;
        };
        let from = carrier.position;
        let to = from + self.direction * self.speed * dt;

        if let Some((victim, at)) = self.first_contact(from, to, entities, spatial) {
            if spatial.has_line_of_sight(from, at) {
                return ProjectileOutcome::Hit { victim };
            }
            return ProjectileOutcome::Blocked;
        }
        if !spatial.has_line_of_sight(from, to) {
            return ProjectileOutcome::Blocked;
        }

        if let Ok(carrier) = entities.get_mut(self.id) {
            carrier.position = to;
            carrier.velocity = self.direction * self.speed;
        }
        ProjectileOutcome::InFlight
    }

    fn first_contact<Q: SpatialQuery + ?Sized>(
        &self,
        from: Vec3,
        to: Vec3,
        entities: &EntityArena,
        spatial: &Q,
    ) -> Option<(EntityId, Vec3)> {
        let center = (from + to) * 0.5;
        let reach = from.distance(to) * 0.5 + self.hit_radius;

        spatial
            .query(center, reach, ClassFilter::DAMAGEABLE)
            .into_iter()
            .filter(|id| *id != self.id && *id != self.source)
            .filter_map(|id| entities.get(id).ok())
            .filter(|e| {
                e.is_alive()
                    && e.owner() != self.owner
                    && !self.kind.ignores(e.class())
                    && distance_to_segment(e.position, from, to) <= self.hit_radius
            })
            .map(|e| (e.id(), e.position))
            .min_by(|(a_id, a), (b_id, b)| {
                from.distance_squared(*a)
                    .total_cmp(&from.distance_squared(*b))
                    .then(a_id.cmp(b_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::services::{MockSpatialQuery, Occluder, SpatialSnapshot};

    struct Range {
        arena: EntityArena,
        spatial: MockSpatialQuery,
    }

    impl Range {
        fn new() -> Self {
            Self {
                arena: EntityArena::new(),
                spatial: MockSpatialQuery::new(),
            }
        }

        fn add(&mut self, entity: Entity) -> EntityId {
            let class = entity.class();
            let position = entity.position;
            let id = self.arena.insert(entity);
            self.spatial.add(id, class, position);
            id
        }

        fn fire(&mut self, kind: ProjectileKind, owner: u32, source: EntityId) -> Projectile {
            let id = self.arena.insert(Entity::new(EntityClass::Projectile));
            let spawn = ProjectileSpawn {
                kind,
                source,
                owner: OwnerId::new(owner),
                origin: Vec3::ZERO,
                direction: Vec3::X,
                damage: 10.0,
            };
            Projectile::launch(id, &spawn, &ProjectileConfig::default(), 0.0)
        }
    }

    fn player(owner: u32, x: f32) -> Entity {
        Entity::new(EntityClass::Player)
            .with_owner(OwnerId::new(owner))
            .with_health(100.0)
            .with_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_flies_forward() {
        let mut range = Range::new();
        let projectile = range.fire(ProjectileKind::Seed, 1, EntityId::NULL);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &range.spatial);

        assert_eq!(outcome, ProjectileOutcome::InFlight);
        let pos = range.arena.get(projectile.id()).expect("carrier").position;
        assert!((pos.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_hits_enemy_on_path() {
        let mut range = Range::new();
        let victim = range.add(player(2, 1.5));
        let projectile = range.fire(ProjectileKind::Seed, 1, EntityId::NULL);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &range.spatial);

        assert_eq!(outcome, ProjectileOutcome::Hit { victim });
    }

    #[test]
    fn test_nearest_victim_wins() {
        let mut range = Range::new();
        let far = range.add(player(2, 1.8));
        let near = range.add(player(3, 0.6));
        let projectile = range.fire(ProjectileKind::Bullet, 1, EntityId::NULL);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &range.spatial);

        assert_eq!(outcome, ProjectileOutcome::Hit { victim: near });
        assert_ne!(outcome, ProjectileOutcome::Hit { victim: far });
    }

    #[test]
    fn test_ignores_same_owner_and_turrets() {
        let mut range = Range::new();
        range.add(player(1, 1.0));
        range.add(
            Entity::new(EntityClass::Turret)
                .with_owner(OwnerId::new(5))
                .with_health(50.0)
                .with_position(Vec3::new(1.5, 0.0, 0.0)),
        );
        let projectile = range.fire(ProjectileKind::Seed, 1, EntityId::NULL);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &range.spatial);

        assert_eq!(outcome, ProjectileOutcome::InFlight);
    }

    #[test]
    fn test_bullet_hits_turret() {
        let mut range = Range::new();
        let turret = range.add(
            Entity::new(EntityClass::Turret)
                .with_owner(OwnerId::new(5))
                .with_health(50.0)
                .with_position(Vec3::new(1.5, 0.0, 0.0)),
        );
        let projectile = range.fire(ProjectileKind::Bullet, 1, EntityId::NULL);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &range.spatial);

        assert_eq!(outcome, ProjectileOutcome::Hit { victim: turret });
    }

    #[test]
    fn test_ignores_source_and_dead() {
        let mut range = Range::new();
        let source = range.add(player(9, 0.2));
        let dead = range.add(player(2, 1.0));
        let bus = crate::events::EventBus::default();
        range
            .arena
            .health_mut(dead)
            .expect("health")
            .apply_damage(dead, 200.0, None, &bus);
        let projectile = range.fire(ProjectileKind::Seed, 1, source);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &range.spatial);

        assert_eq!(outcome, ProjectileOutcome::InFlight);
    }

    #[test]
    fn test_expires() {
        let mut range = Range::new();
        let projectile = range.fire(ProjectileKind::Seed, 1, EntityId::NULL);
        assert_eq!(
            projectile.step(3.0, 0.1, &mut range.arena, &range.spatial),
            ProjectileOutcome::Expired
        );
        assert!(ProjectileOutcome::Expired.is_finished());
    }

    #[test]
    fn test_blocked_by_occluder() {
        let mut range = Range::new();
        let id = range.arena.insert(Entity::new(EntityClass::Projectile));
        let spawn = ProjectileSpawn {
            kind: ProjectileKind::Seed,
            source: EntityId::NULL,
            owner: OwnerId::new(1),
            origin: Vec3::ZERO,
            direction: Vec3::X,
            damage: 10.0,
        };
        let projectile = Projectile::launch(id, &spawn, &ProjectileConfig::default(), 0.0);
        let snapshot =
            SpatialSnapshot::capture(&range.arena, &[Occluder::new(Vec3::new(1.0, 0.0, 0.0), 0.3)]);

        let outcome = projectile.step(0.0, 0.1, &mut range.arena, &snapshot);

        assert_eq!(outcome, ProjectileOutcome::Blocked);
    }
}

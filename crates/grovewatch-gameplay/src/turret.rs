//! Stationary turrets.
//!
//! A turret keeps a weak reference to the nearest hostile, swings its head
//! towards it and fires a seed projectile whenever its cooldown elapses.
//! Only a placed plant is armed; see [`crate::plant`].

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use grovewatch_common::{horizontal_distance, rotate_towards, yaw_towards, EntityId, OwnerId};

use crate::entity::{ClassFilter, Entity, EntityArena, EntityClass};
use crate::plant::Plant;
use crate::projectile::{ProjectileKind, ProjectileSpawn};
use crate::services::SpatialQuery;
use crate::target::TargetRef;

/// Turret tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretConfig {
    /// Acquisition range
    pub range: f32,
    /// Extra distance a held target may drift before it is dropped
    pub target_slack: f32,
    /// Shots per second
    pub fire_rate: f32,
    /// Damage per shot
    pub damage: f32,
    /// Head turn factor, multiplied by `dt`
    pub head_turn_speed: f32,
    /// Turret hit points
    pub max_health: f32,
}

impl Default for TurretConfig {
    fn default() -> Self {
        Self {
            range: 10.0,
            target_slack: 1.0,
            fire_rate: 1.0,
            damage: 10.0,
            head_turn_speed: 10.0,
            max_health: 200.0,
        }
    }
}

impl TurretConfig {
    fn fire_interval(&self) -> f64 {
        if self.fire_rate > 0.0 {
            1.0 / f64::from(self.fire_rate)
        } else {
            f64::INFINITY
        }
    }
}

/// Turret state.
#[derive(Debug, Clone)]
pub struct Turret {
    id: EntityId,
    target: TargetRef,
    head_yaw: f32,
    next_fire_at: f64,
    plant: Plant,
    config: TurretConfig,
}

impl Turret {
    /// Creates an armed turret (already placed) for the arena entity `id`.
    #[must_use]
    pub fn new(id: EntityId, config: TurretConfig) -> Self {
        Self::with_plant(id, Plant::placed(), config)
    }

    /// Creates a wild plant turret that has to be placed before it fires.
    #[must_use]
    pub fn wild(id: EntityId, config: TurretConfig) -> Self {
        Self::with_plant(id, Plant::wild(), config)
    }

    /// Creates a turret in the given plant state.
    #[must_use]
    pub fn with_plant(id: EntityId, plant: Plant, config: TurretConfig) -> Self {
        Self {
            id,
            target: TargetRef::NONE,
            head_yaw: 0.0,
            next_fire_at: 0.0,
            plant,
            config,
        }
    }

    /// Arena entity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Current target, if any.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        self.target.id()
    }

    /// Head yaw in radians.
    #[must_use]
    pub const fn head_yaw(&self) -> f32 {
        self.head_yaw
    }

    /// Tuning.
    #[must_use]
    pub const fn config(&self) -> &TurretConfig {
        &self.config
    }

    /// Plant lifecycle.
    #[must_use]
    pub const fn plant(&self) -> &Plant {
        &self.plant
    }

    /// Mutable plant lifecycle.
    pub fn plant_mut(&mut self) -> &mut Plant {
        &mut self.plant
    }

    /// Tracks, aims and possibly fires. An unplaced plant does nothing.
    pub fn tick<Q: SpatialQuery + ?Sized>(
        &mut self,
        now: f64,
        dt: f32,
        entities: &EntityArena,
        spatial: &Q,
    ) -> Option<ProjectileSpawn> {
        let Ok(body) = entities.get(self.id) else {
            self.target.clear();
            return None;
        };
        if !body.is_alive() || !self.plant.is_armed() {
            self.target.clear();
            return None;
        }
        let origin = body.position;
        let owner = body.owner();
        let reach = self.config.range + self.config.target_slack;

        let held = self
            .target
            .resolve_alive(entities)
            .filter(|t| self.is_hostile(t, owner) && horizontal_distance(origin, t.position) <= reach);
        let target = match held {
            Some(target) => target,
            None => {
                self.target = self
                    .nearest_hostile(origin, owner, entities, spatial)
                    .map_or(TargetRef::NONE, TargetRef::to);
                self.target.resolve_alive(entities)?
            },
        };
        let aim = target.position;

        if let Some(desired) = yaw_towards(origin, aim) {
            self.head_yaw =
                rotate_towards(self.head_yaw, desired, self.config.head_turn_speed * dt);
        }

        if now < self.next_fire_at {
            return None;
        }
        self.next_fire_at = now + self.config.fire_interval();
        let direction = (aim - origin).normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }
        trace!(turret = %self.id, target = %target.id(), "turret fired");
        Some(ProjectileSpawn {
            kind: ProjectileKind::Seed,
            source: self.id,
            owner,
            origin,
            direction,
            damage: self.config.damage,
        })
    }

    fn is_hostile(&self, candidate: &Entity, owner: OwnerId) -> bool {
        let wild_plant =
            candidate.class() == EntityClass::Turret && candidate.owner() == OwnerId::SERVER;
        candidate.id() != self.id
            && candidate.owner() != owner
            && candidate.health().is_some()
            && !wild_plant
    }

    fn nearest_hostile<Q: SpatialQuery + ?Sized>(
        &self,
        origin: Vec3,
        owner: OwnerId,
        entities: &EntityArena,
        spatial: &Q,
    ) -> Option<EntityId> {
        let reach = self.config.range + self.config.target_slack;
        spatial
            .query(origin, reach, ClassFilter::DAMAGEABLE)
            .into_iter()
            .filter_map(|id| entities.get(id).ok())
            .filter(|e| e.is_alive() && self.is_hostile(e, owner))
            .map(|e| (e.id(), horizontal_distance(origin, e.position)))
            .filter(|(_, distance)| *distance <= reach)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::plant::PlantState;
    use crate::services::MockSpatialQuery;

    struct Yard {
        arena: EntityArena,
        spatial: MockSpatialQuery,
        turret: Turret,
    }

    impl Yard {
        fn new() -> Self {
            let mut arena = EntityArena::new();
            let mut spatial = MockSpatialQuery::new();
            let id = arena.insert(
                Entity::new(EntityClass::Turret)
                    .with_owner(OwnerId::new(1))
                    .with_health(200.0),
            );
            spatial.add(id, EntityClass::Turret, Vec3::ZERO);
            Self {
                arena,
                spatial,
                turret: Turret::new(id, TurretConfig::default()),
            }
        }

        fn add_player(&mut self, owner: u32, position: Vec3) -> EntityId {
            let id = self.arena.insert(
                Entity::new(EntityClass::Player)
                    .with_owner(OwnerId::new(owner))
                    .with_health(100.0)
                    .with_position(position),
            );
            self.spatial.add(id, EntityClass::Player, position);
            id
        }

        fn tick(&mut self, now: f64) -> Option<ProjectileSpawn> {
            self.turret.tick(now, 0.1, &self.arena, &self.spatial)
        }
    }

    #[test]
    fn test_targets_nearest_hostile() {
        let mut yard = Yard::new();
        yard.add_player(2, Vec3::new(0.0, 0.0, 8.0));
        let near = yard.add_player(3, Vec3::new(4.0, 0.0, 0.0));
        yard.add_player(1, Vec3::new(1.0, 0.0, 0.0));

        let shot = yard.tick(0.0).expect("fires immediately");

        assert_eq!(yard.turret.target(), Some(near));
        assert_eq!(shot.kind, ProjectileKind::Seed);
        assert_eq!(shot.owner, OwnerId::new(1));
        assert_eq!(shot.source, yard.turret.id());
        assert!((shot.direction - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_respects_fire_rate() {
        let mut yard = Yard::new();
        yard.add_player(2, Vec3::new(5.0, 0.0, 0.0));
        assert!(yard.tick(0.0).is_some());
        assert!(yard.tick(0.5).is_none());
        assert!(yard.tick(1.0).is_some());
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut yard = Yard::new();
        yard.add_player(2, Vec3::new(11.5, 0.0, 0.0));
        assert!(yard.tick(0.0).is_none());
        assert_eq!(yard.turret.target(), None);
    }

    #[test]
    fn test_drops_dead_target() {
        let mut yard = Yard::new();
        let bus = EventBus::default();
        let first = yard.add_player(2, Vec3::new(3.0, 0.0, 0.0));
        let second = yard.add_player(3, Vec3::new(6.0, 0.0, 0.0));
        yard.tick(0.0);
        assert_eq!(yard.turret.target(), Some(first));

        yard.arena
            .health_mut(first)
            .expect("health")
            .apply_damage(first, 500.0, None, &bus);
        yard.tick(0.1);

        assert_eq!(yard.turret.target(), Some(second));
    }

    #[test]
    fn test_head_turns_gradually() {
        let mut yard = Yard::new();
        yard.add_player(2, Vec3::new(-5.0, 0.0, 0.0));
        yard.tick(0.0);
        let yaw = yard.turret.head_yaw();
        assert!(yaw.abs() <= 1.0 + 1e-5);
        assert!(yaw < 0.0);
    }

    #[test]
    fn test_dead_turret_is_idle() {
        let mut yard = Yard::new();
        let bus = EventBus::default();
        yard.add_player(2, Vec3::new(3.0, 0.0, 0.0));
        let id = yard.turret.id();
        yard.arena
            .health_mut(id)
            .expect("health")
            .apply_damage(id, 500.0, None, &bus);
        assert!(yard.tick(0.0).is_none());
    }

    #[test]
    fn test_wild_plant_holds_fire_until_placed() {
        let mut yard = Yard::new();
        let id = yard.turret.id();
        yard.turret = Turret::wild(id, TurretConfig::default());
        yard.add_player(2, Vec3::new(3.0, 0.0, 0.0));
        assert!(yard.tick(0.0).is_none());
        assert_eq!(yard.turret.target(), None);

        let carrier = EntityId::new(40, 0);
        let plant = yard.turret.plant_mut();
        plant
            .pickup(id, carrier, OwnerId::SERVER, OwnerId::new(1))
            .expect("pickup");
        assert!(yard.tick(0.1).is_none());
        yard.turret.plant_mut().place(id, carrier).expect("place");
        assert_eq!(yard.turret.plant().state(), PlantState::Placed);

        assert!(yard.tick(0.2).is_some());
    }

    #[test]
    fn test_wild_plants_are_not_targets() {
        let mut yard = Yard::new();
        let wild = yard.arena.insert(
            Entity::new(EntityClass::Turret)
                .with_position(Vec3::new(2.0, 0.0, 0.0))
                .with_health(200.0),
        );
        yard.spatial.add(wild, EntityClass::Turret, Vec3::new(2.0, 0.0, 0.0));
        assert!(yard.tick(0.0).is_none());
        assert_eq!(yard.turret.target(), None);
    }
}

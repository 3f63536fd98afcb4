//! The authoritative simulation.
//!
//! [`Simulation`] owns every piece of combat state and sequences one tick:
//!
//! 1. advance the clock
//! 2. revive entities whose respawn delay elapsed
//! 3. carried plants follow their carriers
//! 4. camp lifecycle (populate, clear)
//! 5. placed turrets aim and fire
//! 6. projectiles move and hit
//! 7. agents tick in ascending id order; each agent's strikes and alerts are
//!    applied right after its own tick
//! 8. pending navigation stops are flushed, including those of agents that
//!    died or were despawned during the tick
//!
//! All damage, from any producer, goes through [`Simulation::apply_damage`].
//! Deaths are dispatched as soon as the damage call that caused them returns.

use std::collections::BTreeMap;

use ahash::AHashMap;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use grovewatch_common::{horizontal_distance, CampId, EntityId, GroupId, OwnerId};

use crate::agent::{Agent, AgentConfig, AgentIntent, AggroContext, AggroOutcome, TickContext};
use crate::aggro_group::{AggroGroups, AggroReceiver};
use crate::authority::Authority;
use crate::camp::{Camp, CampConfig, CampEvent};
use crate::entity::{Entity, EntityArena, EntityClass, EntityError};
use crate::events::{EventBus, Notification};
use crate::health::{DamageOutcome, Health};
use crate::life_fruit::LifeFruits;
use crate::plant::{Plant, PlantConfig, PlantError, PlantResult};
use crate::projectile::{
    Projectile, ProjectileConfig, ProjectileKind, ProjectileOutcome, ProjectileSpawn,
};
use crate::respawn::{RespawnConfig, RespawnCoordinator, RespawnDecision, SessionContext};
use crate::services::{Navigation, SpatialQuery};
use crate::turret::{Turret, TurretConfig};

/// Errors returned by simulation setup calls.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Arena lookup failed
    #[error(transparent)]
    Entity(#[from] EntityError),
    /// Camp does not exist
    #[error("Unknown camp: {0:?}")]
    UnknownCamp(CampId),
    /// Group does not exist
    #[error("Unknown group: {0:?}")]
    UnknownGroup(GroupId),
    /// Entity is not driven by an agent
    #[error("Not an agent: {0}")]
    NotAnAgent(EntityId),
    /// Shooter is dead or inactive
    #[error("Shooter {0} cannot fire")]
    ShooterDown(EntityId),
    /// Shooter's weapon has not recovered yet
    #[error("Weapon of {shooter} ready at {ready_at:.2}")]
    WeaponCooldown {
        /// Shooter
        shooter: EntityId,
        /// Simulation time the weapon can fire again
        ready_at: f64,
    },
}

/// Result type for simulation setup calls.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Tuning for the whole simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Neutral agent tuning
    pub agent: AgentConfig,
    /// Turret tuning
    pub turret: TurretConfig,
    /// Projectile tuning
    pub projectile: ProjectileConfig,
    /// Respawn tuning
    pub respawn: RespawnConfig,
    /// Camp tuning
    pub camp: CampConfig,
    /// Plant handling tuning
    pub plant: PlantConfig,
    /// Seconds between two player shots
    pub weapon_cooldown: f32,
    /// Player hit points
    pub player_max_health: f32,
    /// Life fruit hit points
    pub life_fruit_max_health: f32,
    /// Pending notifications kept before chatter is dropped
    pub event_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            turret: TurretConfig::default(),
            projectile: ProjectileConfig::default(),
            respawn: RespawnConfig::default(),
            camp: CampConfig::default(),
            plant: PlantConfig::default(),
            weapon_cooldown: 0.25,
            player_max_health: 100.0,
            life_fruit_max_health: 50.0,
            event_capacity: 4096,
        }
    }
}

/// Delivers group alerts to agents owned by the simulation.
struct GroupDelivery<'a> {
    now: f64,
    agents: &'a mut BTreeMap<EntityId, Agent>,
    entities: &'a mut EntityArena,
    events: &'a EventBus,
}

impl AggroReceiver for GroupDelivery<'_> {
    fn is_active(&self, member: EntityId) -> bool {
        self.agents.contains_key(&member) && self.entities.get(member).is_ok_and(Entity::is_alive)
    }

    fn on_group_aggro_triggered(&mut self, member: EntityId, source: EntityId, target: EntityId) {
        if let Some(agent) = self.agents.get_mut(&member) {
            let mut ctx = AggroContext {
                now: self.now,
                entities: &mut *self.entities,
                events: self.events,
            };
            agent.on_group_aggro_triggered(source, target, &mut ctx);
        }
    }
}

/// Authoritative combat simulation.
pub struct Simulation {
    authority: Authority,
    config: SimulationConfig,
    clock: f64,
    tick_count: u64,
    entities: EntityArena,
    agents: BTreeMap<EntityId, Agent>,
    turrets: BTreeMap<EntityId, Turret>,
    projectiles: BTreeMap<EntityId, Projectile>,
    groups: AggroGroups,
    camps: Vec<Camp>,
    camp_of: AHashMap<EntityId, CampId>,
    respawn: RespawnCoordinator,
    session: SessionContext,
    life_fruits: LifeFruits,
    events: EventBus,
    pending_deaths: Vec<(EntityId, Option<EntityId>)>,
    pending_nav_stops: Vec<EntityId>,
    carrying: AHashMap<EntityId, EntityId>,
    next_fire_at: AHashMap<EntityId, f64>,
}

impl Simulation {
    /// Creates an authoritative simulation.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_authority(config, Authority::Server)
    }

    /// Creates a simulation on the given side. A replica never changes state.
    #[must_use]
    pub fn with_authority(config: SimulationConfig, authority: Authority) -> Self {
        let mut config = config;
        config.agent.validate();
        Self {
            authority,
            config,
            clock: 0.0,
            tick_count: 0,
            entities: EntityArena::new(),
            agents: BTreeMap::new(),
            turrets: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            groups: AggroGroups::new(),
            camps: Vec::new(),
            camp_of: AHashMap::new(),
            respawn: RespawnCoordinator::new(config.respawn),
            session: SessionContext::new(authority),
            life_fruits: LifeFruits::new(),
            events: EventBus::new(config.event_capacity),
            pending_deaths: Vec::new(),
            pending_nav_stops: Vec::new(),
            carrying: AHashMap::new(),
            next_fire_at: AHashMap::new(),
        }
    }

    // === Accessors ===

    /// Side this simulation runs on.
    #[must_use]
    pub const fn authority(&self) -> Authority {
        self.authority
    }

    /// Tuning in effect.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulation time in seconds.
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.clock
    }

    /// Number of ticks run.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Entity arena.
    #[must_use]
    pub const fn entities(&self) -> &EntityArena {
        &self.entities
    }

    /// Mutable entity arena, for movement services that run between ticks.
    pub fn entities_mut(&mut self) -> &mut EntityArena {
        &mut self.entities
    }

    /// Looks up an entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id).ok()
    }

    /// Health of an entity.
    #[must_use]
    pub fn health(&self, id: EntityId) -> Option<&Health> {
        self.entity(id).and_then(Entity::health)
    }

    /// Agent driving `id`.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Turret state for `id`.
    #[must_use]
    pub fn turret(&self, id: EntityId) -> Option<&Turret> {
        self.turrets.get(&id)
    }

    /// Plant held by `carrier`.
    #[must_use]
    pub fn carried_plant(&self, carrier: EntityId) -> Option<EntityId> {
        self.carrying.get(&carrier).copied()
    }

    /// Projectiles in flight.
    #[must_use]
    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// Camp by id.
    #[must_use]
    pub fn camp(&self, id: CampId) -> Option<&Camp> {
        self.camps.get(id.raw() as usize)
    }

    /// All camps.
    #[must_use]
    pub fn camps(&self) -> &[Camp] {
        &self.camps
    }

    /// Aggro groups.
    #[must_use]
    pub const fn groups(&self) -> &AggroGroups {
        &self.groups
    }

    /// Respawn coordinator.
    #[must_use]
    pub const fn respawn(&self) -> &RespawnCoordinator {
        &self.respawn
    }

    /// Session context (eligibility).
    #[must_use]
    pub const fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Notification bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Takes every notification published since the last drain.
    pub fn drain_events(&self) -> Vec<Notification> {
        self.events.drain()
    }

    // === Setup ===

    fn insert(&mut self, entity: Entity) -> EntityId {
        let id = self.entities.insert(entity);
        if let Ok(health) = self.entities.health_mut(id) {
            health.set_authority(self.authority);
        }
        id
    }

    /// Spawns a player for `owner`.
    pub fn spawn_player(&mut self, owner: OwnerId, position: Vec3) -> EntityId {
        let id = self.insert(
            Entity::new(EntityClass::Player)
                .with_owner(owner)
                .with_position(position)
                .with_health(self.config.player_max_health),
        );
        info!(player = %id, %owner, "player spawned");
        id
    }

    /// Creates an empty aggro group.
    pub fn create_group(&mut self) -> GroupId {
        self.groups.create()
    }

    /// Creates a camp with its own aggro group.
    pub fn create_camp(&mut self, name: impl Into<String>) -> CampId {
        let id = CampId::new(self.camps.len() as u32);
        let group = self.groups.create();
        self.camps
            .push(Camp::new(id, name, group, self.config.camp, self.clock));
        id
    }

    /// Spawns a free-roaming neutral agent at `home`, optionally in `group`.
    pub fn spawn_agent(&mut self, home: Vec3, group: Option<GroupId>) -> SimulationResult<EntityId> {
        if let Some(group) = group {
            if self.groups.get(group).is_none() {
                return Err(SimulationError::UnknownGroup(group));
            }
        }
        let id = self.insert(
            Entity::new(EntityClass::Neutral)
                .with_position(home)
                .with_health(self.config.agent.max_health),
        );
        let mut agent = Agent::new(id, home, self.config.agent).with_authority(self.authority);
        if let Some(group) = group {
            agent = agent.with_group(group);
            self.groups.register(group, id);
        }
        self.agents.insert(id, agent);
        debug!(agent = %id, ?group, "agent spawned");
        Ok(id)
    }

    /// Adds a neutral to `camp`. It stays inactive until the camp populates.
    pub fn spawn_neutral(&mut self, camp: CampId, home: Vec3) -> SimulationResult<EntityId> {
        let group = self
            .camp(camp)
            .map(Camp::group)
            .ok_or(SimulationError::UnknownCamp(camp))?;
        let id = self.insert(
            Entity::new(EntityClass::Neutral)
                .with_position(home)
                .with_health(self.config.agent.max_health)
                .inactive(),
        );
        let agent = Agent::new(id, home, self.config.agent)
            .with_group(group)
            .with_authority(self.authority);
        self.agents.insert(id, agent);
        self.groups.register(group, id);
        self.camp_of.insert(id, camp);
        if let Some(camp) = self.camps.get_mut(camp.raw() as usize) {
            camp.add_member(id, home);
        }
        Ok(id)
    }

    /// Moves an existing agent into `group`, leaving its previous one.
    pub fn join_group(&mut self, agent: EntityId, group: GroupId) -> SimulationResult<()> {
        if self.groups.get(group).is_none() {
            return Err(SimulationError::UnknownGroup(group));
        }
        let state = self
            .agents
            .get_mut(&agent)
            .ok_or(SimulationError::NotAnAgent(agent))?;
        if let Some(previous) = state.group() {
            self.groups.unregister(previous, agent);
        }
        state.set_group(Some(group));
        self.groups.register(group, agent);
        Ok(())
    }

    /// Spawns a turret already placed for `owner`.
    pub fn spawn_turret(&mut self, owner: OwnerId, position: Vec3) -> EntityId {
        let id = self.insert(
            Entity::new(EntityClass::Turret)
                .with_owner(owner)
                .with_position(position)
                .with_health(self.config.turret.max_health),
        );
        let plant = Plant::placed().with_authority(self.authority);
        self.turrets
            .insert(id, Turret::with_plant(id, plant, self.config.turret));
        info!(turret = %id, %owner, "turret placed");
        id
    }

    /// Drops a wild, unowned plant at `position`. It stays unarmed until a
    /// player places it in their base.
    pub fn spawn_plant(&mut self, position: Vec3) -> EntityId {
        let id = self.insert(
            Entity::new(EntityClass::Turret)
                .with_position(position)
                .with_health(self.config.turret.max_health),
        );
        let plant = Plant::wild().with_authority(self.authority);
        self.turrets
            .insert(id, Turret::with_plant(id, plant, self.config.turret));
        debug!(plant = %id, "wild plant spawned");
        id
    }

    /// Plants a life fruit for `owner`, granting respawn eligibility.
    pub fn spawn_life_fruit(&mut self, owner: OwnerId, position: Vec3) -> EntityId {
        let id = self.insert(
            Entity::new(EntityClass::LifeFruit)
                .with_owner(owner)
                .with_position(position)
                .with_health(self.config.life_fruit_max_health),
        );
        self.life_fruits.plant(id, owner, &self.session);
        id
    }

    /// Fires a player bullet from `shooter` along `direction`.
    pub fn fire_bullet(
        &mut self,
        shooter: EntityId,
        direction: Vec3,
        damage: f32,
    ) -> SimulationResult<EntityId> {
        let entity = self.entities.get(shooter)?;
        if !entity.is_alive() {
            return Err(SimulationError::ShooterDown(shooter));
        }
        if let Some(&ready_at) = self.next_fire_at.get(&shooter) {
            if self.clock < ready_at {
                return Err(SimulationError::WeaponCooldown { shooter, ready_at });
            }
        }
        let spawn = ProjectileSpawn {
            kind: ProjectileKind::Bullet,
            source: shooter,
            owner: entity.owner(),
            origin: entity.position,
            direction,
            damage,
        };
        self.next_fire_at
            .insert(shooter, self.clock + f64::from(self.config.weapon_cooldown));
        Ok(self.launch(&spawn))
    }

    fn launch(&mut self, spawn: &ProjectileSpawn) -> EntityId {
        let id = self.insert(
            Entity::new(EntityClass::Projectile)
                .with_owner(spawn.owner)
                .with_position(spawn.origin),
        );
        let projectile = Projectile::launch(id, spawn, &self.config.projectile, self.clock);
        self.projectiles.insert(id, projectile);
        id
    }

    /// Adds a shared spawn point.
    pub fn add_spawn_point(&mut self, point: Vec3) {
        self.respawn.add_spawn_point(point);
    }

    /// Gives `owner` a dedicated spawn point.
    pub fn assign_spawn_point(&mut self, owner: OwnerId, point: Vec3) {
        self.respawn.assign_spawn_point(owner, point);
    }

    /// Toggles respawn eligibility for `owner`.
    pub fn set_eligibility(&self, owner: OwnerId, allowed: bool) {
        self.session.set_eligibility(owner, allowed);
    }

    /// Removes an entity and everything attached to it.
    pub fn despawn(&mut self, id: EntityId) -> SimulationResult<()> {
        if let Some(mut agent) = self.agents.remove(&id) {
            if let Some(group) = agent.group() {
                self.groups.unregister(group, id);
            }
            let mut ctx = AggroContext {
                now: self.clock,
                entities: &mut self.entities,
                events: &self.events,
            };
            agent.on_death(&mut ctx);
            self.pending_nav_stops.push(id);
        }
        if self.carrying.contains_key(&id) {
            self.drop_carried(id);
        }
        self.carrying.retain(|_, plant| *plant != id);
        self.next_fire_at.remove(&id);
        if let Some(camp) = self.camp_of.remove(&id) {
            if let Some(camp) = self.camps.get_mut(camp.raw() as usize) {
                camp.remove_member(id);
            }
        }
        self.turrets.remove(&id);
        self.projectiles.remove(&id);
        self.respawn.cancel(id);
        self.life_fruits.on_death(id, &self.session);
        self.entities.despawn(id)?;
        debug!(entity = %id, "despawned");
        Ok(())
    }

    /// Ends the session: drops every entity and clears session state.
    pub fn teardown(&mut self) {
        self.entities.clear();
        self.agents.clear();
        self.turrets.clear();
        self.projectiles.clear();
        self.groups.clear();
        self.camps.clear();
        self.camp_of.clear();
        self.respawn.clear();
        self.life_fruits.clear();
        self.pending_deaths.clear();
        self.pending_nav_stops.clear();
        self.carrying.clear();
        self.next_fire_at.clear();
        self.session.teardown();
        info!(ticks = self.tick_count, "session torn down");
    }

    // === Mutators ===

    /// Damages `victim` on behalf of `attacker`. Single entry point for every
    /// damage producer.
    ///
    /// A surviving agent takes aggro on its attacker. Damage to a life fruit
    /// from its own owner is reverted instead of applied.
    pub fn apply_damage(
        &mut self,
        victim: EntityId,
        amount: f32,
        attacker: Option<EntityId>,
    ) -> DamageOutcome {
        if !self.authority.permits("apply_damage") {
            return DamageOutcome::default();
        }

        let attacker_owner = attacker
            .and_then(|a| self.entities.get(a).ok())
            .map(Entity::owner);
        if self.life_fruits.is_self_damage(victim, attacker_owner) {
            if let Ok(health) = self.entities.health_mut(victim) {
                let max = health.max();
                health.set_health(victim, max, &self.events);
            }
            debug!(fruit = %victim, "own life fruit hit, reverted");
            return DamageOutcome::default();
        }

        let outcome = match self.entities.health_mut(victim) {
            Ok(health) => health.apply_damage(victim, amount, attacker, &self.events),
            Err(err) => {
                debug!(%err, "damage skipped");
                return DamageOutcome::default();
            }
        };

        if outcome.died {
            self.pending_deaths.push((victim, attacker));
            self.dispatch_deaths();
        } else if let Some(attacker) = attacker {
            if outcome.landed() && self.agents.contains_key(&victim) {
                self.acquire_aggro(victim, attacker);
            }
        }
        outcome
    }

    /// Heals `entity`. Returns the amount healed.
    pub fn heal(&mut self, entity: EntityId, amount: f32) -> f32 {
        match self.entities.health_mut(entity) {
            Ok(health) => health.heal(entity, amount, &self.events),
            Err(_) => 0.0,
        }
    }

    /// Sets health directly. Returns true if this killed the entity.
    pub fn set_health(&mut self, entity: EntityId, value: f32) -> bool {
        let killed = match self.entities.health_mut(entity) {
            Ok(health) => health.set_health(entity, value, &self.events),
            Err(_) => false,
        };
        if killed {
            self.pending_deaths.push((entity, None));
            self.dispatch_deaths();
        }
        killed
    }

    /// Makes `agent` aggro on `target` and alerts its group on a new acquisition.
    pub fn acquire_aggro(&mut self, agent: EntityId, target: EntityId) -> AggroOutcome {
        let Some(state) = self.agents.get_mut(&agent) else {
            return AggroOutcome::Rejected;
        };
        let mut ctx = AggroContext {
            now: self.clock,
            entities: &mut self.entities,
            events: &self.events,
        };
        let outcome = state.acquire_aggro(target, &mut ctx);
        if outcome == AggroOutcome::Acquired {
            self.alert_group(agent, target);
        }
        outcome
    }

    fn alert_group(&mut self, source: EntityId, target: EntityId) -> usize {
        let Some(group) = self
            .agents
            .get(&source)
            .and_then(Agent::group)
            .and_then(|id| self.groups.get(id))
        else {
            return 0;
        };
        let mut delivery = GroupDelivery {
            now: self.clock,
            agents: &mut self.agents,
            entities: &mut self.entities,
            events: &self.events,
        };
        group.notify_group_aggro(source, target, &mut delivery)
    }

    // === Plants ===

    /// `carrier` picks up `plant`. A neutral plant can be taken by anyone in
    /// range; a placed one only by its owner. The plant is unowned while
    /// carried.
    pub fn pickup_plant(&mut self, carrier: EntityId, plant: EntityId) -> PlantResult<()> {
        if !self.authority.permits("pickup_plant") {
            return Err(PlantError::NotAuthoritative);
        }
        let holder = self
            .entities
            .get(carrier)
            .ok()
            .filter(|e| e.is_alive())
            .ok_or(PlantError::CarrierDown(carrier))?;
        if self.carrying.contains_key(&carrier) {
            return Err(PlantError::HandsFull(carrier));
        }
        let (carrier_owner, carrier_at) = (holder.owner(), holder.position);
        let body = self
            .entities
            .get(plant)
            .ok()
            .filter(|e| e.is_alive())
            .ok_or(PlantError::NotPickable(plant))?;
        let turret = self
            .turrets
            .get_mut(&plant)
            .ok_or(PlantError::NotAPlant(plant))?;
        let distance = horizontal_distance(carrier_at, body.position);
        let range = self.config.plant.pickup_range;
        if distance > range {
            return Err(PlantError::OutOfRange {
                plant,
                distance,
                range,
            });
        }
        turret
            .plant_mut()
            .pickup(plant, carrier, body.owner(), carrier_owner)?;

        self.carrying.insert(carrier, plant);
        if let Ok(entity) = self.entities.get_mut(plant) {
            entity.set_owner(OwnerId::SERVER);
            entity.set_active(false);
            entity.velocity = Vec3::ZERO;
            entity.position = carrier_at + Vec3::Y * self.config.plant.carry_height;
        }
        info!(%plant, %carrier, owner = %carrier_owner, "plant picked up");
        Ok(())
    }

    /// `carrier` lets go of its plant, which lands at its feet as neutral.
    pub fn drop_plant(&mut self, carrier: EntityId) -> PlantResult<EntityId> {
        if !self.authority.permits("drop_plant") {
            return Err(PlantError::NotAuthoritative);
        }
        let plant = self
            .carried_plant(carrier)
            .ok_or(PlantError::NotCarrying(carrier))?;
        let turret = self
            .turrets
            .get_mut(&plant)
            .ok_or(PlantError::NotAPlant(plant))?;
        turret.plant_mut().release(plant, carrier)?;
        self.carrying.remove(&carrier);

        let ground = self.entities.get(carrier).map(|e| e.position).ok();
        let lift = Vec3::Y * self.config.plant.carry_height;
        if let Ok(entity) = self.entities.get_mut(plant) {
            entity.position = ground.unwrap_or(entity.position - lift);
            entity.set_owner(OwnerId::SERVER);
            entity.set_active(true);
        }
        info!(%plant, %carrier, "plant dropped");
        Ok(plant)
    }

    /// `carrier` plants what it holds in front of it. Only allowed inside one
    /// of the carrier owner's bases; the plant then belongs to that owner and
    /// its turret arms.
    pub fn place_plant(&mut self, carrier: EntityId) -> PlantResult<EntityId> {
        if !self.authority.permits("place_plant") {
            return Err(PlantError::NotAuthoritative);
        }
        let plant = self
            .carried_plant(carrier)
            .ok_or(PlantError::NotCarrying(carrier))?;
        let holder = self
            .entities
            .get(carrier)
            .ok()
            .filter(|e| e.is_alive())
            .ok_or(PlantError::CarrierDown(carrier))?;
        let (owner, at, heading) = (holder.owner(), holder.position, holder.velocity);
        if !self.in_own_base(owner, at) {
            return Err(PlantError::NoBase(carrier));
        }
        let turret = self
            .turrets
            .get_mut(&plant)
            .ok_or(PlantError::NotAPlant(plant))?;
        turret.plant_mut().place(plant, carrier)?;
        self.carrying.remove(&carrier);

        let forward = Vec3::new(heading.x, 0.0, heading.z).normalize_or_zero();
        if let Ok(entity) = self.entities.get_mut(plant) {
            entity.position = at + forward * self.config.plant.place_offset;
            entity.set_owner(owner);
            entity.set_active(true);
        }
        info!(%plant, %carrier, %owner, "plant placed");
        Ok(plant)
    }

    /// True if a living life fruit of `owner` is within base radius of `at`.
    #[must_use]
    pub fn in_own_base(&self, owner: OwnerId, at: Vec3) -> bool {
        let radius = self.config.plant.base_radius;
        self.entities
            .iter_by_class(EntityClass::LifeFruit)
            .any(|fruit| {
                fruit.is_alive()
                    && fruit.owner() == owner
                    && horizontal_distance(fruit.position, at) <= radius
            })
    }

    fn drop_carried(&mut self, carrier: EntityId) {
        if let Err(err) = self.drop_plant(carrier) {
            warn!(%carrier, %err, "carried plant not dropped");
        }
    }

    fn carry_plants(&mut self) {
        let lift = Vec3::Y * self.config.plant.carry_height;
        for (carrier, plant) in &self.carrying {
            let Ok(at) = self.entities.get(*carrier).map(|e| e.position) else {
                continue;
            };
            if let Ok(entity) = self.entities.get_mut(*plant) {
                entity.position = at + lift;
            }
        }
    }

    // === Tick ===

    /// Advances the simulation by `dt` seconds.
    pub fn tick<Q, N>(&mut self, dt: f32, spatial: &Q, navigation: &mut N)
    where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        if !self.authority.is_authoritative() {
            return;
        }
        self.clock += f64::from(dt);
        self.tick_count += 1;

        self.tick_respawns();
        self.carry_plants();
        self.tick_camps();
        self.tick_turrets(dt, spatial);
        self.tick_projectiles(dt, spatial);
        self.tick_agents(dt, spatial, navigation);
        self.flush_navigation(navigation);
    }

    fn flush_navigation<N: Navigation + ?Sized>(&mut self, navigation: &mut N) {
        for id in self.pending_nav_stops.drain(..) {
            navigation.stop(id);
        }
        for agent in self.agents.values_mut() {
            agent.flush_navigation(navigation);
        }
    }

    fn tick_respawns(&mut self) {
        for due in self.respawn.take_due(self.clock) {
            if let Err(err) = self.respawn.revive(due.entity, &mut self.entities, &self.events) {
                warn!(%err, "respawn failed");
            }
        }
    }

    fn tick_camps(&mut self) {
        let mut populate = Vec::new();
        for camp in &mut self.camps {
            let entities = &self.entities;
            match camp.update(self.clock, |id| entities.get(id).is_ok_and(Entity::is_alive)) {
                Some(CampEvent::Populate) => populate.push(camp.id()),
                Some(CampEvent::Cleared) => {
                    self.events
                        .publish(Notification::CampCleared { camp: camp.id() });
                },
                None => {},
            }
        }
        for camp in populate {
            self.populate_camp(camp);
        }
    }

    fn populate_camp(&mut self, camp: CampId) {
        let Some(members) = self.camp(camp).map(|c| c.members().to_vec()) else {
            return;
        };
        for member in members {
            let Ok(entity) = self.entities.get_mut(member.agent) else {
                continue;
            };
            entity.position = member.home;
            entity.velocity = Vec3::ZERO;
            entity.set_active(true);
            if let Some(health) = entity.health_mut() {
                if health.is_dead() {
                    health.revive(member.agent, &self.events);
                } else {
                    let max = health.max();
                    health.set_health(member.agent, max, &self.events);
                }
            }
            if let Some(agent) = self.agents.get_mut(&member.agent) {
                let mut ctx = AggroContext {
                    now: self.clock,
                    entities: &mut self.entities,
                    events: &self.events,
                };
                agent.respawn(&mut ctx);
            }
        }
        self.events.publish(Notification::CampPopulated { camp });
    }

    fn tick_turrets<Q: SpatialQuery + ?Sized>(&mut self, dt: f32, spatial: &Q) {
        let mut shots = Vec::new();
        for turret in self.turrets.values_mut() {
            if let Some(shot) = turret.tick(self.clock, dt, &self.entities, spatial) {
                shots.push(shot);
            }
        }
        for shot in &shots {
            self.launch(shot);
        }
    }

    fn tick_projectiles<Q: SpatialQuery + ?Sized>(&mut self, dt: f32, spatial: &Q) {
        let ids: Vec<EntityId> = self.projectiles.keys().copied().collect();
        for id in ids {
            let Some(projectile) = self.projectiles.get(&id) else {
                continue;
            };
            let outcome = projectile.step(self.clock, dt, &mut self.entities, spatial);
            let (damage, source) = (projectile.damage(), projectile.source());
            if !outcome.is_finished() {
                continue;
            }
            self.projectiles.remove(&id);
            if let Err(err) = self.entities.despawn(id) {
                debug!(%err, "projectile carrier already gone");
            }
            if let ProjectileOutcome::Hit { victim } = outcome {
                self.apply_damage(victim, damage, Some(source));
            }
        }
    }

    fn tick_agents<Q, N>(&mut self, dt: f32, spatial: &Q, navigation: &mut N)
    where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        let ids: Vec<EntityId> = self.agents.keys().copied().collect();
        for id in ids {
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            let mut ctx = TickContext {
                now: self.clock,
                dt,
                entities: &mut self.entities,
                spatial,
                navigation: &mut *navigation,
                events: &self.events,
            };
            let intents = agent.tick(&mut ctx);
            for intent in intents {
                self.apply_intent(intent);
            }
        }
    }

    fn apply_intent(&mut self, intent: AgentIntent) {
        match intent {
            AgentIntent::Strike {
                attacker,
                target,
                damage,
            } => {
                self.apply_damage(target, damage, Some(attacker));
            },
            AgentIntent::Alert { source, target } => {
                self.alert_group(source, target);
            },
        }
    }

    // === Deaths ===

    fn dispatch_deaths(&mut self) {
        while !self.pending_deaths.is_empty() {
            let deaths = std::mem::take(&mut self.pending_deaths);
            for (victim, attacker) in deaths {
                self.handle_death(victim, attacker);
            }
        }
    }

    fn handle_death(&mut self, victim: EntityId, attacker: Option<EntityId>) {
        info!(%victim, ?attacker, "died");

        let watchers = self
            .entities
            .health_mut(victim)
            .map(Health::take_death_subscribers)
            .unwrap_or_default();
        for watcher in watchers {
            if let Some(agent) = self.agents.get_mut(&watcher) {
                let mut ctx = AggroContext {
                    now: self.clock,
                    entities: &mut self.entities,
                    events: &self.events,
                };
                agent.on_target_died(victim, &mut ctx);
            }
        }

        let Ok(entity) = self.entities.get_mut(victim) else {
            return;
        };
        entity.set_active(false);
        entity.velocity = Vec3::ZERO;
        let class = entity.class();

        if self.carrying.contains_key(&victim) {
            self.drop_carried(victim);
        }

        if let Some(agent) = self.agents.get_mut(&victim) {
            let mut ctx = AggroContext {
                now: self.clock,
                entities: &mut self.entities,
                events: &self.events,
            };
            agent.on_death(&mut ctx);
        }

        match class {
            EntityClass::Player => {
                if let Ok(entity) = self.entities.get(victim) {
                    let decision =
                        self.respawn
                            .notify_death(entity, self.clock, &self.session, &self.events);
                    debug!(%victim, ?decision, "respawn decision");
                    if decision == RespawnDecision::Ignored {
                        warn!(%victim, "death not handed to respawn");
                    }
                }
            },
            EntityClass::Neutral if self.camp_of.contains_key(&victim) => {},
            EntityClass::LifeFruit => {
                self.life_fruits.on_death(victim, &self.session);
                self.despawn_quietly(victim);
            },
            EntityClass::Neutral | EntityClass::Turret | EntityClass::Projectile => {
                self.despawn_quietly(victim);
            },
        }
    }

    fn despawn_quietly(&mut self, id: EntityId) {
        if let Err(err) = self.despawn(id) {
            debug!(%err, "despawn after death");
        }
    }
}

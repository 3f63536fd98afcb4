//! Hostile unit state machine.
//!
//! An [`Agent`] cycles `Idle -> Chasing -> Attacking -> Returning -> Idle`.
//! `Returning` is reachable from every state: losing the target, running out
//! of aggro, or straying past the leash all send the agent home.
//!
//! Agents do not call into health or their group directly. A tick returns
//! [`AgentIntent`]s (strikes and group alerts) which the simulation applies
//! right after the agent's own evaluation. Navigation is never waited on:
//! the delayed "resume pathing" step is a deadline field that any later
//! transition can overwrite or clear.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

use grovewatch_common::{horizontal_distance, rotate_towards, yaw_towards, EntityId, GroupId};

use crate::authority::Authority;
use crate::entity::{ClassFilter, Entity, EntityArena};
use crate::events::{EventBus, Notification};
use crate::services::{Navigation, SpatialQuery};
use crate::target::{is_valid_target, TargetRef};

/// Agent behavior states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    /// At home, scanning for targets
    #[default]
    Idle,
    /// Moving towards the target
    Chasing,
    /// In range, striking on cooldown
    Attacking,
    /// Walking back home, ignoring detection
    Returning,
}

impl AgentState {
    /// True for the states that hold a target.
    #[must_use]
    pub const fn is_engaged(self) -> bool {
        matches!(self, Self::Chasing | Self::Attacking)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Chasing => "chasing",
            Self::Attacking => "attacking",
            Self::Returning => "returning",
        };
        f.write_str(name)
    }
}

/// Tuning for hostile units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Radius of the idle detection scan
    pub detection_radius: f32,
    /// Seconds between idle detection scans
    pub detection_interval: f32,
    /// Classes the detection scan considers
    pub target_classes: ClassFilter,
    /// Distance at which the agent stops chasing and starts striking
    pub attack_range: f32,
    /// Nominal pursuit range
    pub chase_range: f32,
    /// Multiplier on `chase_range` beyond which pursuit is abandoned
    pub give_up_factor: f32,
    /// Leash length from home
    pub max_distance_from_home: f32,
    /// Seconds between strikes
    pub attack_cooldown: f32,
    /// Damage per strike
    pub attack_damage: f32,
    /// Seconds of aggro granted by an acquisition or a strike
    pub aggro_duration: f32,
    /// Distance from home that counts as arrived
    pub return_tolerance: f32,
    /// Pause between giving up and pathing home
    pub resume_delay: f32,
    /// Maximum turn rate while attacking, radians per second
    pub turn_speed: f32,
    /// Hit points of a freshly spawned unit
    pub max_health: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            detection_radius: 8.0,
            detection_interval: 0.5,
            target_classes: ClassFilter::PLAYERS,
            attack_range: 2.0,
            chase_range: 10.0,
            give_up_factor: 1.5,
            max_distance_from_home: 15.0,
            attack_cooldown: 1.0,
            attack_damage: 10.0,
            aggro_duration: 3.0,
            return_tolerance: 0.5,
            resume_delay: 0.1,
            turn_speed: 5.0,
            max_health: 100.0,
        }
    }
}

impl AgentConfig {
    /// Distance beyond which a chase is abandoned.
    #[must_use]
    pub fn give_up_radius(&self) -> f32 {
        self.chase_range * self.give_up_factor
    }

    /// Clamps values so the give-up radius always sits outside the attack range.
    pub fn validate(&mut self) {
        self.detection_radius = self.detection_radius.max(0.0);
        self.detection_interval = self.detection_interval.max(0.0);
        self.attack_range = self.attack_range.max(0.1);
        self.give_up_factor = self.give_up_factor.max(1.0);
        self.chase_range = self.chase_range.max(self.attack_range + 0.5);
        self.return_tolerance = self.return_tolerance.max(0.05);
        self.max_distance_from_home = self.max_distance_from_home.max(self.return_tolerance);
        self.attack_cooldown = self.attack_cooldown.max(0.05);
        self.attack_damage = self.attack_damage.max(0.0);
        self.aggro_duration = self.aggro_duration.max(0.1);
        self.resume_delay = self.resume_delay.max(0.0);
        self.turn_speed = self.turn_speed.max(0.0);
        self.max_health = self.max_health.max(1.0);
    }
}

/// Side effects an agent asks the simulation to carry out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentIntent {
    /// Apply melee damage to the target
    Strike {
        /// Striking agent
        attacker: EntityId,
        /// Entity struck
        target: EntityId,
        /// Damage dealt
        damage: f32,
    },
    /// Tell the rest of the agent's group about a newly acquired target
    Alert {
        /// Agent that acquired
        source: EntityId,
        /// Target acquired
        target: EntityId,
    },
}

/// Result of an aggro acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggroOutcome {
    /// Target invalid, agent down, or non-authoritative caller
    Rejected,
    /// Same target as before; expiry pushed out
    Refreshed,
    /// New target taken; the group should hear about it
    Acquired,
}

/// What an agent needs to change target or give up.
pub struct AggroContext<'a> {
    /// Simulation time in seconds
    pub now: f64,
    /// Entity arena (for validity checks and death subscriptions)
    pub entities: &'a mut EntityArena,
    /// Notification sink
    pub events: &'a EventBus,
}

/// Everything an agent sees during its tick.
pub struct TickContext<'a, Q: ?Sized, N: ?Sized> {
    /// Simulation time in seconds, already advanced for this tick
    pub now: f64,
    /// Tick length in seconds
    pub dt: f32,
    /// Entity arena
    pub entities: &'a mut EntityArena,
    /// Spatial query service
    pub spatial: &'a Q,
    /// Navigation service
    pub navigation: &'a mut N,
    /// Notification sink
    pub events: &'a EventBus,
}

impl<Q: ?Sized, N: ?Sized> TickContext<'_, Q, N> {
    fn aggro(&mut self) -> AggroContext<'_> {
        AggroContext {
            now: self.now,
            entities: &mut *self.entities,
            events: self.events,
        }
    }
}

/// A hostile unit.
#[derive(Debug, Clone)]
pub struct Agent {
    id: EntityId,
    state: AgentState,
    home: Vec3,
    target: TargetRef,
    aggro_expires_at: Option<f64>,
    next_attack_at: f64,
    next_detection_at: f64,
    /// Deadline for issuing the path home after giving up.
    resume_at: Option<f64>,
    /// Set by transitions; the next navigation flush issues a stop.
    cancel_navigation: bool,
    facing: f32,
    group: Option<GroupId>,
    authority: Authority,
    config: AgentConfig,
}

impl Agent {
    /// Creates an idle agent for entity `id` living at `home`.
    #[must_use]
    pub fn new(id: EntityId, home: Vec3, config: AgentConfig) -> Self {
        Self {
            id,
            state: AgentState::Idle,
            home,
            target: TargetRef::NONE,
            aggro_expires_at: None,
            next_attack_at: 0.0,
            next_detection_at: 0.0,
            resume_at: None,
            cancel_navigation: false,
            facing: 0.0,
            group: None,
            authority: Authority::Server,
            config,
        }
    }

    /// Builder: set the aggro group.
    #[must_use]
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// Builder: set which side owns this agent.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    /// Entity this agent drives.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Home position.
    #[must_use]
    pub const fn home(&self) -> Vec3 {
        self.home
    }

    /// Current target handle, if any.
    #[must_use]
    pub const fn target(&self) -> Option<EntityId> {
        self.target.id()
    }

    /// Time at which aggro runs out.
    #[must_use]
    pub const fn aggro_expires_at(&self) -> Option<f64> {
        self.aggro_expires_at
    }

    /// Pending resume-pathing deadline.
    #[must_use]
    pub const fn resume_at(&self) -> Option<f64> {
        self.resume_at
    }

    /// Earliest time of the next strike.
    #[must_use]
    pub const fn next_attack_at(&self) -> f64 {
        self.next_attack_at
    }

    /// Facing yaw in radians.
    #[must_use]
    pub const fn facing(&self) -> f32 {
        self.facing
    }

    /// Aggro group membership.
    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Sets or clears group membership.
    pub fn set_group(&mut self, group: Option<GroupId>) {
        self.group = group;
    }

    /// Tuning in effect.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Runs one tick of the state machine.
    ///
    /// Does nothing for a replica or while the agent's entity is down.
    pub fn tick<Q, N>(&mut self, ctx: &mut TickContext<'_, Q, N>) -> Vec<AgentIntent>
    where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        let mut intents = Vec::new();
        if !self.authority.is_authoritative() {
            trace!(agent = %self.id, "replica agent does not tick");
            return intents;
        }
        self.flush_navigation(ctx.navigation);
        let position = match ctx.entities.get(self.id) {
            Ok(entity) if entity.is_alive() => entity.position,
            _ => return intents,
        };

        let leashed = self.state != AgentState::Returning
            && horizontal_distance(position, self.home) > self.config.max_distance_from_home;
        if leashed {
            self.begin_return(&mut ctx.aggro(), "leash exceeded");
        } else {
            match self.state {
                AgentState::Idle => self.tick_idle(position, ctx, &mut intents),
                AgentState::Chasing => self.tick_chasing(position, ctx),
                AgentState::Attacking => self.tick_attacking(position, ctx, &mut intents),
                AgentState::Returning => self.tick_returning(position, ctx),
            }
        }

        self.flush_navigation(ctx.navigation);
        intents
    }

    fn tick_idle<Q, N>(
        &mut self,
        position: Vec3,
        ctx: &mut TickContext<'_, Q, N>,
        intents: &mut Vec<AgentIntent>,
    ) where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        if ctx.now < self.next_detection_at {
            return;
        }
        self.next_detection_at = ctx.now + f64::from(self.config.detection_interval);

        let mut candidates: Vec<(f32, EntityId, Vec3)> = ctx
            .spatial
            .query(
                position,
                self.config.detection_radius,
                self.config.target_classes,
            )
            .into_iter()
            .filter(|id| *id != self.id)
            .filter_map(|id| {
                let entity = ctx.entities.get(id).ok().filter(|e| e.is_alive())?;
                Some((horizontal_distance(position, entity.position), id, entity.position))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let visible = candidates
            .into_iter()
            .find(|(_, _, at)| ctx.spatial.has_line_of_sight(position, *at));
        if let Some((_, candidate, _)) = visible {
            if self.acquire_aggro(candidate, &mut ctx.aggro()) == AggroOutcome::Acquired {
                intents.push(AgentIntent::Alert {
                    source: self.id,
                    target: candidate,
                });
            }
        }
    }

    fn tick_chasing<Q, N>(&mut self, position: Vec3, ctx: &mut TickContext<'_, Q, N>)
    where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        let Some(target_position) = self.target.position(ctx.entities) else {
            self.begin_return(&mut ctx.aggro(), "target lost");
            return;
        };
        if self.aggro_expired(ctx.now) {
            self.begin_return(&mut ctx.aggro(), "aggro expired");
            return;
        }

        let distance = horizontal_distance(position, target_position);
        if distance > self.config.give_up_radius() {
            self.begin_return(&mut ctx.aggro(), "target out of reach");
        } else if distance <= self.config.attack_range {
            self.cancel_navigation = true;
            self.transition(AgentState::Attacking, ctx.events);
        } else {
            ctx.navigation.set_destination(self.id, target_position);
        }
    }

    fn tick_attacking<Q, N>(
        &mut self,
        position: Vec3,
        ctx: &mut TickContext<'_, Q, N>,
        intents: &mut Vec<AgentIntent>,
    ) where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        let (Some(target), Some(target_position)) =
            (self.target.id(), self.target.position(ctx.entities))
        else {
            self.begin_return(&mut ctx.aggro(), "target lost");
            return;
        };
        if self.aggro_expired(ctx.now) {
            self.begin_return(&mut ctx.aggro(), "aggro expired");
            return;
        }

        if horizontal_distance(position, target_position) > self.config.attack_range {
            self.transition(AgentState::Chasing, ctx.events);
            ctx.navigation.set_destination(self.id, target_position);
            return;
        }

        if let Some(yaw) = yaw_towards(position, target_position) {
            self.facing = rotate_towards(self.facing, yaw, self.config.turn_speed * ctx.dt);
        }

        if ctx.now >= self.next_attack_at {
            self.next_attack_at = ctx.now + f64::from(self.config.attack_cooldown);
            self.extend_aggro(ctx.now);
            intents.push(AgentIntent::Strike {
                attacker: self.id,
                target,
                damage: self.config.attack_damage,
            });
        }
    }

    fn tick_returning<Q, N>(&mut self, position: Vec3, ctx: &mut TickContext<'_, Q, N>)
    where
        Q: SpatialQuery + ?Sized,
        N: Navigation + ?Sized,
    {
        if let Some(resume_at) = self.resume_at {
            if ctx.now < resume_at {
                return;
            }
            self.resume_at = None;
            ctx.navigation.set_destination(self.id, self.home);
        }

        if horizontal_distance(position, self.home) <= self.config.return_tolerance {
            self.cancel_navigation = true;
            self.aggro_expires_at = None;
            self.transition(AgentState::Idle, ctx.events);
        } else if ctx.navigation.has_arrived(self.id) {
            // Navigation ended short of home.
            ctx.navigation.set_destination(self.id, self.home);
        }
    }

    /// Commits to `target`, or refreshes aggro if it already is the target.
    ///
    /// On [`AggroOutcome::Acquired`] the caller is responsible for alerting the group.
    pub fn acquire_aggro(&mut self, target: EntityId, ctx: &mut AggroContext<'_>) -> AggroOutcome {
        if !self.authority.permits("acquire_aggro") {
            return AggroOutcome::Rejected;
        }
        let self_alive = ctx.entities.get(self.id).is_ok_and(Entity::is_alive);
        if target == self.id || !self_alive || !is_valid_target(ctx.entities, target) {
            return AggroOutcome::Rejected;
        }

        if self.state.is_engaged() && self.target.is(target) {
            self.extend_aggro(ctx.now);
            return AggroOutcome::Refreshed;
        }

        self.release_target(ctx.entities);
        self.target = TargetRef::to(target);
        if let Ok(health) = ctx.entities.health_mut(target) {
            health.subscribe_death(self.id);
        }
        self.resume_at = None;
        self.aggro_expires_at = Some(ctx.now + f64::from(self.config.aggro_duration));
        self.transition(AgentState::Chasing, ctx.events);
        ctx.events.publish(Notification::AggroAcquired {
            agent: self.id,
            target,
        });
        AggroOutcome::Acquired
    }

    /// A group sibling acquired `target`.
    ///
    /// Same acceptance rules as [`Agent::acquire_aggro`]. Acquisitions made
    /// this way are not re-broadcast: an agent belongs to exactly one group,
    /// so the only group it could alert is the one already being notified,
    /// and every active member of it receives this same call.
    pub fn on_group_aggro_triggered(
        &mut self,
        source: EntityId,
        target: EntityId,
        ctx: &mut AggroContext<'_>,
    ) -> AggroOutcome {
        if source == self.id {
            return AggroOutcome::Rejected;
        }
        let outcome = self.acquire_aggro(target, ctx);
        trace!(agent = %self.id, %source, %target, ?outcome, "group aggro received");
        outcome
    }

    /// The current target died.
    pub fn on_target_died(&mut self, target: EntityId, ctx: &mut AggroContext<'_>) {
        if self.authority.is_authoritative() && self.target.is(target) {
            self.begin_return(ctx, "target died");
        }
    }

    /// This agent died. Drops everything; the camp brings it back later.
    pub fn on_death(&mut self, ctx: &mut AggroContext<'_>) {
        if !self.authority.permits("agent_on_death") {
            return;
        }
        self.release_target(ctx.entities);
        self.aggro_expires_at = None;
        self.resume_at = None;
        self.cancel_navigation = true;
        self.transition(AgentState::Idle, ctx.events);
    }

    /// Resets the agent for a fresh spawn at home.
    pub fn respawn(&mut self, ctx: &mut AggroContext<'_>) {
        if !self.authority.permits("agent_respawn") {
            return;
        }
        self.release_target(ctx.entities);
        self.aggro_expires_at = None;
        self.resume_at = None;
        self.cancel_navigation = true;
        self.facing = 0.0;
        self.next_detection_at = ctx.now;
        self.next_attack_at = ctx.now;
        self.transition(AgentState::Idle, ctx.events);
    }

    fn begin_return(&mut self, ctx: &mut AggroContext<'_>, reason: &'static str) {
        debug!(agent = %self.id, reason, "giving up");
        self.release_target(ctx.entities);
        self.cancel_navigation = true;
        self.resume_at = Some(ctx.now + f64::from(self.config.resume_delay));
        self.transition(AgentState::Returning, ctx.events);
    }

    fn release_target(&mut self, entities: &mut EntityArena) {
        if let Some(previous) = self.target.clear() {
            if let Ok(health) = entities.health_mut(previous) {
                health.unsubscribe_death(self.id);
            }
        }
    }

    fn extend_aggro(&mut self, now: f64) {
        let extended = now + f64::from(self.config.aggro_duration);
        self.aggro_expires_at = Some(self.aggro_expires_at.map_or(extended, |t| t.max(extended)));
    }

    fn aggro_expired(&self, now: f64) -> bool {
        self.aggro_expires_at.map_or(true, |t| now >= t)
    }

    /// Sends any pending stop request to `navigation`.
    pub fn flush_navigation<N: Navigation + ?Sized>(&mut self, navigation: &mut N) {
        if std::mem::take(&mut self.cancel_navigation) {
            navigation.stop(self.id);
        }
    }

    fn transition(&mut self, to: AgentState, events: &EventBus) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(agent = %self.id, %from, %to, "state change");
        self.state = to;
        events.publish(Notification::AgentStateChanged {
            agent: self.id,
            from,
            to,
        });
    }
}

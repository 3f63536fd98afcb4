//! Respawn coordination.
//!
//! Tracked entities (players) go `Alive -> Dead -> (delay) -> Respawned` if
//! their owner is still eligible. Eligibility lives in the session context,
//! not in global state, and is cleared when the session is torn down.

use ahash::AHashMap;
use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use grovewatch_common::{EntityId, OwnerId};

use crate::authority::Authority;
use crate::entity::{ClassFilter, Entity, EntityArena};
use crate::events::{EventBus, Notification};

/// Default respawn delay in seconds.
const DEFAULT_RESPAWN_DELAY: f32 = 3.0;

/// Errors that can occur while reviving an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RespawnError {
    /// Entity no longer exists
    #[error("Entity not found: {0}")]
    NotFound(EntityId),
    /// No spawn point could be resolved for the owner
    #[error("No spawn point for {owner} (entity {entity})")]
    NoSpawnPoint {
        /// Entity waiting to respawn
        entity: EntityId,
        /// Its owner
        owner: OwnerId,
    },
    /// Entity has no health to restore
    #[error("Entity has no health: {0}")]
    NoHealth(EntityId),
}

/// Result type for respawn operations.
pub type RespawnResult<T> = Result<T, RespawnError>;

/// Respawn tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    /// Respawn delay in seconds
    pub respawn_delay: f32,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            respawn_delay: DEFAULT_RESPAWN_DELAY,
        }
    }
}

/// Per-owner respawn permission. Unseen owners are allowed.
#[derive(Debug, Default)]
pub struct EligibilityTable {
    allowed: RwLock<AHashMap<OwnerId, bool>>,
}

impl EligibilityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `owner` may respawn. Records the default for unseen owners.
    pub fn is_allowed(&self, owner: OwnerId) -> bool {
        if let Some(allowed) = self.allowed.read().get(&owner) {
            return *allowed;
        }
        *self.allowed.write().entry(owner).or_insert(true)
    }

    /// Sets permission for `owner`.
    pub fn set(&self, owner: OwnerId, allowed: bool) {
        self.allowed.write().insert(owner, allowed);
    }

    /// Number of owners with a recorded entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allowed.read().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.read().is_empty()
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        self.allowed.write().clear();
    }
}

/// Session-scoped state shared by the coordinator and game-mode logic.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    authority: Authority,
    eligibility: Arc<EligibilityTable>,
}

impl SessionContext {
    /// Starts a session on the given side.
    #[must_use]
    pub fn new(authority: Authority) -> Self {
        Self {
            authority,
            eligibility: Arc::new(EligibilityTable::new()),
        }
    }

    /// Side this session runs on.
    #[must_use]
    pub const fn authority(&self) -> Authority {
        self.authority
    }

    /// Shared handle to the eligibility table, readable from any thread.
    #[must_use]
    pub fn eligibility(&self) -> Arc<EligibilityTable> {
        Arc::clone(&self.eligibility)
    }

    /// Whether `owner` may respawn.
    pub fn is_eligible(&self, owner: OwnerId) -> bool {
        self.eligibility.is_allowed(owner)
    }

    /// Toggles respawn permission for `owner`. Authority only.
    pub fn set_eligibility(&self, owner: OwnerId, allowed: bool) {
        if self.authority.permits("set_eligibility") {
            debug!(%owner, allowed, "respawn eligibility");
            self.eligibility.set(owner, allowed);
        }
    }

    /// Clears session state.
    pub fn teardown(&self) {
        self.eligibility.clear();
    }
}

/// A scheduled revival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRespawn {
    /// Entity to revive
    pub entity: EntityId,
    /// Owner at time of death
    pub owner: OwnerId,
    /// Simulation time at which to revive
    pub due_at: f64,
}

/// What the coordinator did with a death.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RespawnDecision {
    /// Not a class this coordinator revives
    Untracked,
    /// Owner is not eligible; entity stays down
    Eliminated,
    /// Revival scheduled
    Scheduled {
        /// Simulation time of the revival
        due_at: f64,
    },
    /// Already waiting to respawn
    AlreadyPending,
    /// Called from a non-authoritative context
    Ignored,
}

/// Schedules and performs revivals of tracked entities.
#[derive(Debug)]
pub struct RespawnCoordinator {
    config: RespawnConfig,
    tracked: ClassFilter,
    pending: Vec<PendingRespawn>,
    spawn_points: Vec<Vec3>,
    assigned: AHashMap<OwnerId, Vec3>,
}

impl Default for RespawnCoordinator {
    fn default() -> Self {
        Self::new(RespawnConfig::default())
    }
}

impl RespawnCoordinator {
    /// Creates a coordinator that revives players.
    #[must_use]
    pub fn new(config: RespawnConfig) -> Self {
        Self {
            config,
            tracked: ClassFilter::PLAYERS,
            pending: Vec::new(),
            spawn_points: Vec::new(),
            assigned: AHashMap::new(),
        }
    }

    /// Respawn delay in seconds.
    #[must_use]
    pub const fn respawn_delay(&self) -> f32 {
        self.config.respawn_delay
    }

    /// Adds a shared spawn point.
    pub fn add_spawn_point(&mut self, point: Vec3) {
        self.spawn_points.push(point);
    }

    /// Gives `owner` a dedicated spawn point.
    pub fn assign_spawn_point(&mut self, owner: OwnerId, point: Vec3) {
        self.assigned.insert(owner, point);
    }

    /// The owner's assigned point, else a shared point picked by owner id.
    #[must_use]
    pub fn spawn_point_for(&self, owner: OwnerId) -> Option<Vec3> {
        if let Some(point) = self.assigned.get(&owner) {
            return Some(*point);
        }
        if self.spawn_points.is_empty() {
            return None;
        }
        let index = owner.raw() as usize % self.spawn_points.len();
        Some(self.spawn_points[index])
    }

    /// Handles the death of `entity`.
    pub fn notify_death(
        &mut self,
        entity: &Entity,
        now: f64,
        session: &SessionContext,
        events: &EventBus,
    ) -> RespawnDecision {
        if !session.authority().permits("notify_death") {
            return RespawnDecision::Ignored;
        }
        let id = entity.id();
        if !self.tracked.contains(entity.class()) {
            debug!(entity = %id, class = ?entity.class(), "death not tracked for respawn");
            return RespawnDecision::Untracked;
        }
        if self.is_pending(id) {
            return RespawnDecision::AlreadyPending;
        }

        let owner = entity.owner();
        if !session.is_eligible(owner) {
            info!(entity = %id, %owner, "owner not eligible, eliminated");
            events.publish(Notification::Eliminated { entity: id, owner });
            return RespawnDecision::Eliminated;
        }

        let due_at = now + f64::from(self.config.respawn_delay);
        self.pending.push(PendingRespawn {
            entity: id,
            owner,
            due_at,
        });
        info!(entity = %id, %owner, due_at, "respawn scheduled");
        RespawnDecision::Scheduled { due_at }
    }

    /// Removes and returns every revival due at `now`, earliest first.
    pub fn take_due(&mut self, now: f64) -> Vec<PendingRespawn> {
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due_at <= now);
        self.pending = waiting;
        due.sort_by(|a, b| a.due_at.total_cmp(&b.due_at).then(a.entity.cmp(&b.entity)));
        due
    }

    /// Relocates, reactivates and heals `id`.
    pub fn revive(
        &self,
        id: EntityId,
        entities: &mut EntityArena,
        events: &EventBus,
    ) -> RespawnResult<Vec3> {
        let entity = entities.get_mut(id).map_err(|_| RespawnError::NotFound(id))?;
        let owner = entity.owner();
        let Some(point) = self.spawn_point_for(owner) else {
            error!(entity = %id, %owner, "no spawn point, respawn abandoned");
            return Err(RespawnError::NoSpawnPoint { entity: id, owner });
        };
        if entity.health().is_none() {
            return Err(RespawnError::NoHealth(id));
        }

        entity.position = point;
        entity.velocity = Vec3::ZERO;
        entity.set_active(true);
        if let Some(health) = entity.health_mut() {
            health.revive(id, events);
        }
        events.publish(Notification::Respawned {
            entity: id,
            position: point,
        });
        info!(entity = %id, %owner, ?point, "respawned");
        Ok(point)
    }

    /// Cancels a pending revival.
    pub fn cancel(&mut self, id: EntityId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.entity != id);
        before != self.pending.len()
    }

    /// Checks if `id` is waiting to respawn.
    #[must_use]
    pub fn is_pending(&self, id: EntityId) -> bool {
        self.pending.iter().any(|p| p.entity == id)
    }

    /// Number of pending revivals.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops all pending revivals.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

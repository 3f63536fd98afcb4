//! Notifications broadcast by the simulation, and the bus that carries them.
//!
//! Every observer, authoritative or not, sees the same stream. The server
//! drains the bus once per tick and ships the batch as a replication frame.
//!
//! Capacity only bounds chatter (damage ticks, state changes, aggro). Lifecycle
//! notifications are always queued, since observers count deaths, respawns
//! and eliminations from them.

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use grovewatch_common::{CampId, EntityId, OwnerId};

use crate::agent::AgentState;

/// Notification types that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// Damage was applied (fires on every successful hit)
    Damaged {
        /// Entity that took the hit
        victim: EntityId,
        /// Entity credited with the hit, if any
        attacker: Option<EntityId>,
        /// Health actually removed after rounding and clamping
        amount: f32,
    },
    /// Health reached zero (fires once per death)
    Died {
        /// Entity that died
        victim: EntityId,
        /// Entity credited with the kill, if any
        attacker: Option<EntityId>,
    },
    /// Health value changed for any reason
    HealthChanged {
        /// Entity whose health changed
        entity: EntityId,
        /// New current value
        current: f32,
        /// Maximum value
        max: f32,
    },
    /// Health was restored from dead to full
    Revived {
        /// Entity revived
        entity: EntityId,
    },
    /// Entity was relocated to a spawn point and reactivated
    Respawned {
        /// Entity respawned
        entity: EntityId,
        /// Spawn position
        position: Vec3,
    },
    /// Owner is no longer allowed to respawn and its entity stays down
    Eliminated {
        /// Entity that stays dead
        entity: EntityId,
        /// Owner that was eliminated
        owner: OwnerId,
    },
    /// Agent moved between state machine states
    AgentStateChanged {
        /// Agent entity
        agent: EntityId,
        /// Previous state
        from: AgentState,
        /// New state
        to: AgentState,
    },
    /// Agent committed to a new target
    AggroAcquired {
        /// Agent entity
        agent: EntityId,
        /// New target
        target: EntityId,
    },
    /// Every member of a camp is down
    CampCleared {
        /// Camp cleared
        camp: CampId,
    },
    /// Camp members were (re)spawned at home
    CampPopulated {
        /// Camp populated
        camp: CampId,
    },
}

impl Notification {
    /// True for notifications the bus never drops.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Died { .. }
                | Self::HealthChanged { .. }
                | Self::Revived { .. }
                | Self::Respawned { .. }
                | Self::Eliminated { .. }
                | Self::CampCleared { .. }
                | Self::CampPopulated { .. }
        )
    }
}

/// Event bus for broadcasting notifications to observers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting notifications
    sender: Sender<Notification>,
    /// Receiver for collecting notifications
    receiver: Receiver<Notification>,
    /// Soft limit on pending notifications
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventBus {
    /// Creates a new event bus with the given soft capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes a notification to the bus.
    ///
    /// Past capacity, non-lifecycle notifications are dropped.
    pub fn publish(&self, notification: Notification) {
        if !notification.is_lifecycle() && self.receiver.len() >= self.capacity {
            tracing::warn!(?notification, "event bus full, notification dropped");
            return;
        }
        // The receiver lives as long as the bus, so this cannot disconnect
        if self.sender.send(notification).is_err() {
            tracing::error!("event bus disconnected");
        }
    }

    /// Drains all pending notifications.
    pub fn drain(&self) -> Vec<Notification> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending notifications.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the soft capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing notifications.
    #[must_use]
    pub fn sender(&self) -> Sender<Notification> {
        self.sender.clone()
    }
}

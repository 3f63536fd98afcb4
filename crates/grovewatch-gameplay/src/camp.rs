//! Neutral camps.
//!
//! A camp owns a roster of neutral agents sharing one aggro group. It
//! populates after an initial delay, notices when every member is down and
//! repopulates after the respawn interval.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;

use grovewatch_common::{CampId, EntityId, GroupId};

/// Camp tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampConfig {
    /// Seconds after session start before the first population
    pub initial_spawn_time: f32,
    /// Seconds between clearing and repopulating
    pub respawn_interval: f32,
}

impl Default for CampConfig {
    fn default() -> Self {
        Self {
            initial_spawn_time: 60.0,
            respawn_interval: 60.0,
        }
    }
}

/// Lifecycle of a camp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CampState {
    /// Waiting for the first population
    Pending {
        /// Time of first population
        spawn_at: f64,
    },
    /// Members are up
    Active,
    /// Every member is down
    Cleared {
        /// Time of repopulation
        respawn_at: f64,
    },
}

/// Transition reported by [`Camp::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampEvent {
    /// Every member should be brought back at home with full health
    Populate,
    /// The last living member fell
    Cleared,
}

/// One neutral in a camp roster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CampMember {
    /// Agent entity
    pub agent: EntityId,
    /// Home position
    pub home: Vec3,
}

/// A camp of neutrals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camp {
    id: CampId,
    name: String,
    group: GroupId,
    members: Vec<CampMember>,
    state: CampState,
    config: CampConfig,
}

impl Camp {
    /// Creates an empty camp that first populates `initial_spawn_time` after `now`.
    #[must_use]
    pub fn new(id: CampId, name: impl Into<String>, group: GroupId, config: CampConfig, now: f64) -> Self {
        Self {
            id,
            name: name.into(),
            group,
            members: Vec::new(),
            state: CampState::Pending {
                spawn_at: now + f64::from(config.initial_spawn_time),
            },
            config,
        }
    }

    /// Camp identifier.
    #[must_use]
    pub const fn id(&self) -> CampId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aggro group shared by the members.
    #[must_use]
    pub const fn group(&self) -> GroupId {
        self.group
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CampState {
        self.state
    }

    /// Roster.
    #[must_use]
    pub fn members(&self) -> &[CampMember] {
        &self.members
    }

    /// Checks if `agent` belongs to this camp.
    #[must_use]
    pub fn contains(&self, agent: EntityId) -> bool {
        self.members.iter().any(|m| m.agent == agent)
    }

    /// Adds `agent` to the roster. Returns false if already present.
    pub fn add_member(&mut self, agent: EntityId, home: Vec3) -> bool {
        if self.contains(agent) {
            return false;
        }
        self.members.push(CampMember { agent, home });
        true
    }

    /// Removes `agent` from the roster.
    pub fn remove_member(&mut self, agent: EntityId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.agent != agent);
        before != self.members.len()
    }

    /// Advances the camp lifecycle. `is_alive` reports whether a member is up.
    pub fn update(&mut self, now: f64, is_alive: impl Fn(EntityId) -> bool) -> Option<CampEvent> {
        match self.state {
            CampState::Pending { spawn_at } | CampState::Cleared { respawn_at: spawn_at }
                if now >= spawn_at =>
            {
                self.state = CampState::Active;
                info!(camp = %self.name, members = self.members.len(), "camp populated");
                Some(CampEvent::Populate)
            },
            CampState::Active => {
                let alive = self.members.iter().filter(|m| is_alive(m.agent)).count();
                if alive > 0 || self.members.is_empty() {
                    return None;
                }
                self.state = CampState::Cleared {
                    respawn_at: now + f64::from(self.config.respawn_interval),
                };
                info!(camp = %self.name, "camp cleared");
                Some(CampEvent::Cleared)
            },
            _ => None,
        }
    }
}

//! Replication frames and the non-authoritative observer that consumes them.
//!
//! The server batches each tick's notifications into a [`ReplicationFrame`].
//! A [`ReplicaView`] applies those frames to mirrored health values and
//! agent states. Its health components carry [`Authority::Replica`], so any
//! attempt to mutate them locally is refused.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use grovewatch_common::{
    EntityId, GrovewatchError, GrovewatchResult, MagicBytes, ProtocolVersion,
};

use crate::agent::AgentState;
use crate::authority::Authority;
use crate::events::Notification;
use crate::health::Health;

/// One tick's worth of notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationFrame {
    /// Protocol version that produced the frame
    pub version: ProtocolVersion,
    /// Simulation tick number
    pub tick: u64,
    /// Simulation time in seconds
    pub time: f64,
    /// Notifications in publish order
    pub notifications: Vec<Notification>,
}

impl ReplicationFrame {
    /// Creates a frame stamped with the current protocol version.
    #[must_use]
    pub fn new(tick: u64, time: f64, notifications: Vec<Notification>) -> Self {
        Self {
            version: ProtocolVersion::REPLICATION,
            tick,
            time,
            notifications,
        }
    }

    /// Returns true if the frame carries no notifications.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Serializes to binary format.
    pub fn to_bytes(&self) -> GrovewatchResult<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&MagicBytes::FRAME.0);
        let data =
            bincode::serialize(self).map_err(|e| GrovewatchError::Serialization(e.to_string()))?;
        buffer.extend(data);
        Ok(buffer)
    }

    /// Deserializes from binary format.
    pub fn from_bytes(bytes: &[u8]) -> GrovewatchResult<Self> {
        if bytes.len() < 4 || bytes[0..4] != MagicBytes::FRAME.0 {
            return Err(GrovewatchError::Serialization(
                "missing frame magic".to_string(),
            ));
        }
        let frame: Self = bincode::deserialize(&bytes[4..])
            .map_err(|e| GrovewatchError::Serialization(e.to_string()))?;

        if !ProtocolVersion::REPLICATION.is_compatible_with(&frame.version) {
            return Err(GrovewatchError::VersionMismatch {
                expected: ProtocolVersion::REPLICATION,
                actual: frame.version,
            });
        }
        Ok(frame)
    }
}

/// Client-side mirror of replicated state.
#[derive(Debug, Default)]
pub struct ReplicaView {
    health: AHashMap<EntityId, Health>,
    agent_states: AHashMap<EntityId, AgentState>,
    eliminated: AHashSet<EntityId>,
    last_tick: Option<u64>,
}

impl ReplicaView {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a frame. Frames older than the last applied one are skipped.
    ///
    /// Returns true if the frame was applied.
    pub fn apply_frame(&mut self, frame: &ReplicationFrame) -> bool {
        if self.last_tick.is_some_and(|last| frame.tick <= last) {
            warn!(tick = frame.tick, last = ?self.last_tick, "stale replication frame skipped");
            return false;
        }
        for notification in &frame.notifications {
            self.apply(notification);
        }
        self.last_tick = Some(frame.tick);
        true
    }

    /// Applies one notification.
    pub fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::HealthChanged {
                entity,
                current,
                max,
            } => {
                self.health
                    .entry(*entity)
                    .or_insert_with(|| Health::new(*max).with_authority(Authority::Replica))
                    .sync(*current, *max);
            },
            Notification::Died { victim, .. } => {
                if let Some(health) = self.health.get_mut(victim) {
                    let max = health.max();
                    health.sync(0.0, max);
                }
            },
            Notification::Respawned { entity, .. } | Notification::Revived { entity } => {
                self.eliminated.remove(entity);
            },
            Notification::Eliminated { entity, .. } => {
                self.eliminated.insert(*entity);
            },
            Notification::AgentStateChanged { agent, to, .. } => {
                self.agent_states.insert(*agent, *to);
            },
            other => debug!(?other, "replica ignores notification"),
        }
    }

    /// Mirrored health of `entity`.
    #[must_use]
    pub fn health(&self, entity: EntityId) -> Option<&Health> {
        self.health.get(&entity)
    }

    /// Mutable mirrored health. Mutators on it are refused.
    pub fn health_mut(&mut self, entity: EntityId) -> Option<&mut Health> {
        self.health.get_mut(&entity)
    }

    /// Last replicated state of `agent`.
    #[must_use]
    pub fn agent_state(&self, agent: EntityId) -> Option<AgentState> {
        self.agent_states.get(&agent).copied()
    }

    /// True if `entity` was eliminated and has not come back.
    #[must_use]
    pub fn is_eliminated(&self, entity: EntityId) -> bool {
        self.eliminated.contains(&entity)
    }

    /// Tick of the last applied frame.
    #[must_use]
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use grovewatch_common::OwnerId;

    fn hit(entity: EntityId, current: f32) -> Notification {
        Notification::HealthChanged {
            entity,
            current,
            max: 100.0,
        }
    }

    #[test]
    fn test_frame_bytes_roundtrip() {
        let id = EntityId::new(3, 1);
        let frame = ReplicationFrame::new(
            7,
            0.7,
            vec![
                hit(id, 40.0),
                Notification::Died {
                    victim: id,
                    attacker: None,
                },
            ],
        );
        let bytes = frame.to_bytes().expect("encode");
        assert_eq!(&bytes[0..4], b"GRVF");
        assert_eq!(ReplicationFrame::from_bytes(&bytes).expect("decode"), frame);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let result = ReplicationFrame::from_bytes(b"NOPE1234");
        assert!(matches!(result, Err(GrovewatchError::Serialization(_))));
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let mut frame = ReplicationFrame::new(1, 0.0, Vec::new());
        frame.version = ProtocolVersion::new(2, 0, 0);
        let bytes = frame.to_bytes().expect("encode");

        let result = ReplicationFrame::from_bytes(&bytes);

        assert!(matches!(
            result,
            Err(GrovewatchError::VersionMismatch { actual, .. }) if actual.major == 2
        ));
    }

    #[test]
    fn test_view_mirrors_health_and_death() {
        let id = EntityId::new(1, 0);
        let mut view = ReplicaView::new();
        view.apply(&hit(id, 30.0));
        assert!((view.health(id).expect("mirrored").current() - 30.0).abs() < f32::EPSILON);

        view.apply(&Notification::Died {
            victim: id,
            attacker: None,
        });
        assert!(view.health(id).expect("mirrored").is_dead());
    }

    #[test]
    fn test_view_refuses_local_mutation() {
        let id = EntityId::new(1, 0);
        let bus = EventBus::default();
        let mut view = ReplicaView::new();
        view.apply(&hit(id, 50.0));

        let health = view.health_mut(id).expect("mirrored");
        let outcome = health.apply_damage(id, 20.0, None, &bus);
        health.heal(id, 20.0, &bus);

        assert!(!outcome.landed());
        assert!((view.health(id).expect("mirrored").current() - 50.0).abs() < f32::EPSILON);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_stale_frames_skipped() {
        let id = EntityId::new(1, 0);
        let mut view = ReplicaView::new();
        assert!(view.apply_frame(&ReplicationFrame::new(5, 0.5, vec![hit(id, 80.0)])));
        assert!(!view.apply_frame(&ReplicationFrame::new(4, 0.4, vec![hit(id, 10.0)])));
        assert!((view.health(id).expect("mirrored").current() - 80.0).abs() < f32::EPSILON);
        assert_eq!(view.last_tick(), Some(5));
    }

    #[test]
    fn test_elimination_tracked() {
        let id = EntityId::new(2, 0);
        let mut view = ReplicaView::new();
        view.apply(&Notification::Eliminated {
            entity: id,
            owner: OwnerId::new(7),
        });
        assert!(view.is_eliminated(id));
        view.apply(&Notification::Revived { entity: id });
        assert!(!view.is_eliminated(id));
    }

    #[test]
    fn test_agent_state_mirrored() {
        let agent = EntityId::new(4, 0);
        let mut view = ReplicaView::new();
        view.apply(&Notification::AgentStateChanged {
            agent,
            from: AgentState::Idle,
            to: AgentState::Chasing,
        });
        assert_eq!(view.agent_state(agent), Some(AgentState::Chasing));
    }
}

//! # Grovewatch Gameplay
//!
//! Server-authoritative combat simulation for Grovewatch.
//!
//! This crate provides:
//! - Health with edge-triggered death and authority checks
//! - Generational entity arena and weak target references
//! - Hostile agent state machine (idle, chasing, attacking, returning)
//! - Aggro groups with single-hop alert fan-out
//! - Respawn coordination with per-owner eligibility
//! - Damage sources: melee agents, turrets, projectiles
//! - Camps and life fruit
//! - Plant pickup, carry and placement arming turrets
//! - Replication frames and a read-only replica view
//! - Event bus for notifications

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod agent;
pub mod aggro_group;
pub mod authority;
pub mod camp;
pub mod entity;
pub mod events;
pub mod health;
pub mod life_fruit;
pub mod plant;
pub mod projectile;
pub mod replica;
pub mod respawn;
pub mod services;
pub mod simulation;
pub mod target;
pub mod turret;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::agent::*;
    pub use crate::aggro_group::*;
    pub use crate::authority::*;
    pub use crate::camp::*;
    pub use crate::entity::*;
    pub use crate::events::*;
    pub use crate::health::*;
    pub use crate::life_fruit::*;
    pub use crate::plant::*;
    pub use crate::projectile::*;
    pub use crate::replica::*;
    pub use crate::respawn::*;
    pub use crate::services::*;
    pub use crate::simulation::*;
    pub use crate::target::*;
    pub use crate::turret::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use grovewatch_common::{EntityId, OwnerId};

    #[test]
    fn test_health_creation() {
        let health = Health::new(100.0);
        assert!(!health.is_dead());
        assert!((health.fraction() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_default_tuning_has_hysteresis() {
        let config = SimulationConfig::default();
        assert!(config.agent.give_up_radius() > config.agent.attack_range);
        assert!(config.turret.range > config.agent.attack_range);
    }

    #[test]
    fn test_simulation_frame_for_replica() {
        let mut sim = Simulation::new(SimulationConfig::default());
        let player = sim.spawn_player(OwnerId::new(1), Vec3::ZERO);
        sim.apply_damage(player, 30.0, None);

        let frame = ReplicationFrame::new(sim.tick_count(), sim.now(), sim.drain_events());
        let bytes = frame.to_bytes().expect("encode");
        let decoded = ReplicationFrame::from_bytes(&bytes).expect("decode");

        let mut view = ReplicaView::new();
        view.apply_frame(&decoded);
        let mirrored = view.health(player).expect("mirrored");
        assert!((mirrored.current() - 70.0).abs() < f32::EPSILON);
        assert_eq!(mirrored.authority(), Authority::Replica);
        assert!(view.health(EntityId::new(99, 0)).is_none());
    }
}

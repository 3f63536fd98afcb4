//! Startup world layout and scripted players.
//!
//! Players sit on a ring around the map center with their turrets and life
//! fruit next to them. Camps are placed on an inner ring. Each scripted
//! player first plants the wild plant lying beside its base, then walks
//! between its base and the nearest camp, shooting at any neutral that comes
//! within range.

use std::f32::consts::TAU;

use anyhow::Context;
use glam::Vec3;
use tracing::{debug, info, warn};

use grovewatch_common::{horizontal_direction, horizontal_distance, EntityId, OwnerId};
use grovewatch_gameplay::{EntityClass, Navigation, Occluder, Simulation};

use crate::config::ScenarioConfig;

/// Distance of player bases from the map center.
const BASE_RADIUS: f32 = 30.0;
/// Distance of neutrals from their camp center.
const CAMP_SPREAD: f32 = 2.5;
/// Range at which scripted players open fire.
const SHOT_RANGE: f32 = 12.0;

/// A player driven by a fixed patrol script.
#[derive(Debug, Clone)]
pub struct ScriptedPlayer {
    /// Player entity
    pub entity: EntityId,
    /// Home base
    pub base: Vec3,
    /// Patrol target away from home
    pub waypoint: Vec3,
    outbound: bool,
    next_shot_at: f64,
    seedling: Option<EntityId>,
}

impl ScriptedPlayer {
    fn new(entity: EntityId, base: Vec3, waypoint: Vec3) -> Self {
        Self {
            entity,
            base,
            waypoint,
            outbound: false,
            next_shot_at: 0.0,
            seedling: None,
        }
    }

    fn with_seedling(mut self, plant: EntityId) -> Self {
        self.seedling = Some(plant);
        self
    }

    fn drive<N: Navigation + ?Sized>(
        &mut self,
        sim: &mut Simulation,
        navigation: &mut N,
        config: &ScenarioConfig,
    ) {
        let Some(position) = sim
            .entity(self.entity)
            .filter(|e| e.is_alive())
            .map(|e| e.position)
        else {
            return;
        };

        if let Some(plant) = self.seedling.take() {
            let planted = sim
                .pickup_plant(self.entity, plant)
                .and_then(|()| sim.place_plant(self.entity));
            match planted {
                Ok(plant) => debug!(player = %self.entity, %plant, "seedling planted"),
                Err(e) => {
                    warn!(player = %self.entity, "planting failed: {e}");
                    if sim.carried_plant(self.entity).is_some() {
                        if let Err(e) = sim.drop_plant(self.entity) {
                            warn!(player = %self.entity, "dropping plant failed: {e}");
                        }
                    }
                },
            }
        }

        if navigation.has_arrived(self.entity) {
            self.outbound = !self.outbound;
            let destination = if self.outbound { self.waypoint } else { self.base };
            navigation.set_destination(self.entity, destination);
        }

        if sim.now() < self.next_shot_at {
            return;
        }
        let Some(target) = nearest_neutral(sim, position) else {
            return;
        };
        let Some(direction) = horizontal_direction(position, target) else {
            return;
        };
        match sim.fire_bullet(self.entity, direction, config.bullet_damage) {
            Ok(bullet) => {
                debug!(player = %self.entity, %bullet, "scripted shot");
                self.next_shot_at = sim.now() + f64::from(config.fire_interval);
            },
            Err(e) => warn!(player = %self.entity, "scripted shot failed: {e}"),
        }
    }
}

fn nearest_neutral(sim: &Simulation, from: Vec3) -> Option<Vec3> {
    sim.entities()
        .iter_by_class(EntityClass::Neutral)
        .filter(|e| e.is_alive())
        .map(|e| (horizontal_distance(from, e.position), e.position))
        .filter(|(distance, _)| *distance <= SHOT_RANGE)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, position)| position)
}

fn ring(index: u32, count: u32, radius: f32) -> Vec3 {
    let angle = TAU * index as f32 / count.max(1) as f32;
    Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
}

/// The world built at startup.
#[derive(Debug)]
pub struct Scenario {
    config: ScenarioConfig,
    players: Vec<ScriptedPlayer>,
    camp_centers: Vec<Vec3>,
}

impl Scenario {
    /// Populates `sim` with players, turrets, life fruit and camps.
    pub fn build(config: &ScenarioConfig, sim: &mut Simulation) -> anyhow::Result<Self> {
        for point in &config.spawn_points {
            sim.add_spawn_point(*point);
        }

        let camp_centers: Vec<Vec3> = (0..config.camps)
            .map(|i| ring(i, config.camps, config.camp_radius))
            .collect();
        for (index, center) in camp_centers.iter().enumerate() {
            let camp = sim.create_camp(format!("Camp_{:02}", index + 1));
            for slot in 0..config.agents_per_camp {
                let home = *center + ring(slot, config.agents_per_camp, CAMP_SPREAD);
                sim.spawn_neutral(camp, home)
                    .with_context(|| format!("spawning neutral {slot} in camp {index}"))?;
            }
        }

        let mut players = Vec::with_capacity(config.players as usize);
        for index in 0..config.players {
            let owner = OwnerId::new(index + 1);
            let base = ring(index, config.players, BASE_RADIUS);
            let outward = base.normalize_or_zero();
            let side = Vec3::new(-outward.z, 0.0, outward.x);

            let entity = sim.spawn_player(owner, base);
            sim.assign_spawn_point(owner, base);

            for t in 0..config.turrets_per_player {
                let offset = (t as f32 - (config.turrets_per_player as f32 - 1.0) / 2.0) * 3.0;
                sim.spawn_turret(owner, base - outward * 4.0 + side * offset);
            }
            if config.life_fruit {
                sim.spawn_life_fruit(owner, base + outward * 3.0);
            }

            let waypoint = camp_centers
                .iter()
                .copied()
                .min_by(|a, b| {
                    horizontal_distance(base, *a).total_cmp(&horizontal_distance(base, *b))
                })
                .unwrap_or(Vec3::ZERO);
            let mut player = ScriptedPlayer::new(entity, base, waypoint);
            if config.wild_plants {
                player = player.with_seedling(sim.spawn_plant(base + side * 2.0));
            }
            players.push(player);
        }

        info!(
            camps = config.camps,
            players = players.len(),
            entities = sim.entities().len(),
            "Scenario built"
        );

        Ok(Self {
            config: config.clone(),
            players,
            camp_centers,
        })
    }

    /// Line-of-sight blockers for spatial snapshots.
    #[must_use]
    pub fn occluders(&self) -> &[Occluder] {
        &self.config.occluders
    }

    /// Scripted players.
    #[must_use]
    pub fn players(&self) -> &[ScriptedPlayer] {
        &self.players
    }

    /// Camp centers in creation order.
    #[must_use]
    pub fn camp_centers(&self) -> &[Vec3] {
        &self.camp_centers
    }

    /// Steers every scripted player for the next tick.
    pub fn drive<N: Navigation + ?Sized>(&mut self, sim: &mut Simulation, navigation: &mut N) {
        for player in &mut self.players {
            player.drive(sim, navigation, &self.config);
        }
    }
}

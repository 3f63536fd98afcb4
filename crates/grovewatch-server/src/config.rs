//! Server configuration.
//!
//! Tick rate, run length, simulation tuning and the scenario to build.
//! Configuration can be loaded from and saved to a TOML file.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use grovewatch_gameplay::{Occluder, SimulationConfig};

/// Configuration file name.
pub const CONFIG_FILE: &str = "grovewatch.toml";

/// Layout of the world the server builds at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Number of neutral camps
    pub camps: u32,
    /// Neutrals per camp
    pub agents_per_camp: u32,
    /// Distance of each camp from the map center
    pub camp_radius: f32,
    /// Number of scripted players
    pub players: u32,
    /// Turrets placed next to each player's base
    pub turrets_per_player: u32,
    /// Plant a life fruit for each player
    pub life_fruit: bool,
    /// Drop a wild plant beside each base for its player to place
    pub wild_plants: bool,
    /// Movement speed of every navigating entity
    pub move_speed: f32,
    /// Player damage per bullet
    pub bullet_damage: f32,
    /// Seconds between bullets fired by each scripted player
    pub fire_interval: f32,
    /// Shared respawn points
    pub spawn_points: Vec<Vec3>,
    /// Line-of-sight blockers
    pub occluders: Vec<Occluder>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            camps: 2,
            agents_per_camp: 3,
            camp_radius: 18.0,
            players: 2,
            turrets_per_player: 1,
            life_fruit: true,
            wild_plants: true,
            move_speed: 3.5,
            bullet_damage: 15.0,
            fire_interval: 0.75,
            spawn_points: vec![Vec3::new(0.0, 0.0, -30.0), Vec3::new(0.0, 0.0, 30.0)],
            occluders: vec![Occluder::new(Vec3::ZERO, 2.0)],
        }
    }
}

/// Server configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // === Loop Settings ===
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Stop after this many simulated seconds (0 = run until interrupted)
    pub run_for_secs: f32,
    /// Write length-prefixed replication frames to this file
    pub record_path: Option<PathBuf>,

    // === Simulation ===
    /// Gameplay tuning
    pub simulation: SimulationConfig,

    // === Scenario ===
    /// World layout
    pub scenario: ScenarioConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            run_for_secs: 180.0,
            record_path: None,
            simulation: SimulationConfig::default(),
            scenario: ScenarioConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Path given on the command line, else the default file name.
    pub fn path_from_args<I: IntoIterator<Item = String>>(args: I) -> PathBuf {
        args.into_iter()
            .nth(1)
            .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from)
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        // Loop
        self.tick_rate = self.tick_rate.clamp(1, 240);
        if !self.run_for_secs.is_finite() || self.run_for_secs < 0.0 {
            self.run_for_secs = 0.0;
        }

        // Simulation
        let sim = &mut self.simulation;
        sim.agent.validate();
        sim.event_capacity = sim.event_capacity.clamp(64, 1 << 20);
        sim.player_max_health = sim.player_max_health.max(1.0);
        sim.life_fruit_max_health = sim.life_fruit_max_health.max(1.0);
        sim.respawn.respawn_delay = sim.respawn.respawn_delay.max(0.0);
        sim.turret.fire_rate = sim.turret.fire_rate.clamp(0.0, 20.0);
        sim.projectile.speed = sim.projectile.speed.max(0.1);
        sim.projectile.lifetime = sim.projectile.lifetime.max(0.0);

        // Scenario
        let scenario = &mut self.scenario;
        scenario.camps = scenario.camps.min(32);
        scenario.agents_per_camp = scenario.agents_per_camp.min(16);
        scenario.players = scenario.players.min(16);
        scenario.turrets_per_player = scenario.turrets_per_player.min(8);
        scenario.fire_interval = scenario.fire_interval.max(0.05);
        scenario.move_speed = scenario.move_speed.clamp(0.1, 50.0);
    }

    /// Fixed simulation step in seconds.
    #[must_use]
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Number of ticks to run, or `None` to run until interrupted.
    #[must_use]
    pub fn tick_limit(&self) -> Option<u64> {
        if self.run_for_secs > 0.0 {
            Some((self.run_for_secs * self.tick_rate as f32).ceil() as u64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 20);
        assert!(config.record_path.is_none());
        assert_eq!(config.scenario.camps, 2);
        assert!((config.simulation.agent.attack_range - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();

        config.tick_rate = 0;
        config.run_for_secs = -5.0;
        config.simulation.event_capacity = 1;
        config.scenario.camps = 1000;

        config.validate();

        assert_eq!(config.tick_rate, 1);
        assert!(config.run_for_secs.abs() < f32::EPSILON);
        assert_eq!(config.simulation.event_capacity, 64);
        assert_eq!(config.scenario.camps, 32);
        assert_eq!(config.tick_limit(), None);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let mut config = ServerConfig::default();
        config.tick_rate = 30;
        config.simulation.agent.aggro_duration = 5.0;
        config.scenario.spawn_points = vec![Vec3::new(1.0, 0.0, 2.0)];
        config.record_path = Some(PathBuf::from("frames.bin"));

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = ServerConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "tick_rate = 10\n[simulation.agent]\nattack_range = 3.0\n")
            .expect("Failed to write config");

        let loaded = ServerConfig::load_from(&config_path);

        assert_eq!(loaded.tick_rate, 10);
        assert!((loaded.simulation.agent.attack_range - 3.0).abs() < f32::EPSILON);
        assert!((loaded.simulation.agent.detection_radius - 8.0).abs() < f32::EPSILON);
        assert_eq!(loaded.scenario, ScenarioConfig::default());
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = ServerConfig::load_from("/nonexistent/path/grovewatch.toml");
        assert_eq!(config.tick_rate, 20);
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "tick_rate = \"fast\"").expect("Failed to write config");

        assert_eq!(ServerConfig::load_from(&config_path), ServerConfig::default());
    }

    #[test]
    fn test_path_from_args() {
        let args = vec!["grovewatch".to_string(), "custom.toml".to_string()];
        assert_eq!(ServerConfig::path_from_args(args), PathBuf::from("custom.toml"));
        assert_eq!(
            ServerConfig::path_from_args(vec!["grovewatch".to_string()]),
            PathBuf::from(CONFIG_FILE)
        );
    }

    #[test]
    fn test_tick_limit() {
        let mut config = ServerConfig::default();
        config.tick_rate = 20;
        config.run_for_secs = 1.5;
        assert_eq!(config.tick_limit(), Some(30));
        assert!((config.tick_dt() - 0.05).abs() < 1e-6);
    }
}

//! # Grovewatch Server
//!
//! Headless authoritative server for Grovewatch.
//!
//! Builds the configured scenario, then steps the simulation at a fixed
//! rate. Each tick's notifications are batched into a replication frame and
//! optionally recorded to disk.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod scenario;
mod timing;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use grovewatch_gameplay::{
    EntityClass, Notification, ReplicationFrame, Simulation, SpatialSnapshot,
    StraightLineNavigator,
};

use crate::config::ServerConfig;
use crate::scenario::Scenario;
use crate::timing::TickTiming;

/// Tallies printed when the server stops.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    ticks: u64,
    sim_time: f64,
    entities: usize,
    neutrals_alive: usize,
    players_alive: usize,
    deaths: u64,
    respawns: u64,
    eliminations: u64,
    camps_cleared: u64,
    frames_recorded: u64,
    avg_tick_ms: f32,
    worst_tick_ms: f32,
}

impl RunSummary {
    fn count(&mut self, notifications: &[Notification]) {
        for notification in notifications {
            match notification {
                Notification::Died { .. } => self.deaths += 1,
                Notification::Respawned { .. } => self.respawns += 1,
                Notification::Eliminated { .. } => self.eliminations += 1,
                Notification::CampCleared { .. } => self.camps_cleared += 1,
                _ => {},
            }
        }
    }

    fn finish(&mut self, sim: &Simulation, timing: &TickTiming) {
        let alive = |class| {
            sim.entities()
                .iter_by_class(class)
                .filter(|e| e.is_alive())
                .count()
        };
        self.ticks = sim.tick_count();
        self.sim_time = sim.now();
        self.entities = sim.entities().len();
        self.neutrals_alive = alive(EntityClass::Neutral);
        self.players_alive = alive(EntityClass::Player);
        self.avg_tick_ms = timing.average_tick_ms();
        self.worst_tick_ms = timing.worst_tick_ms();
    }
}

/// Writes length-prefixed replication frames.
struct FrameRecorder {
    writer: BufWriter<File>,
}

impl FrameRecorder {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating frame log {}", path.display()))?;
        info!("Recording frames to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn record(&mut self, frame: &ReplicationFrame) -> Result<()> {
        let bytes = frame.to_bytes()?;
        let len = u32::try_from(bytes.len()).context("frame too large")?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("grovewatch=info".parse()?))
        .init();

    info!("Grovewatch server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let path = ServerConfig::path_from_args(std::env::args());
    let mut config = ServerConfig::load_from(&path);
    config.validate();

    let summary = run(&config).await?;
    info!("Run summary: {}", serde_json::to_string(&summary)?);

    info!("Grovewatch server shutdown complete");
    Ok(())
}

async fn run(config: &ServerConfig) -> Result<RunSummary> {
    let mut sim = Simulation::new(config.simulation);
    let mut scenario = Scenario::build(&config.scenario, &mut sim)?;
    let mut nav = StraightLineNavigator::new(config.scenario.move_speed);
    let mut timing = TickTiming::new(config.tick_rate);
    let mut recorder = config
        .record_path
        .as_deref()
        .map(FrameRecorder::create)
        .transpose()?;
    let mut summary = RunSummary::default();
    let limit = config.tick_limit();
    let dt = timing.fixed_dt();

    let mut ticker = interval(timing.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick fires immediately
    ticker.tick().await;
    timing.reset();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    'run: loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down");
                break 'run;
            },
        }

        let frame_dt = timing.delta_time();
        let steps = timing.accumulate(frame_dt);
        for _ in 0..steps {
            let started = Instant::now();

            let spatial = SpatialSnapshot::capture(sim.entities(), scenario.occluders());
            sim.tick(dt, &spatial, &mut nav);
            nav.advance(sim.entities_mut(), dt);
            scenario.drive(&mut sim, &mut nav);

            let frame = ReplicationFrame::new(sim.tick_count(), sim.now(), sim.drain_events());
            summary.count(&frame.notifications);
            if let Some(recorder) = recorder.as_mut() {
                if !frame.is_empty() {
                    recorder.record(&frame)?;
                    summary.frames_recorded += 1;
                }
            }

            timing.record_tick_cost(started.elapsed());

            if sim.tick_count() % u64::from(config.tick_rate * 10) == 0 {
                debug!(
                    tick = sim.tick_count(),
                    avg_ms = timing.average_tick_ms(),
                    budget = timing.budget_usage(),
                    "tick stats"
                );
            }
            if limit.is_some_and(|limit| sim.tick_count() >= limit) {
                info!(ticks = sim.tick_count(), "Tick limit reached");
                break 'run;
            }
        }
        if timing.budget_usage() > 1.0 {
            warn!(
                avg_ms = timing.average_tick_ms(),
                "Simulation is running behind"
            );
        }
    }

    if let Some(recorder) = recorder {
        recorder.finish()?;
    }
    summary.finish(&sim, &timing);
    sim.teardown();
    Ok(summary)
}

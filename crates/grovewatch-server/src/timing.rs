//! Tick timing and cost tracking.
//!
//! The loop wakes on a tokio interval, measures how much wall time passed
//! and converts it into a whole number of fixed simulation steps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fixed-step accumulator for the server loop.
#[derive(Debug)]
pub struct TickTiming {
    /// Steps per second
    tick_rate: u32,
    /// Fixed simulation step
    fixed_dt: f32,
    /// Time of the last wake
    last_wake: Instant,
    /// Wall time not yet simulated
    accumulator: f32,
    /// Largest wall delta accepted per wake
    max_dt: f32,
    /// Recent tick costs in seconds
    tick_costs: VecDeque<f32>,
    /// Maximum samples kept
    max_samples: usize,
    /// Worst tick cost seen
    worst_cost: f32,
}

impl TickTiming {
    /// Creates timing for `tick_rate` steps per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            fixed_dt: 1.0 / tick_rate as f32,
            last_wake: Instant::now(),
            accumulator: 0.0,
            max_dt: 0.25,
            tick_costs: VecDeque::with_capacity(120),
            max_samples: 120,
            worst_cost: 0.0,
        }
    }

    /// Fixed simulation step in seconds.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Interval between wakes.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate))
    }

    /// Wall time since the last wake, clamped.
    pub fn delta_time(&mut self) -> f32 {
        let now = Instant::now();
        let dt = (now - self.last_wake).as_secs_f32();
        self.last_wake = now;
        dt.min(self.max_dt)
    }

    /// Accumulates `dt` and returns how many fixed steps to run.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt;
        let mut count = 0;

        let max_updates = 10;
        while self.accumulator >= self.fixed_dt && count < max_updates {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // Still behind after the cap: drop the backlog
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        count
    }

    /// Records how long one simulation step took.
    pub fn record_tick_cost(&mut self, cost: Duration) {
        let secs = cost.as_secs_f32();
        self.worst_cost = self.worst_cost.max(secs);
        self.tick_costs.push_back(secs);
        if self.tick_costs.len() > self.max_samples {
            self.tick_costs.pop_front();
        }
    }

    /// Average recent tick cost in milliseconds.
    #[must_use]
    pub fn average_tick_ms(&self) -> f32 {
        if self.tick_costs.is_empty() {
            return 0.0;
        }
        (self.tick_costs.iter().sum::<f32>() / self.tick_costs.len() as f32) * 1000.0
    }

    /// Worst tick cost seen, in milliseconds.
    #[must_use]
    pub fn worst_tick_ms(&self) -> f32 {
        self.worst_cost * 1000.0
    }

    /// Fraction of the step budget used by the average tick.
    #[must_use]
    pub fn budget_usage(&self) -> f32 {
        self.average_tick_ms() / (self.fixed_dt * 1000.0)
    }

    /// Reset timing (after a stall).
    pub fn reset(&mut self) {
        self.last_wake = Instant::now();
        self.accumulator = 0.0;
        self.tick_costs.clear();
    }
}

impl Default for TickTiming {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_whole_steps() {
        let mut timing = TickTiming::new(20);
        assert_eq!(timing.accumulate(0.02), 0);
        assert_eq!(timing.accumulate(0.04), 1);
        assert_eq!(timing.accumulate(0.1), 2);
    }

    #[test]
    fn test_accumulate_caps_backlog() {
        let mut timing = TickTiming::new(100);
        assert_eq!(timing.accumulate(1.0), 10);
        assert_eq!(timing.accumulate(0.0), 0);
    }

    #[test]
    fn test_delta_time_is_clamped() {
        let mut timing = TickTiming::new(20);
        std::thread::sleep(Duration::from_millis(5));
        let dt = timing.delta_time();
        assert!(dt > 0.0 && dt <= 0.25);
    }

    #[test]
    fn test_tick_cost_stats() {
        let mut timing = TickTiming::new(20);
        timing.record_tick_cost(Duration::from_millis(2));
        timing.record_tick_cost(Duration::from_millis(4));
        assert!((timing.average_tick_ms() - 3.0).abs() < 0.01);
        assert!((timing.worst_tick_ms() - 4.0).abs() < 0.01);
        assert!((timing.budget_usage() - 0.06).abs() < 0.001);

        timing.reset();
        assert!(timing.average_tick_ms().abs() < f32::EPSILON);
    }

    #[test]
    fn test_period_matches_rate() {
        let timing = TickTiming::new(50);
        assert_eq!(timing.period(), Duration::from_millis(20));
    }
}

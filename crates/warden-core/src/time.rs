//! Simulation time for the Warden engine
//!
//! Every delay in the engine (fetch delays, door clearance, dwell times,
//! search polling) is a timestamp compared against this clock. Nothing blocks.

use serde::{Deserialize, Serialize};

/// Configuration for simulation time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// How many simulated seconds pass per real second
    pub time_scale: f32,
    /// Maximum delta time accepted in one tick, to prevent huge catch-up steps
    pub max_delta_time: f32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_delta_time: 0.25,
        }
    }
}

/// Simulation clock shared by every state machine in one tick
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Configuration
    pub config: TimeConfig,
    /// Time since simulation start in seconds
    pub total_time: f64,
    /// Delta time for this tick (clamped and scaled)
    pub delta_time: f32,
    /// Tick counter
    pub tick_count: u64,
    /// Whether the simulation is paused
    pub paused: bool,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            config: TimeConfig::default(),
            total_time: 0.0,
            delta_time: 0.0,
            tick_count: 0,
            paused: false,
        }
    }
}

impl SimClock {
    /// Create a new clock with custom config
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Advance the clock by the raw delta of the previous frame
    pub fn advance(&mut self, raw_delta: f32) {
        self.tick_count += 1;

        if self.paused {
            self.delta_time = 0.0;
            return;
        }

        let clamped = raw_delta.max(0.0).min(self.config.max_delta_time);
        self.delta_time = clamped * self.config.time_scale;
        self.total_time += self.delta_time as f64;
    }

    /// Current simulation time in seconds
    pub fn now(&self) -> f64 {
        self.total_time
    }

    /// Seconds elapsed since `since`
    pub fn elapsed_since(&self, since: f64) -> f64 {
        self.total_time - since
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Set the time scale (0.0 = frozen, 1.0 = normal, 2.0 = double speed)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.config.time_scale = scale.max(0.0);
    }
}

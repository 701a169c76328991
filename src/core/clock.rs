//! Module implementing the simulation clock.

use serde::{Deserialize, Serialize};

/// Tracks the number of elapsed steps at a fixed resolution.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationClock {
    step: u64,
    resolution: f64,
}

impl SimulationClock {
    pub fn new(resolution: f64) -> Self {
        SimulationClock {
            step: 0,
            resolution,
        }
    }

    /// Returns the number of elapsed steps.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Returns the step size.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Returns the current time.
    pub fn time(&self) -> f64 {
        self.time_at(self.step)
    }

    /// Returns the time at the end of the given number of steps.
    pub fn time_at(&self, step: u64) -> f64 {
        step as f64 * self.resolution
    }

    /// Move the clock one step forward.
    pub fn advance(&mut self) {
        self.step += 1;
    }

    /// Rewind the clock to time zero.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

//! Module implementing the simulation settings.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::RateError;
use crate::utils::steps_from_duration;
use crate::{DEFAULT_MAX_ITERATIONS, DEFAULT_RESOLUTION, DEFAULT_TOLERANCE};

/// Settings of a simulation, fixed when the context is created.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The simulation step size.
    pub resolution: f64,
    /// The minimum delay of the network, i.e., the length of a stepping interval.
    /// If not set, the smallest delay of the delayed connections is used.
    pub min_delay: Option<f64>,
    /// The tolerance of the waveform relaxation.
    pub tolerance: f64,
    /// The maximum number of relaxation iterations per step.
    pub max_iterations: usize,
    /// The seed of the noise generators.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            resolution: DEFAULT_RESOLUTION,
            min_delay: None,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Create a configuration with the specified resolution and default settings otherwise.
    /// The function returns an error for invalid settings.
    pub fn build(resolution: f64) -> Result<Self, RateError> {
        let config = SimulationConfig {
            resolution,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_min_delay(mut self, min_delay: f64) -> Self {
        self.min_delay = Some(min_delay);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the settings, returning an error for the first invalid one.
    pub fn validate(&self) -> Result<(), RateError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(RateError::InvalidParameter(format!(
                "Resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(RateError::InvalidParameter(format!(
                "Relaxation tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(RateError::InvalidParameter(
                "At least one relaxation iteration is required".to_string(),
            ));
        }
        if let Some(min_delay) = self.min_delay {
            if steps_from_duration(min_delay, self.resolution)? == 0 {
                return Err(RateError::InvalidDelay(
                    "The minimum delay must be at least one step".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Save the configuration to a JSON file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), RateError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a configuration from a JSON file, filling missing fields with defaults.
    /// The function returns an error if the file cannot be read or the settings are invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, RateError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: SimulationConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

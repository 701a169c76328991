//! Module implementing the concept of connections in a network.
//!
//! Instantaneous and delayed connections are distinct types, kept in separate collections
//! by the [`InputTable`] of each target unit.

use serde::{Deserialize, Serialize};

use super::delay_line::DelayLine;
use super::unit::{RateUnit, UnitId};
use crate::error::RateError;
use crate::utils::steps_from_duration;

/// The transmission model of a connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionModel {
    /// Zero delay, the contribution takes part in the fixed point of the current step.
    Instantaneous,
    /// Positive delay, the contribution is read from a history buffer.
    Delayed,
}

/// The parameters of a connection between two units.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub source: UnitId,
    pub target: UnitId,
    pub weight: f64,
    /// The delay in time units (zero for instantaneous connections).
    #[serde(default)]
    pub delay: f64,
    pub model: ConnectionModel,
}

impl ConnectionParams {
    /// Parameters of an instantaneous connection.
    pub fn instantaneous(source: UnitId, target: UnitId, weight: f64) -> Self {
        ConnectionParams {
            source,
            target,
            weight,
            delay: 0.0,
            model: ConnectionModel::Instantaneous,
        }
    }

    /// Parameters of a delayed connection.
    pub fn delayed(source: UnitId, target: UnitId, weight: f64, delay: f64) -> Self {
        ConnectionParams {
            source,
            target,
            weight,
            delay,
            model: ConnectionModel::Delayed,
        }
    }
}

/// A connection without propagation delay.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InstantaneousConnection {
    source: UnitId,
    target: UnitId,
    weight: f64,
}

impl InstantaneousConnection {
    /// Create a new instantaneous connection.
    /// Returns an error if the weight is not finite.
    pub fn build(source: UnitId, target: UnitId, weight: f64) -> Result<Self, RateError> {
        if !weight.is_finite() {
            return Err(RateError::InvalidParameter(
                "Connection weight must be finite".to_string(),
            ));
        }
        Ok(InstantaneousConnection {
            source,
            target,
            weight,
        })
    }

    pub fn source(&self) -> UnitId {
        self.source
    }

    pub fn target(&self) -> UnitId {
        self.target
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// The contribution to the target given the current candidate rate of the source.
    #[inline]
    pub fn contribution(&self, target: &RateUnit, source_rate: f64) -> f64 {
        target.input_contribution(source_rate, self.weight)
    }
}

/// A connection with a positive propagation delay.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DelayedConnection {
    source: UnitId,
    target: UnitId,
    weight: f64,
    delay: f64,
    delay_line: DelayLine,
}

impl DelayedConnection {
    /// Create a new delayed connection.
    /// Returns an error if the delay is not a positive multiple of the resolution, or is shorter than the minimum delay.
    pub fn build(
        source: UnitId,
        target: UnitId,
        weight: f64,
        delay: f64,
        resolution: f64,
        min_delay: Option<f64>,
    ) -> Result<Self, RateError> {
        if !weight.is_finite() {
            return Err(RateError::InvalidParameter(
                "Connection weight must be finite".to_string(),
            ));
        }

        let delay_steps = steps_from_duration(delay, resolution)?;
        if delay_steps == 0 {
            return Err(RateError::InvalidDelay(
                "A delayed connection requires a delay of at least one step".to_string(),
            ));
        }
        if let Some(min_delay) = min_delay {
            if delay_steps < steps_from_duration(min_delay, resolution)? {
                return Err(RateError::InvalidDelay(format!(
                    "{} is shorter than the minimum delay {}",
                    delay, min_delay
                )));
            }
        }

        Ok(DelayedConnection {
            source,
            target,
            weight,
            delay,
            delay_line: DelayLine::new(delay_steps),
        })
    }

    pub fn source(&self) -> UnitId {
        self.source
    }

    pub fn target(&self) -> UnitId {
        self.target
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the delay in time units.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    /// Returns the delay line of the connection.
    pub fn delay_line(&self) -> &DelayLine {
        &self.delay_line
    }

    /// Push the committed source rate into the delay line and return the contribution due at the current step.
    /// The returned value stays fixed over all relaxation iterations of the step.
    #[inline]
    pub fn contribution(&mut self, target: &RateUnit, source_rate: f64) -> f64 {
        self.delay_line
            .advance(target.input_contribution(source_rate, self.weight))
    }

    /// Forget the history of the connection.
    pub fn clear(&mut self) {
        self.delay_line.clear();
    }
}

/// The incoming connections of a unit, grouped by transmission model.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct InputTable {
    instantaneous: Vec<InstantaneousConnection>,
    delayed: Vec<DelayedConnection>,
}

impl InputTable {
    pub fn instantaneous(&self) -> &[InstantaneousConnection] {
        &self.instantaneous
    }

    pub fn delayed(&self) -> &[DelayedConnection] {
        &self.delayed
    }

    pub fn num_connections(&self) -> usize {
        self.instantaneous.len() + self.delayed.len()
    }

    pub fn add_instantaneous(&mut self, connection: InstantaneousConnection) {
        self.instantaneous.push(connection);
    }

    pub fn add_delayed(&mut self, connection: DelayedConnection) {
        self.delayed.push(connection);
    }

    /// Advance all delayed connections by one step and return their summed contribution.
    pub fn advance_delayed(&mut self, target: &RateUnit, rates: &[f64]) -> f64 {
        self.delayed
            .iter_mut()
            .map(|connection| connection.contribution(target, rates[connection.source.0]))
            .sum()
    }

    /// The summed contribution of all instantaneous connections given the candidate rates.
    #[inline]
    pub fn instantaneous_drive(&self, target: &RateUnit, candidates: &[f64]) -> f64 {
        self.instantaneous
            .iter()
            .map(|connection| connection.contribution(target, candidates[connection.source.0]))
            .sum()
    }

    /// Forget the history of all delayed connections.
    pub fn clear(&mut self) {
        self.delayed.iter_mut().for_each(|connection| connection.clear());
    }
}

//! Module implementing the rate units.
//!
//! A rate unit evolves its activity according to
//!
//! ```text
//! tau * dX/dt = -lambda * X + mean + phi(input) + noise
//! ```
//!
//! where `phi` is the unit's transfer function with gain applied to the summed input (linear summation),
//! or the sum of the transfer function applied to each input separately (nonlinear summation).
//! The equation is integrated with an explicit Euler scheme.

use derivative::Derivative;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::transfer::TransferFunction;
use crate::error::RateError;

/// An opaque handle to a unit within a simulation context.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub(crate) usize);

impl UnitId {
    /// Returns the position of the unit in the unit table.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The parameters of a rate unit.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitParams {
    /// The nonlinearity of the unit.
    pub transfer: TransferFunction,
    /// The time constant (must be positive).
    pub tau: f64,
    /// The passive decay rate (must be non-negative).
    pub lambda: f64,
    /// The gain of the nonlinearity.
    pub gain: f64,
    /// Apply the nonlinearity to the summed input (true) or to each input separately (false).
    pub linear_summation: bool,
    /// The rate of the unit at creation and after reset.
    pub initial_rate: f64,
    /// The constant drive (mean of the input noise).
    pub mean: f64,
    /// The standard deviation of the input noise (must be non-negative).
    pub std: f64,
    /// Clip the rate at zero after each step.
    pub rectify_output: bool,
}

impl Default for UnitParams {
    fn default() -> Self {
        UnitParams {
            transfer: TransferFunction::Identity,
            tau: 10.0,
            lambda: 1.0,
            gain: 1.0,
            linear_summation: true,
            initial_rate: 0.0,
            mean: 0.0,
            std: 0.0,
            rectify_output: false,
        }
    }
}

impl UnitParams {
    /// Default parameters with the specified transfer function.
    pub fn new(transfer: TransferFunction) -> Self {
        UnitParams {
            transfer,
            ..Default::default()
        }
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_linear_summation(mut self, linear_summation: bool) -> Self {
        self.linear_summation = linear_summation;
        self
    }

    pub fn with_initial_rate(mut self, initial_rate: f64) -> Self {
        self.initial_rate = initial_rate;
        self
    }

    pub fn with_noise(mut self, mean: f64, std: f64) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_rectify_output(mut self, rectify_output: bool) -> Self {
        self.rectify_output = rectify_output;
        self
    }

    /// Check the parameters, returning an error for the first invalid one.
    pub fn validate(&self) -> Result<(), RateError> {
        if !(self.tau.is_finite() && self.tau > 0.0) {
            return Err(RateError::InvalidParameter(format!(
                "Time constant must be positive, got {}",
                self.tau
            )));
        }
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(RateError::InvalidParameter(format!(
                "Passive decay rate must be non-negative, got {}",
                self.lambda
            )));
        }
        if !(self.std.is_finite() && self.std >= 0.0) {
            return Err(RateError::InvalidParameter(format!(
                "Noise standard deviation must be non-negative, got {}",
                self.std
            )));
        }
        if !(self.gain.is_finite() && self.initial_rate.is_finite() && self.mean.is_finite()) {
            return Err(RateError::InvalidParameter(
                "Gain, initial rate and mean must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Represents a rate unit.
#[derive(Derivative, Clone)]
#[derivative(Debug, PartialEq)]
pub struct RateUnit {
    id: UnitId,
    params: UnitParams,
    /// The committed rate.
    rate: f64,
    /// The aggregated input of the current iteration.
    drive: f64,
    /// The noise term of the current step.
    noise: f64,
    #[derivative(Debug = "ignore", PartialEq = "ignore")]
    rng: Option<ChaCha8Rng>,
}

impl RateUnit {
    /// Create a new unit with the specified parameters.
    /// The noise generator, if any, is seeded from the seed and the unit id.
    /// Returns an error if the parameters are invalid.
    pub fn build(id: UnitId, params: UnitParams, seed: u64) -> Result<Self, RateError> {
        params.validate()?;
        let rng = Self::init_rng(id, &params, seed);
        Ok(RateUnit {
            id,
            rate: params.initial_rate,
            params,
            drive: 0.0,
            noise: 0.0,
            rng,
        })
    }

    fn init_rng(id: UnitId, params: &UnitParams, seed: u64) -> Option<ChaCha8Rng> {
        if params.std > 0.0 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(id.0 as u64);
            Some(rng)
        } else {
            None
        }
    }

    /// Returns the unit ID.
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Returns the committed rate of the unit.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the parameters of the unit.
    pub fn params(&self) -> &UnitParams {
        &self.params
    }

    /// Returns the input recorded for the current iteration.
    pub fn drive(&self) -> f64 {
        self.drive
    }

    /// Returns the noise term of the current step.
    pub fn noise(&self) -> f64 {
        self.noise
    }

    /// Record the aggregated input of the current iteration.
    pub fn drive_input(&mut self, total_input: f64) {
        self.drive = total_input;
    }

    /// The contribution of a source rate through a connection of the given weight.
    /// In nonlinear summation mode, the unit's nonlinearity is applied to each input separately.
    #[inline]
    pub fn input_contribution(&self, source_rate: f64, weight: f64) -> f64 {
        if self.params.linear_summation {
            weight * source_rate
        } else {
            weight * self.params.transfer.apply_with_gain(self.params.gain, source_rate)
        }
    }

    /// Draw the noise term for the coming step.
    /// It is drawn once per step and shared by all relaxation iterations of the step.
    pub fn sample_noise(&mut self, dt: f64) {
        self.noise = match self.rng.as_mut() {
            Some(rng) => {
                let xi: f64 = rng.sample(StandardNormal);
                self.params.std * (dt / self.params.tau).sqrt() * xi
            }
            None => 0.0,
        };
    }

    /// Returns the candidate rate after one Euler step of size dt with the given total input.
    /// The committed rate is left unchanged.
    #[inline]
    pub fn step(&self, dt: f64, total_input: f64) -> f64 {
        let phi = if self.params.linear_summation {
            self.params.transfer.apply_with_gain(self.params.gain, total_input)
        } else {
            total_input
        };
        self.rate
            + dt / self.params.tau * (-self.params.lambda * self.rate + self.params.mean + phi)
            + self.noise
    }

    /// Commit a new rate, clipping it at zero if the output is rectified.
    pub fn commit(&mut self, new_rate: f64) {
        self.rate = if self.params.rectify_output {
            new_rate.max(0.0)
        } else {
            new_rate
        };
    }

    /// Reset the unit to its initial state.
    pub fn reset(&mut self, seed: u64) {
        self.rate = self.params.initial_rate;
        self.drive = 0.0;
        self.noise = 0.0;
        self.rng = Self::init_rng(self.id, &self.params, seed);
    }
}

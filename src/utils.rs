//! Utility functions for time discretization.
use crate::error::RateError;
use crate::TIME_RESOLUTION;

/// Convert a non-negative duration into a whole number of simulation steps.
/// Returns an error if the duration is negative, non-finite, or not a multiple of the resolution.
pub fn steps_from_duration(duration: f64, resolution: f64) -> Result<usize, RateError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(RateError::InvalidDelay(format!(
            "{} must be finite and non-negative",
            duration
        )));
    }

    let ratio = duration / resolution;
    let steps = ratio.round();
    if (ratio - steps).abs() > TIME_RESOLUTION * steps.max(1.0) {
        return Err(RateError::InvalidDelay(format!(
            "{} is not a multiple of the resolution {}",
            duration, resolution
        )));
    }

    Ok(steps as usize)
}

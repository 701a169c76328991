//! Module implementing the transfer functions of rate units.

use serde::{Deserialize, Serialize};

/// The nonlinearity applied by a rate unit to its input.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFunction {
    /// f(x) = x
    #[default]
    Identity,
    /// f(x) = tanh(x)
    Tanh,
    /// f(x) = max(x, 0)
    ThresholdLinear,
}

impl TransferFunction {
    /// Evaluate the transfer function at x.
    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            TransferFunction::Identity => x,
            TransferFunction::Tanh => x.tanh(),
            TransferFunction::ThresholdLinear => x.max(0.0),
        }
    }

    /// Evaluate the transfer function with the gain applied to its argument, i.e., f(g * x).
    #[inline]
    pub fn apply_with_gain(&self, gain: f64, x: f64) -> f64 {
        self.apply(gain * x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        assert_eq!(TransferFunction::Identity.apply(-2.5), -2.5);
        assert_eq!(TransferFunction::Identity.apply_with_gain(2.0, 0.75), 1.5);
    }

    #[test]
    fn test_tanh() {
        assert_eq!(TransferFunction::Tanh.apply(0.0), 0.0);
        assert_eq!(TransferFunction::Tanh.apply(1.5), 1.5_f64.tanh());
        assert_eq!(TransferFunction::Tanh.apply_with_gain(2.0, 1.5), 3.0_f64.tanh());
    }

    #[test]
    fn test_threshold_linear() {
        assert_eq!(TransferFunction::ThresholdLinear.apply(-1.0), 0.0);
        assert_eq!(TransferFunction::ThresholdLinear.apply(0.0), 0.0);
        assert_eq!(TransferFunction::ThresholdLinear.apply(0.75), 0.75);
        assert_eq!(TransferFunction::ThresholdLinear.apply_with_gain(2.0, -0.5), 0.0);
    }

    #[test]
    fn test_serde_names() {
        let f: TransferFunction = serde_json::from_str("\"threshold_linear\"").unwrap();
        assert_eq!(f, TransferFunction::ThresholdLinear);
        assert_eq!(serde_json::to_string(&TransferFunction::Tanh).unwrap(), "\"tanh\"");
    }
}

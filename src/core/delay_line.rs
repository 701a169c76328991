//! Module implementing the ring buffer carrying delayed contributions.

use serde::{Deserialize, Serialize};

use crate::QUIESCENT_SIGNAL;

/// A fixed-length history of weighted contributions, indexed by the delay in steps.
///
/// At step `k`, the value written `delay` steps earlier sits in the slot following the write slot,
/// so reads and writes of the same step never alias.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DelayLine {
    buffer: Vec<f64>,
    head: usize,
    advances: u64,
}

impl DelayLine {
    /// Create a delay line for a delay of `delay_steps` steps (must be positive).
    /// All slots hold the quiescent signal until overwritten.
    pub fn new(delay_steps: usize) -> Self {
        debug_assert!(delay_steps > 0, "A delay line needs a positive delay");
        DelayLine {
            buffer: vec![QUIESCENT_SIGNAL; delay_steps + 1],
            head: 0,
            advances: 0,
        }
    }

    /// Returns the delay in steps.
    pub fn delay_steps(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Returns the value written `delay_steps` steps ago, or the quiescent signal during start-up.
    pub fn read(&self) -> f64 {
        self.buffer[(self.head + 1) % self.buffer.len()]
    }

    /// Write the contribution of the current step and return the one written `delay_steps` steps ago.
    /// Must be called exactly once per simulation step.
    pub fn advance(&mut self, value: f64) -> f64 {
        let delayed = self.read();
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % self.buffer.len();
        self.advances += 1;
        delayed
    }

    /// Returns the number of times the line was advanced since creation or the last clear.
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Fill the line with the quiescent signal and rewind it.
    pub fn clear(&mut self) {
        self.buffer.fill(QUIESCENT_SIGNAL);
        self.head = 0;
        self.advances = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_line_length() {
        let line = DelayLine::new(20);
        assert_eq!(line.buffer.len(), 21);
        assert_eq!(line.delay_steps(), 20);
    }

    #[test]
    fn test_delay_line_startup() {
        let mut line = DelayLine::new(3);
        assert_eq!(line.advance(1.0), QUIESCENT_SIGNAL);
        assert_eq!(line.advance(2.0), QUIESCENT_SIGNAL);
        assert_eq!(line.advance(3.0), QUIESCENT_SIGNAL);
        assert_eq!(line.advance(4.0), 1.0);
        assert_eq!(line.advance(5.0), 2.0);
        assert_eq!(line.read(), 3.0);
    }

    #[test]
    fn test_delay_line_one_step() {
        let mut line = DelayLine::new(1);
        assert_eq!(line.advance(1.0), QUIESCENT_SIGNAL);
        for k in 2..10 {
            assert_eq!(line.advance(k as f64), (k - 1) as f64);
        }
        assert_eq!(line.advances(), 9);
    }

    #[test]
    fn test_delay_line_never_reallocates() {
        let mut line = DelayLine::new(4);
        let capacity = line.buffer.capacity();
        for k in 0..100 {
            line.advance(k as f64);
        }
        assert_eq!(line.buffer.len(), 5);
        assert_eq!(line.buffer.capacity(), capacity);
    }

    #[test]
    fn test_delay_line_clear() {
        let mut line = DelayLine::new(2);
        line.advance(1.0);
        line.advance(2.0);
        line.clear();
        assert_eq!(line.advances(), 0);
        assert_eq!(line.advance(3.0), QUIESCENT_SIGNAL);
        assert_eq!(line.advance(4.0), QUIESCENT_SIGNAL);
        assert_eq!(line.advance(5.0), 3.0);
    }
}

//! Error module for the Rusty Rate library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq)]
pub enum RateError {
    /// Error for invalid parameters, e.g., non-positive time constant or negative noise.
    InvalidParameter(String),
    /// Error for invalid delays, e.g., negative or not a multiple of the resolution.
    InvalidDelay(String),
    /// Error for unit not found in the context.
    UnitNotFound(usize),
    /// Error for invalid operation, e.g., changing the topology after the simulation started.
    InvalidOperation(String),
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RateError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            RateError::InvalidDelay(e) => write!(f, "Invalid delay: {}", e),
            RateError::UnitNotFound(id) => write!(f, "Unit {} not found", id),
            RateError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            RateError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for RateError {}

impl From<std::io::Error> for RateError {
    fn from(e: std::io::Error) -> Self {
        RateError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for RateError {
    fn from(e: serde_json::Error) -> Self {
        RateError::IOError(e.to_string())
    }
}

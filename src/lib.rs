//! This crate provides tools for simulating networks of rate units in Rust.
//!
//! A rate unit holds a continuous activity driven by weighted inputs from other units.
//! Connections are either delayed, reading their contribution from a history buffer,
//! or instantaneous, in which case the units they couple are resolved jointly within each step
//! by waveform relaxation.
//!
//! # Creating Networks
//!
//! ```rust
//! use rusty_rate::core::config::SimulationConfig;
//! use rusty_rate::core::connection::ConnectionParams;
//! use rusty_rate::core::context::SimulationContext;
//! use rusty_rate::core::transfer::TransferFunction;
//! use rusty_rate::core::unit::UnitParams;
//!
//! let config = SimulationConfig::build(0.1).unwrap();
//! let mut ctx = SimulationContext::new(config).unwrap();
//!
//! let drive = ctx.create_unit(UnitParams::default().with_initial_rate(1.5).with_noise(1.5, 0.0)).unwrap();
//! let unit = ctx.create_unit(UnitParams::new(TransferFunction::ThresholdLinear).with_tau(5.0)).unwrap();
//! ctx.connect(ConnectionParams::delayed(drive, unit, 0.5, 2.0)).unwrap();
//!
//! assert_eq!(ctx.num_units(), 2);
//! assert_eq!(ctx.num_connections(), 1);
//! ```
//!
//! # Simulating Networks
//!
//! ```rust
//! use rusty_rate::core::config::SimulationConfig;
//! use rusty_rate::core::connection::ConnectionParams;
//! use rusty_rate::core::context::SimulationContext;
//! use rusty_rate::core::recorder::Multimeter;
//! use rusty_rate::core::unit::UnitParams;
//!
//! let mut ctx = SimulationContext::new(SimulationConfig::build(0.1).unwrap()).unwrap();
//! let a = ctx.create_unit(UnitParams::default().with_noise(1.0, 0.0)).unwrap();
//! let b = ctx.create_unit(UnitParams::default()).unwrap();
//!
//! // Mutual instantaneous coupling, resolved within each step
//! ctx.connect(ConnectionParams::instantaneous(a, b, 0.5)).unwrap();
//! ctx.connect(ConnectionParams::instantaneous(b, a, 0.5)).unwrap();
//!
//! let mut multimeter = Multimeter::build(10).unwrap();
//! let report = ctx.simulate(10.0, &mut multimeter).unwrap();
//!
//! assert!(report.converged());
//! assert_eq!(multimeter.num_records(), 10);
//! ```

pub mod core;
pub mod error;
pub mod utils;

/// The relative tolerance for a duration to be considered a multiple of the resolution.
pub const TIME_RESOLUTION: f64 = 1e-9;
/// The contribution of a delayed connection before any signal reached its end.
pub const QUIESCENT_SIGNAL: f64 = 0.0;
/// The default simulation step size.
pub const DEFAULT_RESOLUTION: f64 = 0.1;
/// The default tolerance of the waveform relaxation.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
/// The default maximum number of relaxation iterations per step.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

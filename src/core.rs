//! Core module defining the main components of the Rusty Rate library.
//!
//! This module provides the building blocks for simulating networks of rate units.
//! It consists of the following components:
//!
//! - [`transfer`]: Nonlinearities of the units
//! - [`unit`]: Implements individual unit dynamics
//! - [`delay_line`]: Ring buffers carrying delayed contributions
//! - [`connection`]: Defines instantaneous and delayed connections between units
//! - [`solver`]: Waveform relaxation over instantaneous connections
//! - [`recorder`]: Exposes the unit rates after each step
//! - [`context`]: Owns the clock, units and connections of a simulation
//!
//! # Examples
//!
//! ```
//! use rusty_rate::core::config::SimulationConfig;
//! use rusty_rate::core::connection::ConnectionParams;
//! use rusty_rate::core::context::SimulationContext;
//! use rusty_rate::core::transfer::TransferFunction;
//! use rusty_rate::core::unit::UnitParams;
//!
//! let mut ctx = SimulationContext::new(SimulationConfig::build(0.1).unwrap()).unwrap();
//!
//! // A constant source driving a tanh unit without delay
//! let source = ctx.create_unit(UnitParams::default().with_initial_rate(1.0).with_noise(1.0, 0.0)).unwrap();
//! let target = ctx.create_unit(UnitParams::new(TransferFunction::Tanh).with_tau(1.0)).unwrap();
//! ctx.connect(ConnectionParams::instantaneous(source, target, 0.5)).unwrap();
//!
//! let report = ctx.simulate(20.0, &mut ()).unwrap();
//! assert!(report.converged());
//! assert!((ctx.rate(target).unwrap() - 0.5_f64.tanh()).abs() < 1e-6);
//! ```
pub mod clock;
pub mod config;
pub mod connection;
pub mod context;
pub mod delay_line;
pub mod recorder;
pub mod solver;
pub mod transfer;
pub mod unit;

/// Minimum number of units to gather the delayed inputs in parallel.
pub const MIN_PARALLEL_UNITS: usize = 100;

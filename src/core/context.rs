//! The simulation context owning the clock, the units and the connections.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::clock::SimulationClock;
use super::config::SimulationConfig;
use super::connection::{
    ConnectionModel, ConnectionParams, DelayedConnection, InputTable, InstantaneousConnection,
};
use super::recorder::{RecorderPort, Sample};
use super::solver::{SolverState, StepReport, WaveformRelaxationSolver};
use super::unit::{RateUnit, UnitId, UnitParams};
use crate::error::RateError;
use crate::utils::steps_from_duration;

/// A step that committed its last iterate without reaching the relaxation tolerance.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct ConvergenceFailure {
    /// The number of elapsed steps before the failing one.
    pub step: u64,
    /// The time at the end of the failing step.
    pub time: f64,
    pub iterations: usize,
    pub residual: f64,
}

/// Summary of a simulation run.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// The number of steps performed.
    pub steps: u64,
    /// The total number of relaxation iterations over all steps.
    pub iterations: u64,
    /// The largest number of relaxation iterations in a single step.
    pub max_step_iterations: usize,
    /// The steps that did not reach the relaxation tolerance.
    pub convergence_failures: Vec<ConvergenceFailure>,
    /// Whether the run was stopped through an abort handle.
    pub aborted: bool,
}

impl RunReport {
    /// Returns true if every step reached the relaxation tolerance.
    pub fn converged(&self) -> bool {
        self.convergence_failures.is_empty()
    }

    fn add_step(&mut self, report: &StepReport) {
        self.steps += 1;
        self.iterations += report.iterations as u64;
        self.max_step_iterations = self.max_step_iterations.max(report.iterations);
    }
}

/// A handle to stop a running simulation between two steps.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Request the simulation to stop before its next step.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Owns the complete state of a simulation.
#[derive(Debug)]
pub struct SimulationContext {
    config: SimulationConfig,
    clock: SimulationClock,
    units: Vec<RateUnit>,
    /// `inputs[i]` holds the incoming connections of unit i.
    inputs: Vec<InputTable>,
    solver: WaveformRelaxationSolver,
    abort: Arc<AtomicBool>,
}

impl SimulationContext {
    /// Create an empty context with the specified configuration.
    /// The function returns an error for an invalid configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, RateError> {
        config.validate()?;
        Ok(SimulationContext {
            clock: SimulationClock::new(config.resolution),
            solver: WaveformRelaxationSolver::new(config.tolerance, config.max_iterations),
            config,
            units: vec![],
            inputs: vec![],
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    /// Returns the state reached by the solver in the last step.
    pub fn solver_state(&self) -> SolverState {
        self.solver.state()
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn num_connections(&self) -> usize {
        self.inputs.iter().map(|table| table.num_connections()).sum()
    }

    /// Returns a reference to a unit, if any.
    pub fn unit(&self, id: UnitId) -> Option<&RateUnit> {
        self.units.get(id.index())
    }

    pub fn units(&self) -> &[RateUnit] {
        &self.units
    }

    /// Returns the committed rate of a unit.
    pub fn rate(&self, id: UnitId) -> Result<f64, RateError> {
        self.unit(id)
            .map(|unit| unit.rate())
            .ok_or(RateError::UnitNotFound(id.index()))
    }

    /// Returns the incoming connections of a unit.
    pub fn inputs(&self, id: UnitId) -> Result<&InputTable, RateError> {
        self.inputs
            .get(id.index())
            .ok_or(RateError::UnitNotFound(id.index()))
    }

    /// An iterator over all instantaneous connections.
    pub fn instantaneous_connections(&self) -> impl Iterator<Item = &InstantaneousConnection> + '_ {
        self.inputs.iter().flat_map(|table| table.instantaneous().iter())
    }

    /// An iterator over all delayed connections.
    pub fn delayed_connections(&self) -> impl Iterator<Item = &DelayedConnection> + '_ {
        self.inputs.iter().flat_map(|table| table.delayed().iter())
    }

    /// Returns true if some instantaneous connections form a cycle.
    pub fn has_instantaneous_cycles(&self) -> bool {
        !self.solver.feedback_units(&self.inputs).is_empty()
    }

    /// Returns a handle to abort a run from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::clone(&self.abort))
    }

    fn check_construction(&self) -> Result<(), RateError> {
        if self.clock.step() > 0 {
            return Err(RateError::InvalidOperation(
                "The network cannot be modified once the simulation started".to_string(),
            ));
        }
        Ok(())
    }

    /// Add a unit to the network.
    /// The function returns an error if the parameters are invalid or the simulation already started.
    pub fn create_unit(&mut self, params: UnitParams) -> Result<UnitId, RateError> {
        self.check_construction()?;
        let id = UnitId(self.units.len());
        let unit = RateUnit::build(id, params, self.config.seed)?;
        self.units.push(unit);
        self.inputs.push(InputTable::default());
        self.solver.invalidate();
        log::debug!("Unit {} created", id);
        Ok(id)
    }

    /// Add a connection to the network.
    /// The function returns an error if an endpoint is missing, the delay does not fit the model and resolution,
    /// or the simulation already started.
    pub fn connect(&mut self, params: ConnectionParams) -> Result<(), RateError> {
        self.check_construction()?;
        for id in [params.source, params.target] {
            if self.unit(id).is_none() {
                return Err(RateError::UnitNotFound(id.index()));
            }
        }

        let table = &mut self.inputs[params.target.index()];
        match params.model {
            ConnectionModel::Instantaneous => {
                if params.delay != 0.0 {
                    return Err(RateError::InvalidDelay(format!(
                        "An instantaneous connection has no delay, got {}",
                        params.delay
                    )));
                }
                table.add_instantaneous(InstantaneousConnection::build(
                    params.source,
                    params.target,
                    params.weight,
                )?);
            }
            ConnectionModel::Delayed => {
                table.add_delayed(DelayedConnection::build(
                    params.source,
                    params.target,
                    params.weight,
                    params.delay,
                    self.config.resolution,
                    self.config.min_delay,
                )?);
            }
        }
        self.solver.invalidate();
        Ok(())
    }

    /// Returns the length of a stepping interval in steps: the configured minimum delay if any,
    /// otherwise the smallest delay of the delayed connections, or a single step without them.
    pub fn min_delay_steps(&self) -> usize {
        match self.config.min_delay {
            Some(min_delay) => steps_from_duration(min_delay, self.config.resolution).unwrap_or(1),
            None => self
                .delayed_connections()
                .map(|connection| connection.delay_line().delay_steps())
                .min()
                .unwrap_or(1),
        }
    }

    /// The rates of all units at the current time.
    /// Repeated calls without stepping return identical samples.
    pub fn samples(&self) -> Vec<Sample> {
        let time = self.clock.time();
        self.units
            .iter()
            .map(|unit| Sample {
                time,
                unit: unit.id(),
                rate: unit.rate(),
            })
            .collect()
    }

    /// Run the simulation for the specified number of minimum-delay intervals.
    /// The function returns an error if the number of steps does not fit in a `usize`.
    pub fn advance<R: RecorderPort + ?Sized>(
        &mut self,
        num_intervals: usize,
        recorder: &mut R,
    ) -> Result<RunReport, RateError> {
        let num_steps = num_intervals.checked_mul(self.min_delay_steps()).ok_or_else(|| {
            RateError::InvalidParameter(format!("Too many intervals to advance: {}", num_intervals))
        })?;
        Ok(self.run_steps(num_steps, recorder))
    }

    /// Run the simulation for the specified duration, which must be a multiple of the resolution.
    pub fn simulate<R: RecorderPort + ?Sized>(
        &mut self,
        duration: f64,
        recorder: &mut R,
    ) -> Result<RunReport, RateError> {
        let num_steps = steps_from_duration(duration, self.config.resolution)
            .map_err(|e| RateError::InvalidParameter(format!("Invalid simulation duration: {}", e)))?;
        Ok(self.run_steps(num_steps, recorder))
    }

    /// Run the simulation for the specified number of steps, handing the rates to the recorder after each step.
    /// Convergence failures do not stop the run; they are logged and collected in the report.
    pub fn run_steps<R: RecorderPort + ?Sized>(&mut self, num_steps: usize, recorder: &mut R) -> RunReport {
        log::info!(
            "Starting simulation of {} steps at t = {} ({} units, {} connections)...",
            num_steps,
            self.clock.time(),
            self.num_units(),
            self.num_connections()
        );

        let mut report = RunReport::default();
        let log_interval = (num_steps / 10).max(1);

        for k in 0..num_steps {
            if self.abort.swap(false, Ordering::SeqCst) {
                log::info!("Simulation aborted at t = {}", self.clock.time());
                report.aborted = true;
                break;
            }

            let step_report = self.solver.solve_step(
                &mut self.units,
                &mut self.inputs,
                self.config.resolution,
                self.clock.step(),
            );
            self.clock.advance();
            report.add_step(&step_report);

            if !step_report.converged {
                log::warn!(
                    "Waveform relaxation did not converge at t = {} after {} iterations (residual {:e})",
                    self.clock.time(),
                    step_report.iterations,
                    step_report.residual
                );
                report.convergence_failures.push(ConvergenceFailure {
                    step: step_report.step,
                    time: self.clock.time(),
                    iterations: step_report.iterations,
                    residual: step_report.residual,
                });
            }

            recorder.record(self.clock.step(), &self.samples());

            if (k + 1) % log_interval == 0 {
                log::debug!(
                    "Simulation progress: {:.0}% (t = {:.3})",
                    (k + 1) as f64 / num_steps as f64 * 100.0,
                    self.clock.time()
                );
            }
        }

        log::info!(
            "Simulation completed at t = {} ({} steps, {} iterations, {} convergence failures)",
            self.clock.time(),
            report.steps,
            report.iterations,
            report.convergence_failures.len()
        );
        report
    }

    /// Bring the simulation back to time zero: initial rates, empty delay lines, reseeded noise.
    pub fn reset(&mut self) {
        let seed = self.config.seed;
        self.units.iter_mut().for_each(|unit| unit.reset(seed));
        self.inputs.iter_mut().for_each(|table| table.clear());
        self.clock.reset();
        self.solver.reset();
        self.abort.store(false, Ordering::SeqCst);
        log::debug!("Simulation context reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transfer::TransferFunction;

    fn context() -> SimulationContext {
        SimulationContext::new(SimulationConfig::build(0.1).unwrap()).unwrap()
    }

    #[test]
    fn test_create_unit() {
        let mut ctx = context();
        let a = ctx.create_unit(UnitParams::default()).unwrap();
        let b = ctx.create_unit(UnitParams::new(TransferFunction::Tanh)).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(ctx.num_units(), 2);
        assert!(matches!(
            ctx.create_unit(UnitParams::default().with_tau(0.0)),
            Err(RateError::InvalidParameter(_))
        ));
        assert_eq!(ctx.num_units(), 2);
    }

    #[test]
    fn test_connect_invalid() {
        let mut ctx = context();
        let a = ctx.create_unit(UnitParams::default()).unwrap();
        assert_eq!(
            ctx.connect(ConnectionParams::instantaneous(a, UnitId(7), 1.0)),
            Err(RateError::UnitNotFound(7))
        );
        assert!(matches!(
            ctx.connect(ConnectionParams {
                delay: 1.0,
                ..ConnectionParams::instantaneous(a, a, 1.0)
            }),
            Err(RateError::InvalidDelay(_))
        ));
        assert!(matches!(
            ctx.connect(ConnectionParams::delayed(a, a, 1.0, 0.0)),
            Err(RateError::InvalidDelay(_))
        ));
        assert!(matches!(
            ctx.connect(ConnectionParams::delayed(a, a, 1.0, -0.1)),
            Err(RateError::InvalidDelay(_))
        ));
        assert!(matches!(
            ctx.connect(ConnectionParams::delayed(a, a, 1.0, 0.25)),
            Err(RateError::InvalidDelay(_))
        ));
        assert_eq!(ctx.num_connections(), 0);
    }

    #[test]
    fn test_no_construction_after_start() {
        let mut ctx = context();
        let a = ctx.create_unit(UnitParams::default()).unwrap();
        ctx.run_steps(1, &mut ());
        assert!(matches!(
            ctx.create_unit(UnitParams::default()),
            Err(RateError::InvalidOperation(_))
        ));
        assert!(matches!(
            ctx.connect(ConnectionParams::instantaneous(a, a, 1.0)),
            Err(RateError::InvalidOperation(_))
        ));
        ctx.reset();
        assert!(ctx.connect(ConnectionParams::instantaneous(a, a, 1.0)).is_ok());
    }

    #[test]
    fn test_min_delay_steps() {
        let mut ctx = context();
        let a = ctx.create_unit(UnitParams::default()).unwrap();
        assert_eq!(ctx.min_delay_steps(), 1);
        ctx.connect(ConnectionParams::delayed(a, a, 1.0, 1.0)).unwrap();
        ctx.connect(ConnectionParams::delayed(a, a, 1.0, 0.5)).unwrap();
        ctx.connect(ConnectionParams::instantaneous(a, a, 1.0)).unwrap();
        assert_eq!(ctx.min_delay_steps(), 5);

        let config = SimulationConfig::build(0.1).unwrap().with_min_delay(0.3);
        let mut ctx = SimulationContext::new(config).unwrap();
        let a = ctx.create_unit(UnitParams::default()).unwrap();
        assert_eq!(ctx.min_delay_steps(), 3);
        assert!(matches!(
            ctx.connect(ConnectionParams::delayed(a, a, 1.0, 0.2)),
            Err(RateError::InvalidDelay(_))
        ));
    }

    #[test]
    fn test_advance_runs_whole_intervals() {
        let config = SimulationConfig::build(0.1).unwrap().with_min_delay(0.5);
        let mut ctx = SimulationContext::new(config).unwrap();
        ctx.create_unit(UnitParams::default()).unwrap();
        let report = ctx.advance(3, &mut ()).unwrap();
        assert_eq!(report.steps, 15);
        assert_eq!(ctx.clock().step(), 15);
    }

    #[test]
    fn test_advance_too_many_intervals() {
        let config = SimulationConfig::build(0.1).unwrap().with_min_delay(0.5);
        let mut ctx = SimulationContext::new(config).unwrap();
        ctx.create_unit(UnitParams::default()).unwrap();
        assert!(matches!(
            ctx.advance(usize::MAX, &mut ()),
            Err(RateError::InvalidParameter(_))
        ));
        assert_eq!(ctx.clock().step(), 0);
    }

    #[test]
    fn test_simulate_invalid_duration() {
        let mut ctx = context();
        assert!(matches!(
            ctx.simulate(0.05, &mut ()),
            Err(RateError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_abort() {
        let mut ctx = context();
        ctx.create_unit(UnitParams::default()).unwrap();
        let handle = ctx.abort_handle();
        handle.abort();
        let report = ctx.run_steps(10, &mut ());
        assert!(report.aborted);
        assert_eq!(report.steps, 0);

        // the request is consumed
        let report = ctx.run_steps(10, &mut ());
        assert!(!report.aborted);
        assert_eq!(report.steps, 10);
    }

    #[test]
    fn test_has_instantaneous_cycles() {
        let mut ctx = context();
        let a = ctx.create_unit(UnitParams::default()).unwrap();
        let b = ctx.create_unit(UnitParams::default()).unwrap();
        ctx.connect(ConnectionParams::instantaneous(a, b, 1.0)).unwrap();
        ctx.connect(ConnectionParams::delayed(b, a, 1.0, 0.1)).unwrap();
        assert!(!ctx.has_instantaneous_cycles());
        ctx.connect(ConnectionParams::instantaneous(b, a, 1.0)).unwrap();
        let view: &SimulationContext = &ctx;
        assert!(view.has_instantaneous_cycles());
        ctx.run_steps(1, &mut ());
        assert!(ctx.has_instantaneous_cycles());
    }
}

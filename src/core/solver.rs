//! Waveform relaxation solver resolving instantaneous coupling within a step.
//!
//! Each step proceeds as follows:
//! 1. every delayed connection is advanced exactly once, giving a delayed drive per unit that stays fixed over the step;
//! 2. the units are swept repeatedly, each unit combining its delayed drive with the instantaneous contributions
//!    computed from the newest candidate rates of its sources;
//! 3. the sweeps stop when the candidates are self-consistent or the iteration cap is reached, and the last candidates are committed.
//!
//! Units are swept in topological order of the instantaneous subgraph, with units on instantaneous cycles last.
//! A sweep can only be inconsistent through a unit read before it was updated in the same sweep (a feedback source),
//! so the residual is the largest change of a feedback source over the sweep.
//! Without instantaneous cycles there are no feedback sources and the first sweep is exact.

use itertools::izip;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::connection::InputTable;
use super::unit::RateUnit;
use super::MIN_PARALLEL_UNITS;

/// The state of the solver within a step.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum SolverState {
    /// No step in progress.
    Idle,
    /// Sweeping the units.
    Iterating { iteration: usize },
    /// The last step reached the tolerance.
    Converged { iterations: usize },
    /// The last step hit the iteration cap; its last iterate was committed anyway.
    MaxIterationsReached { iterations: usize, residual: f64 },
}

/// The outcome of a single step.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct StepReport {
    /// The number of elapsed steps before this one.
    pub step: u64,
    /// The number of sweeps performed.
    pub iterations: usize,
    /// The residual of the last sweep.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// The order in which units are swept, derived from the instantaneous topology.
#[derive(Debug, PartialEq, Clone)]
struct SweepPlan {
    order: Vec<usize>,
    feedback: Vec<usize>,
}

impl SweepPlan {
    /// Kahn's algorithm over the instantaneous connections; units left over (on or downstream of a cycle)
    /// are appended in id order.
    fn new(inputs: &[InputTable]) -> Self {
        let num_units = inputs.len();
        let mut in_degree = vec![0_usize; num_units];
        let mut targets: Vec<Vec<usize>> = vec![vec![]; num_units];
        for (target, table) in inputs.iter().enumerate() {
            for connection in table.instantaneous() {
                in_degree[target] += 1;
                targets[connection.source().index()].push(target);
            }
        }

        let mut order = Vec::with_capacity(num_units);
        let mut queue: VecDeque<usize> = (0..num_units).filter(|&id| in_degree[id] == 0).collect();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &target in targets[id].iter() {
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    queue.push_back(target);
                }
            }
        }
        order.extend((0..num_units).filter(|&id| in_degree[id] > 0));

        let mut position = vec![0_usize; num_units];
        for (pos, &id) in order.iter().enumerate() {
            position[id] = pos;
        }

        let mut is_feedback = vec![false; num_units];
        for (target, table) in inputs.iter().enumerate() {
            for connection in table.instantaneous() {
                let source = connection.source().index();
                if position[source] >= position[target] {
                    is_feedback[source] = true;
                }
            }
        }
        let feedback = (0..num_units).filter(|&id| is_feedback[id]).collect();

        SweepPlan { order, feedback }
    }
}

/// The largest absolute change over the specified units; NaN wins over any number.
fn max_change(ids: impl Iterator<Item = usize>, candidates: &[f64], previous: &[f64]) -> f64 {
    ids.map(|id| (candidates[id] - previous[id]).abs())
        .fold(0.0, |acc, diff| if diff > acc || diff.is_nan() { diff } else { acc })
}

/// Fixed-point solver for one simulation step.
#[derive(Debug, Clone)]
pub struct WaveformRelaxationSolver {
    tolerance: f64,
    max_iterations: usize,
    state: SolverState,
    plan: Option<SweepPlan>,
    rates: Vec<f64>,
    candidates: Vec<f64>,
    previous: Vec<f64>,
    delayed_drive: Vec<f64>,
}

impl WaveformRelaxationSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        WaveformRelaxationSolver {
            tolerance,
            max_iterations,
            state: SolverState::Idle,
            plan: None,
            rates: vec![],
            candidates: vec![],
            previous: vec![],
            delayed_drive: vec![],
        }
    }

    /// Returns the state reached by the last step.
    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns the ids of the units whose rate can invalidate a sweep.
    /// The cached sweep plan is used if any, otherwise a plan is computed from the inputs.
    pub fn feedback_units(&self, inputs: &[InputTable]) -> Vec<usize> {
        match &self.plan {
            Some(plan) => plan.feedback.clone(),
            None => SweepPlan::new(inputs).feedback,
        }
    }

    /// Drop the sweep plan; must be called whenever the topology changes.
    pub fn invalidate(&mut self) {
        self.plan = None;
        self.state = SolverState::Idle;
    }

    /// Return to the idle state, keeping the sweep plan.
    pub fn reset(&mut self) {
        self.state = SolverState::Idle;
    }

    /// Advance all units by one step of size dt and commit their new rates.
    /// `inputs[i]` holds the incoming connections of `units[i]`.
    pub fn solve_step(
        &mut self,
        units: &mut [RateUnit],
        inputs: &mut [InputTable],
        dt: f64,
        step: u64,
    ) -> StepReport {
        debug_assert_eq!(units.len(), inputs.len());
        let num_units = units.len();
        let plan = self
            .plan
            .take()
            .unwrap_or_else(|| SweepPlan::new(inputs));

        self.rates.clear();
        self.rates.extend(units.iter().map(|unit| unit.rate()));
        self.candidates.clear();
        self.candidates.extend_from_slice(&self.rates);
        self.previous.resize(num_units, 0.0);
        self.delayed_drive.resize(num_units, 0.0);

        units.iter_mut().for_each(|unit| unit.sample_noise(dt));
        self.gather_delayed(units, inputs);

        let Self {
            tolerance,
            max_iterations,
            state,
            candidates,
            previous,
            delayed_drive,
            ..
        } = &mut *self;

        let mut iterations = 0;
        let mut residual = f64::INFINITY;
        while iterations < *max_iterations {
            iterations += 1;
            *state = SolverState::Iterating {
                iteration: iterations,
            };
            previous.copy_from_slice(&candidates[..]);

            for &id in plan.order.iter() {
                let unit = &mut units[id];
                let total = delayed_drive[id] + inputs[id].instantaneous_drive(unit, &candidates[..]);
                unit.drive_input(total);
                candidates[id] = unit.step(dt, total);
            }

            // after the first sweep, every unit already saw the latest candidates of the units swept
            // before it, so only the feedback units can invalidate the iterate
            residual = if iterations == 1 {
                max_change(plan.feedback.iter().copied(), &candidates[..], &previous[..])
            } else {
                max_change(0..num_units, &candidates[..], &previous[..])
            };
            log::trace!(
                "Step {}, iteration {}: residual {:e}",
                step,
                iterations,
                residual
            );

            if residual < *tolerance {
                break;
            }
        }

        let converged = residual < *tolerance;
        *state = if converged {
            SolverState::Converged { iterations }
        } else {
            SolverState::MaxIterationsReached {
                iterations,
                residual,
            }
        };

        for (unit, &candidate) in units.iter_mut().zip(candidates.iter()) {
            unit.commit(candidate);
        }
        self.plan = Some(plan);

        StepReport {
            step,
            iterations,
            residual,
            converged,
        }
    }

    /// Advance every delayed connection once, using the committed rates of the sources.
    fn gather_delayed(&mut self, units: &[RateUnit], inputs: &mut [InputTable]) {
        let rates = &self.rates;
        if units.len() >= MIN_PARALLEL_UNITS {
            inputs
                .par_iter_mut()
                .zip(units.par_iter())
                .zip(self.delayed_drive.par_iter_mut())
                .for_each(|((table, unit), drive)| *drive = table.advance_delayed(unit, rates));
        } else {
            for (table, unit, drive) in izip!(inputs.iter_mut(), units.iter(), self.delayed_drive.iter_mut()) {
                *drive = table.advance_delayed(unit, rates);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::core::connection::{DelayedConnection, InstantaneousConnection};
    use crate::core::unit::{UnitId, UnitParams};

    fn units(params: &[UnitParams]) -> Vec<RateUnit> {
        params
            .iter()
            .enumerate()
            .map(|(id, params)| RateUnit::build(UnitId(id), params.clone(), 0).unwrap())
            .collect()
    }

    fn connect(inputs: &mut [InputTable], source: usize, target: usize, weight: f64) {
        inputs[target]
            .add_instantaneous(InstantaneousConnection::build(UnitId(source), UnitId(target), weight).unwrap());
    }

    #[test]
    fn test_sweep_plan_chain() {
        // 2 -> 0 -> 1
        let mut inputs = vec![InputTable::default(); 3];
        connect(&mut inputs, 2, 0, 1.0);
        connect(&mut inputs, 0, 1, 1.0);
        let plan = SweepPlan::new(&inputs);
        assert_eq!(plan.order, vec![2, 0, 1]);
        assert!(plan.feedback.is_empty());
    }

    #[test]
    fn test_sweep_plan_cycle() {
        // 0 -> 1 <-> 2, 3 -> 3
        let mut inputs = vec![InputTable::default(); 4];
        connect(&mut inputs, 0, 1, 1.0);
        connect(&mut inputs, 1, 2, 1.0);
        connect(&mut inputs, 2, 1, 1.0);
        connect(&mut inputs, 3, 3, 1.0);
        let plan = SweepPlan::new(&inputs);
        assert_eq!(plan.order, vec![0, 1, 2, 3]);
        assert_eq!(plan.feedback, vec![2, 3]);
    }

    #[test]
    fn test_sweep_plan_ignores_delayed() {
        let mut inputs = vec![InputTable::default(); 2];
        connect(&mut inputs, 0, 1, 1.0);
        inputs[0].add_delayed(DelayedConnection::build(UnitId(1), UnitId(0), 1.0, 1.0, 1.0, None).unwrap());
        let plan = SweepPlan::new(&inputs);
        assert_eq!(plan.order, vec![0, 1]);
        assert!(plan.feedback.is_empty());
    }

    #[test]
    fn test_solve_step_chain_single_iteration() {
        let params = UnitParams::default().with_tau(1.0);
        let mut units = units(&[
            params.clone().with_initial_rate(1.0).with_noise(1.0, 0.0),
            params.clone(),
            params,
        ]);
        let mut inputs = vec![InputTable::default(); 3];
        connect(&mut inputs, 0, 1, 2.0);
        connect(&mut inputs, 1, 2, 3.0);

        let mut solver = WaveformRelaxationSolver::new(1e-12, 10);
        let report = solver.solve_step(&mut units, &mut inputs, 0.5, 0);
        assert_eq!(report.iterations, 1);
        assert!(report.converged);
        assert_eq!(solver.state(), SolverState::Converged { iterations: 1 });

        // unit 1 sees the candidate of unit 0, unit 2 the candidate of unit 1
        assert_relative_eq!(units[0].rate(), 1.0);
        assert_relative_eq!(units[1].rate(), 0.5 * 2.0);
        assert_relative_eq!(units[2].rate(), 0.5 * 3.0 * 1.0);
    }

    #[test]
    fn test_solve_step_cycle_fixed_point() {
        // x0 = 0.5 * x1 + 1, x1 = 0.5 * x0, with dt = tau so that a step solves the fixed point directly
        let params = UnitParams::default().with_tau(1.0);
        let mut units = units(&[params.clone().with_noise(1.0, 0.0), params]);
        let mut inputs = vec![InputTable::default(); 2];
        connect(&mut inputs, 1, 0, 0.5);
        connect(&mut inputs, 0, 1, 0.5);

        let mut solver = WaveformRelaxationSolver::new(1e-12, 100);
        let report = solver.solve_step(&mut units, &mut inputs, 1.0, 0);
        assert!(report.converged);
        assert!(report.iterations > 1);
        assert_relative_eq!(units[0].rate(), 4.0 / 3.0, epsilon = 1e-10);
        assert_relative_eq!(units[1].rate(), 2.0 / 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_solve_step_downstream_of_cycle_reaches_fixed_point() {
        // x0 = 1 + 0.5 * x1, x1 = 0.5 * x0, x2 = 1e4 * x1
        let params = UnitParams::default().with_tau(1.0);
        let mut units = units(&[params.clone().with_noise(1.0, 0.0), params.clone(), params]);
        let mut inputs = vec![InputTable::default(); 3];
        connect(&mut inputs, 0, 1, 0.5);
        connect(&mut inputs, 1, 0, 0.5);
        connect(&mut inputs, 1, 2, 1e4);

        let mut solver = WaveformRelaxationSolver::new(1e-4, 15);
        assert_eq!(solver.feedback_units(&inputs), vec![1]);
        let report = solver.solve_step(&mut units, &mut inputs, 1.0, 0);
        assert!(report.converged);
        // the change of x1 halves twice per sweep and x2 amplifies it by 1e4
        assert_eq!(report.iterations, 14);
        assert!(report.residual < 1e-4);
        assert_relative_eq!(units[1].rate(), 2.0 / 3.0, epsilon = 1e-8);
        assert_relative_eq!(units[2].rate(), 2e4 / 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_solve_step_divergent_cycle_hits_cap() {
        // x = 1 - 2 * x has no attracting fixed point under iteration
        let params = UnitParams::default().with_tau(1.0).with_noise(1.0, 0.0);
        let mut units = units(&[params]);
        let mut inputs = vec![InputTable::default(); 1];
        connect(&mut inputs, 0, 0, -2.0);

        let mut solver = WaveformRelaxationSolver::new(1e-4, 5);
        let report = solver.solve_step(&mut units, &mut inputs, 1.0, 0);
        assert!(!report.converged);
        assert_eq!(report.iterations, 5);
        // iterates: 1, -1, 3, -5, 11
        assert_eq!(units[0].rate(), 11.0);
        assert_eq!(report.residual, 16.0);
        assert_eq!(
            solver.state(),
            SolverState::MaxIterationsReached {
                iterations: 5,
                residual: 16.0
            }
        );
    }

    #[test]
    fn test_delayed_lines_advance_once_per_step() {
        let params = UnitParams::default().with_tau(1.0);
        let mut units = units(&[params.clone().with_noise(1.0, 0.0), params]);
        let mut inputs = vec![InputTable::default(); 2];
        connect(&mut inputs, 1, 0, 0.5);
        connect(&mut inputs, 0, 1, 0.5);
        inputs[1].add_delayed(DelayedConnection::build(UnitId(0), UnitId(1), 1.0, 2.0, 1.0, None).unwrap());

        let mut solver = WaveformRelaxationSolver::new(1e-12, 100);
        let mut total_iterations = 0;
        for step in 0..7 {
            total_iterations += solver.solve_step(&mut units, &mut inputs, 0.1, step).iterations;
        }
        assert!(total_iterations > 7);
        assert_eq!(inputs[1].delayed()[0].delay_line().advances(), 7);
    }
}

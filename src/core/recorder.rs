//! Module implementing the recording boundary of a simulation.
//!
//! After each committed step, the context hands a [`Sample`] per unit to a [`RecorderPort`].
//! Recorders only ever see copies of the unit states.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::unit::UnitId;
use crate::error::RateError;

/// The rate of a unit at a given time.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub unit: UnitId,
    pub rate: f64,
}

/// Receives the unit rates after every committed step.
pub trait RecorderPort {
    /// Called once per committed step, with `step` the number of elapsed steps.
    fn record(&mut self, step: u64, samples: &[Sample]);
}

/// Discards everything.
impl RecorderPort for () {
    fn record(&mut self, _step: u64, _samples: &[Sample]) {}
}

/// Keeps everything.
impl RecorderPort for Vec<Sample> {
    fn record(&mut self, _step: u64, samples: &[Sample]) {
        self.extend_from_slice(samples);
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
struct Record {
    step: u64,
    samples: Vec<Sample>,
}

/// A recorder sampling the rates of (a subset of) the units at a fixed interval.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Multimeter {
    interval: u64,
    units: Option<Vec<UnitId>>,
    records: Vec<Record>,
}

impl Multimeter {
    /// Create a multimeter recording all units every `interval` steps.
    /// Returns an error if the interval is zero.
    pub fn build(interval: u64) -> Result<Self, RateError> {
        if interval == 0 {
            return Err(RateError::InvalidParameter(
                "Recording interval must be at least one step".to_string(),
            ));
        }
        Ok(Multimeter {
            interval,
            units: None,
            records: vec![],
        })
    }

    /// Restrict the recording to the specified units.
    pub fn record_from(mut self, units: &[UnitId]) -> Self {
        let mut units = units.to_vec();
        units.sort();
        units.dedup();
        self.units = Some(units);
        self
    }

    /// Returns the recording interval in steps.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Returns the number of recorded steps.
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Returns all samples in recording order.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.records.iter().flat_map(|record| record.samples.iter())
    }

    /// Returns the samples recorded after the given step, if it was sampled.
    pub fn samples_at_step(&self, step: u64) -> Option<&[Sample]> {
        self.records
            .binary_search_by_key(&step, |record| record.step)
            .ok()
            .map(|pos| &self.records[pos].samples[..])
    }

    /// Returns the samples of a specific unit in recording order.
    pub fn events(&self, unit: UnitId) -> Vec<Sample> {
        self.samples()
            .filter(|sample| sample.unit == unit)
            .copied()
            .collect()
    }

    /// Returns the recorded rates of a specific unit in recording order.
    pub fn rates(&self, unit: UnitId) -> Vec<f64> {
        self.samples()
            .filter(|sample| sample.unit == unit)
            .map(|sample| sample.rate)
            .collect()
    }

    /// Drop all recorded samples.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Save the recorded samples to a JSON file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), RateError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let samples: Vec<&Sample> = self.samples().collect();
        serde_json::to_writer_pretty(&mut writer, &samples)?;
        writer.flush()?;
        Ok(())
    }
}

impl RecorderPort for Multimeter {
    fn record(&mut self, step: u64, samples: &[Sample]) {
        if step % self.interval != 0 {
            return;
        }
        let samples = match &self.units {
            Some(units) => samples
                .iter()
                .filter(|sample| units.binary_search(&sample.unit).is_ok())
                .copied()
                .collect(),
            None => samples.to_vec(),
        };
        self.records.push(Record { step, samples });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(step: u64) -> Vec<Sample> {
        (0..3)
            .map(|id| Sample {
                time: step as f64 * 0.1,
                unit: UnitId(id),
                rate: (step * 10 + id as u64) as f64,
            })
            .collect()
    }

    #[test]
    fn test_multimeter_interval() {
        let mut multimeter = Multimeter::build(2).unwrap();
        for step in 1..=6 {
            multimeter.record(step, &samples(step));
        }
        assert_eq!(multimeter.num_records(), 3);
        assert!(multimeter.samples_at_step(3).is_none());
        assert_eq!(multimeter.rates(UnitId(1)), vec![21.0, 41.0, 61.0]);
    }

    #[test]
    fn test_multimeter_record_from() {
        let mut multimeter = Multimeter::build(1).unwrap().record_from(&[UnitId(2), UnitId(0)]);
        multimeter.record(1, &samples(1));
        assert_eq!(multimeter.samples().count(), 2);
        assert!(multimeter.events(UnitId(1)).is_empty());
        assert_eq!(multimeter.events(UnitId(2))[0].rate, 12.0);
    }

    #[test]
    fn test_multimeter_queries_are_idempotent() {
        let mut multimeter = Multimeter::build(1).unwrap();
        for step in 1..=4 {
            multimeter.record(step, &samples(step));
        }
        let first = multimeter.samples_at_step(2).unwrap().to_vec();
        let second = multimeter.samples_at_step(2).unwrap().to_vec();
        assert_eq!(first, second);
        assert_eq!(first, samples(2));
    }

    #[test]
    fn test_multimeter_invalid_interval() {
        assert!(matches!(Multimeter::build(0), Err(RateError::InvalidParameter(_))));
    }

    #[test]
    fn test_vec_recorder() {
        let mut recorder: Vec<Sample> = vec![];
        recorder.record(1, &samples(1));
        recorder.record(2, &samples(2));
        assert_eq!(recorder.len(), 6);
    }

    #[test]
    fn test_multimeter_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        let mut multimeter = Multimeter::build(1).unwrap();
        multimeter.record(1, &samples(1));
        multimeter.save_to(&path).unwrap();

        let loaded: Vec<Sample> = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(loaded, samples(1));
    }
}

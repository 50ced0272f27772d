#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use dagplan::{Scope, Unit, VarSet};

/// Something a fake unit observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ran { unit: String, iteration: String },
    Invalidated { unit: String, inputs: VarSet },
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// A unit that records what happens to it instead of doing work.
#[derive(Debug)]
pub struct RecordingUnit {
    name: String,
    workers: usize,
    /// Outputs reported as invalid whenever any input is invalidated.
    outputs: VarSet,
    failing: bool,
    active: bool,
    log: EventLog,
}

impl RecordingUnit {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            workers: 1,
            outputs: VarSet::All,
            failing: false,
            active: true,
            log: EventLog::default(),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn invalidates(mut self, outputs: VarSet) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn record(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }
}

impl Unit for RecordingUnit {
    fn run(&mut self, iteration: &str) -> anyhow::Result<()> {
        self.record(Event::Ran {
            unit: self.name.clone(),
            iteration: iteration.to_string(),
        });
        if self.failing {
            bail!("{} failed on purpose", self.name);
        }
        Ok(())
    }

    fn required_workers(&self) -> usize {
        self.workers
    }

    fn invalidate(&mut self, inputs: &VarSet) -> VarSet {
        self.record(Event::Invalidated {
            unit: self.name.clone(),
            inputs: inputs.clone(),
        });
        self.outputs.clone()
    }

    fn is_locally_active(&self) -> bool {
        self.active
    }
}

/// A scope of recording units sharing one event log.
#[derive(Debug, Default)]
pub struct FakeScope {
    units: BTreeMap<String, RecordingUnit>,
    iteration_sets: BTreeMap<String, Vec<String>>,
    stop_after_runs: Option<usize>,
    log: EventLog,
}

impl FakeScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain single-worker units.
    pub fn with_units(names: &[&str]) -> Self {
        names
            .iter()
            .fold(Self::new(), |scope, name| scope.with(RecordingUnit::new(name)))
    }

    pub fn with(mut self, mut unit: RecordingUnit) -> Self {
        unit.log = Arc::clone(&self.log);
        self.units.insert(unit.name.clone(), unit);
        self
    }

    pub fn iterates(mut self, driver: &str, members: &[&str]) -> Self {
        self.iteration_sets.insert(
            driver.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    /// Request a stop once this many unit runs have been recorded.
    pub fn stop_after_runs(mut self, runs: usize) -> Self {
        self.stop_after_runs = Some(runs);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    /// `(unit, iteration)` for every recorded run, in order.
    pub fn runs(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Ran { unit, iteration } => Some((unit, iteration)),
                Event::Invalidated { .. } => None,
            })
            .collect()
    }

    pub fn ran_units(&self) -> Vec<String> {
        self.runs().into_iter().map(|(unit, _)| unit).collect()
    }

    /// `(unit, inputs)` for every recorded invalidation, in order.
    pub fn invalidations(&self) -> Vec<(String, VarSet)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Invalidated { unit, inputs } => Some((unit, inputs)),
                Event::Ran { .. } => None,
            })
            .collect()
    }
}

impl Scope for FakeScope {
    fn unit(&self, name: &str) -> Option<&dyn Unit> {
        let unit: &dyn Unit = self.units.get(name)?;
        Some(unit)
    }

    fn unit_mut(&mut self, name: &str) -> Option<&mut dyn Unit> {
        let unit: &mut dyn Unit = self.units.get_mut(name)?;
        Some(unit)
    }

    fn iteration_set(&self, name: &str) -> Vec<String> {
        self.iteration_sets.get(name).cloned().unwrap_or_default()
    }

    fn stop_requested(&self) -> bool {
        self.stop_after_runs
            .is_some_and(|limit| self.runs().len() >= limit)
    }
}

// src/scope.rs

//! The contract between the planner and the units it schedules.
//!
//! Units are opaque: the planner only knows their names, how many worker
//! processes they want, and that they can be run and invalidated. A
//! [`Scope`] resolves names to units for both graph queries (invalidation)
//! and plan execution.

use std::collections::BTreeSet;

/// A selection of variable names, or every variable of a unit/link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarSet {
    All,
    Only(BTreeSet<String>),
}

impl VarSet {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VarSet::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn none() -> Self {
        VarSet::Only(BTreeSet::new())
    }

    /// `true` only for an explicit empty selection; `All` is never empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, VarSet::Only(names) if names.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            VarSet::All => true,
            VarSet::Only(names) => names.contains(name),
        }
    }
}

/// A schedulable unit as seen by the planner.
pub trait Unit {
    /// Execute the unit once. `iteration` identifies the position of this
    /// execution inside the plan (e.g. `"1-0-2"`).
    fn run(&mut self, iteration: &str) -> anyhow::Result<()>;

    /// Number of worker processes this unit needs. Zero means the unit is
    /// duplicated on every process of whichever group runs it.
    fn required_workers(&self) -> usize {
        1
    }

    /// Mark the given inputs invalid and report which of this unit's own
    /// outputs became invalid as a consequence.
    fn invalidate(&mut self, inputs: &VarSet) -> VarSet;

    /// Whether the unit lives on the current process.
    fn is_locally_active(&self) -> bool {
        true
    }
}

/// Name resolver for units, owned by whoever defines the model.
pub trait Scope {
    fn unit(&self, name: &str) -> Option<&dyn Unit>;

    fn unit_mut(&mut self, name: &str) -> Option<&mut dyn Unit>;

    /// Units that `name` iterates over internally. They must be scheduled
    /// before `name`.
    fn iteration_set(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Polled by drivers between iterations.
    fn stop_requested(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_everything_and_is_never_empty() {
        assert!(VarSet::All.contains("anything"));
        assert!(!VarSet::All.is_empty());
        assert!(VarSet::none().is_empty());
    }

    #[test]
    fn only_matches_listed_names() {
        let set = VarSet::only(["a", "b"]);
        assert!(set.contains("a"));
        assert!(!set.contains("c"));
    }
}

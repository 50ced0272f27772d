// src/graph/link.rs

//! Variable-level connections between exactly two graph nodes.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{PlanError, Result};
use crate::scope::VarSet;

/// All variable connections carried by one graph edge `u -> v`.
///
/// `dests` maps every destination variable to its single source; `srcs`
/// maps every source variable to its fan-out list. The two maps are kept as
/// exact inverses of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    dests: BTreeMap<String, String>,
    srcs: BTreeMap<String, Vec<String>>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, src: &str, dest: &str) -> Result<()> {
        if let Some(existing) = self.dests.get(dest) {
            return Err(PlanError::DuplicateConnection {
                dest: dest.to_string(),
                existing: existing.clone(),
            });
        }
        self.dests.insert(dest.to_string(), src.to_string());
        self.srcs
            .entry(src.to_string())
            .or_default()
            .push(dest.to_string());
        Ok(())
    }

    pub fn disconnect(&mut self, src: &str, dest: &str) -> Result<()> {
        if self.dests.get(dest).map(String::as_str) != Some(src) {
            return Err(PlanError::NotConnected {
                src: src.to_string(),
                dest: dest.to_string(),
            });
        }
        self.dests.remove(dest);
        if let Some(fanout) = self.srcs.get_mut(src) {
            fanout.retain(|d| d != dest);
            if fanout.is_empty() {
                self.srcs.remove(src);
            }
        }
        Ok(())
    }

    /// Destination variables fed by the given sources. Sources that are not
    /// part of this link are ignored.
    pub fn destinations_for(&self, srcs: &VarSet) -> Vec<String> {
        match srcs {
            VarSet::All => self.dests.keys().cloned().collect(),
            VarSet::Only(names) => names
                .iter()
                .filter_map(|name| self.srcs.get(name))
                .flatten()
                .cloned()
                .collect(),
        }
    }

    /// Source variables feeding the given destinations. Destinations that
    /// are not part of this link are ignored.
    pub fn sources_for(&self, dests: &VarSet) -> Vec<String> {
        match dests {
            VarSet::All => self.srcs.keys().cloned().collect(),
            VarSet::Only(names) => names
                .iter()
                .filter_map(|name| self.dests.get(name))
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    pub fn source_of(&self, dest: &str) -> Option<&str> {
        self.dests.get(dest).map(String::as_str)
    }

    /// `(src_var, dest_var)` pairs, ordered by destination.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dests
            .iter()
            .map(|(dest, src)| (src.as_str(), dest.as_str()))
    }

    /// Number of connected destination variables.
    pub fn len(&self) -> usize {
        self.dests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dests.is_empty()
    }
}

// src/plan/mod.rs

//! Execution plans compiled from a [`DependencyGraph`](crate::graph::DependencyGraph).
//!
//! - [`graph`] is the node/edge structure a plan is built from.
//! - [`node`] defines plan node identities and the [`ExecNode`] tree.
//! - [`serial`] and [`parallel`] are the two composite kinds.
//! - [`compiler`] turns a dependency graph into an [`ExecNode`] tree.

use std::collections::BTreeMap;

use crate::errors::{PlanError, Result};
use crate::scope::Scope;

pub mod compiler;
pub mod graph;
pub mod node;
pub mod parallel;
pub mod serial;

pub use compiler::compile;
pub use graph::{Connections, PlanGraph};
pub use node::{ExecNode, LeafNode, NodeId, Transfer};
pub use parallel::ParallelUnit;
pub use serial::SerialUnit;

/// Cycle found while ordering the nodes of composite `id`.
pub(crate) fn cycle_error(id: &NodeId, cycle: Vec<NodeId>) -> PlanError {
    let id = id.to_string();
    PlanError::CyclicDependency {
        cycle: cycle.iter().map(NodeId::to_string).collect(),
        src: id.clone(),
        dest: id,
    }
}

/// Materialise one member of a composite: components become leaves,
/// groups are taken from the composites already built.
pub(crate) fn take_child(
    node: &NodeId,
    systems: &mut BTreeMap<NodeId, ExecNode>,
    scope: &dyn Scope,
) -> Result<ExecNode> {
    match node {
        NodeId::Leaf(name) => LeafNode::new(name, scope).map(ExecNode::Leaf),
        NodeId::Group(_) => systems
            .remove(node)
            .ok_or_else(|| PlanError::UnknownUnit(node.to_string())),
    }
}

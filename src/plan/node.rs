// src/plan/node.rs

use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::debug;

use crate::alloc::ProcessGroup;
use crate::errors::{PlanError, Result};
use crate::plan::graph::Connections;
use crate::plan::parallel::ParallelUnit;
use crate::plan::serial::SerialUnit;
use crate::scope::Scope;

/// Identity of a plan node.
///
/// A component is a `Leaf`; a collapsed group is identified by its sorted
/// members, so two groups are equal exactly when they contain the same
/// nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    Leaf(String),
    Group(Vec<NodeId>),
}

impl NodeId {
    pub fn leaf(name: impl Into<String>) -> Self {
        NodeId::Leaf(name.into())
    }

    pub fn group(members: impl IntoIterator<Item = NodeId>) -> Self {
        let mut members: Vec<NodeId> = members.into_iter().collect();
        members.sort();
        NodeId::Group(members)
    }

    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            NodeId::Leaf(name) => Some(name),
            NodeId::Group(_) => None,
        }
    }

    /// Every component name inside this id, depth first.
    pub fn leaves(&self) -> Vec<&str> {
        match self {
            NodeId::Leaf(name) => vec![name.as_str()],
            NodeId::Group(members) => members.iter().flat_map(NodeId::leaves).collect(),
        }
    }

    pub fn contains_leaf(&self, unit: &str) -> bool {
        match self {
            NodeId::Leaf(name) => name == unit,
            NodeId::Group(members) => members.iter().any(|m| m.contains_leaf(unit)),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Leaf(name) => f.write_str(name),
            NodeId::Group(members) => {
                f.write_str("(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Variables that cross the border of a composite between one of its
/// members and an outside neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: NodeId,
    pub to: NodeId,
    pub connections: Connections,
}

/// Reference to a unit resolved through the scope at run time.
#[derive(Debug)]
pub struct LeafNode {
    id: NodeId,
    required_workers: usize,
    group: Option<Arc<dyn ProcessGroup>>,
}

impl LeafNode {
    pub(crate) fn new(name: &str, scope: &dyn Scope) -> Result<Self> {
        let unit = scope
            .unit(name)
            .ok_or_else(|| PlanError::UnknownUnit(name.to_string()))?;
        Ok(Self {
            id: NodeId::leaf(name),
            required_workers: unit.required_workers(),
            group: None,
        })
    }

    pub fn name(&self) -> &str {
        self.id.as_leaf().unwrap_or_default()
    }

    fn run(&self, scope: &mut dyn Scope, iteration: &str) -> Result<()> {
        let name = self.name();
        let unit = scope
            .unit_mut(name)
            .ok_or_else(|| PlanError::UnknownUnit(name.to_string()))?;

        if !unit.is_locally_active() {
            debug!(unit = %name, iteration, "unit not active on this process; skipping");
            return Ok(());
        }

        debug!(unit = %name, iteration, "running unit");
        unit.run(iteration).map_err(|source| PlanError::UnitRun {
            unit: name.to_string(),
            iteration: iteration.to_string(),
            source,
        })
    }
}

/// A node of the compiled execution plan.
#[derive(Debug)]
pub enum ExecNode {
    Leaf(LeafNode),
    Serial(SerialUnit),
    Parallel(ParallelUnit),
}

impl ExecNode {
    pub fn id(&self) -> &NodeId {
        match self {
            ExecNode::Leaf(leaf) => &leaf.id,
            ExecNode::Serial(unit) => unit.id(),
            ExecNode::Parallel(unit) => unit.id(),
        }
    }

    pub fn name(&self) -> String {
        self.id().to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecNode::Leaf(_) => "Leaf",
            ExecNode::Serial(_) => "SerialUnit",
            ExecNode::Parallel(_) => "ParallelUnit",
        }
    }

    pub fn required_workers(&self) -> usize {
        match self {
            ExecNode::Leaf(leaf) => leaf.required_workers,
            ExecNode::Serial(unit) => unit.required_workers(),
            ExecNode::Parallel(unit) => unit.required_workers(),
        }
    }

    /// Direct children in execution order (empty for leaves).
    pub fn children(&self) -> &[ExecNode] {
        match self {
            ExecNode::Leaf(_) => &[],
            ExecNode::Serial(unit) => unit.children(),
            ExecNode::Parallel(unit) => unit.children(),
        }
    }

    /// Children that run on this process.
    pub fn local_children(&self) -> Vec<&ExecNode> {
        match self {
            ExecNode::Leaf(_) => Vec::new(),
            ExecNode::Serial(unit) => unit.children().iter().collect(),
            ExecNode::Parallel(unit) => unit.local_children(),
        }
    }

    pub fn transfers(&self) -> &[Transfer] {
        match self {
            ExecNode::Leaf(_) => &[],
            ExecNode::Serial(unit) => unit.transfers(),
            ExecNode::Parallel(unit) => unit.transfers(),
        }
    }

    /// The process group this node was set up with.
    pub fn group(&self) -> Option<&Arc<dyn ProcessGroup>> {
        match self {
            ExecNode::Leaf(leaf) => leaf.group.as_ref(),
            ExecNode::Serial(unit) => unit.group(),
            ExecNode::Parallel(unit) => unit.group(),
        }
    }

    pub fn group_size(&self) -> Option<usize> {
        self.group().map(|g| g.size())
    }

    /// Component names in the order a single process would run them.
    pub fn leaf_names(&self) -> Vec<&str> {
        match self {
            ExecNode::Leaf(leaf) => vec![leaf.name()],
            _ => self.children().iter().flat_map(ExecNode::leaf_names).collect(),
        }
    }

    /// Assign process groups top-down. Collective: every rank of `group`
    /// must call this on the same plan.
    pub fn setup(&mut self, group: Arc<dyn ProcessGroup>, scope: &dyn Scope) -> Result<()> {
        match self {
            ExecNode::Leaf(leaf) => {
                leaf.group = Some(group);
                Ok(())
            }
            ExecNode::Serial(unit) => unit.setup(group, scope),
            ExecNode::Parallel(unit) => unit.setup(group, scope),
        }
    }

    pub fn run(&self, scope: &mut dyn Scope, iteration: &str) -> Result<()> {
        match self {
            ExecNode::Leaf(leaf) => leaf.run(scope, iteration),
            ExecNode::Serial(unit) => unit.run(scope, iteration),
            ExecNode::Parallel(unit) => unit.run(scope, iteration),
        }
    }

    /// Indented text rendering of the part of the plan that runs on this
    /// process.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(0, &mut out);
        out
    }

    fn dump_into(&self, nest: usize, out: &mut String) {
        let indent = " ".repeat(nest);
        if let ExecNode::Leaf(leaf) = self {
            let _ = writeln!(out, "{indent}{}", leaf.name());
            return;
        }

        let local = self.local_children();
        if local.is_empty() {
            return;
        }

        let rank = self
            .group()
            .map(|g| g.rank().to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{indent}{} [{}](req={})(rank={rank})",
            self.id(),
            self.kind(),
            self.required_workers()
        );
        for child in local {
            child.dump_into(nest + 3, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_identity_is_structural() {
        let a = NodeId::group([NodeId::leaf("b"), NodeId::leaf("a")]);
        let b = NodeId::group([NodeId::leaf("a"), NodeId::leaf("b")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "(a, b)");
    }

    #[test]
    fn leaves_expand_nested_groups() {
        let inner = NodeId::group([NodeId::leaf("c"), NodeId::leaf("d")]);
        let outer = NodeId::group([inner, NodeId::leaf("a")]);

        assert_eq!(outer.leaves(), vec!["a", "c", "d"]);
        assert!(outer.contains_leaf("d"));
        assert!(!outer.contains_leaf("e"));
    }

    #[test]
    fn leaves_sort_before_groups() {
        let id = NodeId::group([
            NodeId::group([NodeId::leaf("a"), NodeId::leaf("b")]),
            NodeId::leaf("z"),
        ]);
        assert_eq!(id.to_string(), "(z, (a, b))");
    }
}

// src/plan/serial.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::alloc::ProcessGroup;
use crate::errors::Result;
use crate::plan::graph::PlanGraph;
use crate::plan::node::{ExecNode, NodeId, Transfer};
use crate::plan::{cycle_error, take_child};
use crate::scope::Scope;

/// Children that run one after another in dependency order.
///
/// Requires as many workers as its hungriest child, since only one child
/// runs at a time and each gets the whole group.
#[derive(Debug)]
pub struct SerialUnit {
    id: NodeId,
    graph: PlanGraph,
    children: Vec<ExecNode>,
    transfers: Vec<Transfer>,
    required_workers: usize,
    group: Option<Arc<dyn ProcessGroup>>,
}

impl SerialUnit {
    /// Order the nodes of `graph` topologically and materialise them as
    /// children. Composite members are taken out of `systems`.
    pub(crate) fn new(
        id: NodeId,
        graph: PlanGraph,
        mut systems: BTreeMap<NodeId, ExecNode>,
        transfers: Vec<Transfer>,
        scope: &dyn Scope,
    ) -> Result<Self> {
        let order = graph
            .topological_order()
            .map_err(|cycle| cycle_error(&id, cycle))?;

        let children = order
            .iter()
            .map(|node| take_child(node, &mut systems, scope))
            .collect::<Result<Vec<_>>>()?;

        let required_workers = children
            .iter()
            .map(ExecNode::required_workers)
            .max()
            .unwrap_or(0);

        Ok(Self {
            id,
            graph,
            children,
            transfers,
            required_workers,
            group: None,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn graph(&self) -> &PlanGraph {
        &self.graph
    }

    pub fn children(&self) -> &[ExecNode] {
        &self.children
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn required_workers(&self) -> usize {
        self.required_workers
    }

    pub fn group(&self) -> Option<&Arc<dyn ProcessGroup>> {
        self.group.as_ref()
    }

    pub(crate) fn setup(&mut self, group: Arc<dyn ProcessGroup>, scope: &dyn Scope) -> Result<()> {
        for child in &mut self.children {
            child.setup(Arc::clone(&group), scope)?;
        }
        self.group = Some(group);
        Ok(())
    }

    /// Run every child in order; the first failure stops the unit.
    pub(crate) fn run(&self, scope: &mut dyn Scope, iteration: &str) -> Result<()> {
        for (i, child) in self.children.iter().enumerate() {
            child.run(scope, &format!("{iteration}-{i}"))?;
        }
        Ok(())
    }
}

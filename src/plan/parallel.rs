// src/plan/parallel.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::alloc::{allocate, colors, Color, ProcessGroup};
use crate::errors::{PlanError, Result};
use crate::plan::graph::PlanGraph;
use crate::plan::node::{ExecNode, NodeId, Transfer};
use crate::plan::take_child;
use crate::scope::Scope;

/// Independent arms that may run at the same time on disjoint slices of
/// the process group.
///
/// Requires the sum of its arms' workers. Arms are ordered by id.
#[derive(Debug)]
pub struct ParallelUnit {
    id: NodeId,
    graph: PlanGraph,
    children: Vec<ExecNode>,
    transfers: Vec<Transfer>,
    required_workers: usize,
    /// Group handed to `setup`; every rank of it runs this node.
    group: Option<Arc<dyn ProcessGroup>>,
    /// This rank's slice after the split, if it owns an arm.
    local_group: Option<Arc<dyn ProcessGroup>>,
    assigned: Vec<usize>,
    /// Indices of the children this rank runs; `None` until `setup`.
    local: Option<Vec<usize>>,
}

impl ParallelUnit {
    pub(crate) fn new(
        id: NodeId,
        graph: PlanGraph,
        mut systems: BTreeMap<NodeId, ExecNode>,
        transfers: Vec<Transfer>,
        scope: &dyn Scope,
    ) -> Result<Self> {
        let arms: Vec<NodeId> = graph.nodes().cloned().collect();
        let children = arms
            .iter()
            .map(|node| take_child(node, &mut systems, scope))
            .collect::<Result<Vec<_>>>()?;

        let required_workers = children.iter().map(ExecNode::required_workers).sum();

        Ok(Self {
            id,
            graph,
            children,
            transfers,
            required_workers,
            group: None,
            local_group: None,
            assigned: Vec::new(),
            local: None,
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

    pub fn local_group(&self) -> Option<&Arc<dyn ProcessGroup>> {
        self.local_group.as_ref()
    }

    /// Processes given to each arm by the last `setup`.
    pub fn assigned(&self) -> &[usize] {
        &self.assigned
    }

    /// Before `setup` every arm counts as local.
    pub fn local_children(&self) -> Vec<&ExecNode> {
        match &self.local {
            None => self.children.iter().collect(),
            Some(local) => local.iter().map(|&i| &self.children[i]).collect(),
        }
    }

    pub(crate) fn setup(&mut self, group: Arc<dyn ProcessGroup>, scope: &dyn Scope) -> Result<()> {
        let requests: Vec<usize> = self
            .children
            .iter()
            .map(ExecNode::required_workers)
            .collect();
        let names: Vec<String> = self.children.iter().map(ExecNode::name).collect();
        let (size, rank) = (group.size(), group.rank());

        // Every arm is duplicated everywhere; the whole group runs all of them.
        if requests.iter().all(|&r| r == 0) {
            debug!(unit = %self.id, rank, "all arms request 0 processes; running every arm locally");
            for child in &mut self.children {
                child.setup(Arc::clone(&group), scope)?;
            }
            self.assigned = vec![0; requests.len()];
            self.local = Some((0..self.children.len()).collect());
            self.local_group = Some(Arc::clone(&group));
            self.group = Some(group);
            return Ok(());
        }

        let assigned = allocate(&names, &requests, size)?;
        let colors = colors(&assigned, size);
        let color = colors.get(rank).copied().ok_or_else(|| {
            PlanError::Desync(format!("rank {rank} is outside its group of size {size}"))
        })?;

        let sub = group.subgroup(&colors)?;

        info!(
            unit = %self.id,
            rank,
            size,
            requested = ?requests,
            assigned = ?assigned,
            color = ?color,
            "assigned processes to parallel arms"
        );

        let local: Vec<usize> = match (color, &sub) {
            (Color::Arm(arm), Some(_)) => (0..self.children.len())
                .filter(|&i| i == arm || requests[i] == 0)
                .collect(),
            _ => Vec::new(),
        };

        if let Some(sub) = &sub {
            for &i in &local {
                self.children[i].setup(Arc::clone(sub), scope)?;
            }
        }

        self.group = Some(group);
        self.local_group = sub;
        self.assigned = assigned;
        self.local = Some(local);
        Ok(())
    }

    /// Run the arms assigned to this rank.
    ///
    /// After `setup`, every rank of the group first takes part in the
    /// exchange for this node, even when it owns no arm. A node that was
    /// never set up runs every arm in order on the calling process.
    pub(crate) fn run(&self, scope: &mut dyn Scope, iteration: &str) -> Result<()> {
        let local: Vec<usize> = match &self.local {
            None => (0..self.children.len()).collect(),
            Some(local) => {
                if let Some(group) = &self.group {
                    group.exchange(&format!("{}@{iteration}", self.id))?;
                }
                local.clone()
            }
        };

        for i in local {
            self.children[i].run(scope, &format!("{iteration}-{i}"))?;
        }
        Ok(())
    }
}

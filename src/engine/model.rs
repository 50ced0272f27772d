// src/engine/model.rs

use std::sync::Arc;

use tracing::{debug, info};

use crate::alloc::ProcessGroup;
use crate::config::PlannerConfig;
use crate::engine::driver::run_iterations;
use crate::errors::Result;
use crate::graph::DependencyGraph;
use crate::plan::{compile, ExecNode};
use crate::scope::Scope;

/// A dependency graph together with the plan compiled from it.
///
/// Structural edits discard the plan; it is recompiled on the next
/// [`Model::plan`] or [`Model::run`]. Changing the process group keeps the
/// plan but redoes its allocation.
#[derive(Debug, Default)]
pub struct Model {
    graph: DependencyGraph,
    plan: Option<ExecNode>,
    group: Option<Arc<dyn ProcessGroup>>,
    allocated: bool,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(graph: DependencyGraph) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn add_unit(&mut self, name: &str) -> Result<()> {
        self.graph.add_unit(name)?;
        self.invalidate_plan();
        Ok(())
    }

    pub fn remove_unit(&mut self, name: &str) {
        self.graph.remove_unit(name);
        self.invalidate_plan();
    }

    pub fn connect(&mut self, src_path: &str, dest_path: &str) -> Result<()> {
        self.graph.connect(src_path, dest_path)?;
        self.invalidate_plan();
        Ok(())
    }

    pub fn disconnect(&mut self, src_path: &str, dest_path: &str) -> Result<()> {
        self.graph.disconnect(src_path, dest_path)?;
        self.invalidate_plan();
        Ok(())
    }

    /// Drop the compiled plan, e.g. after a unit's worker request or
    /// iteration set changed.
    pub fn invalidate_plan(&mut self) {
        if self.plan.take().is_some() {
            debug!("execution plan discarded");
        }
        self.allocated = false;
    }

    pub fn set_process_group(&mut self, group: Arc<dyn ProcessGroup>) {
        info!(size = group.size(), rank = group.rank(), "process group changed");
        self.group = Some(group);
        self.allocated = false;
    }

    pub fn process_group(&self) -> Option<&Arc<dyn ProcessGroup>> {
        self.group.as_ref()
    }

    /// The current plan, compiled and set up on demand.
    ///
    /// With a process group, setup is collective: every rank of the group
    /// has to call this together.
    pub fn plan(&mut self, scope: &dyn Scope) -> Result<&ExecNode> {
        self.prepared(scope).map(|plan| &*plan)
    }

    /// Run the plan once as iteration `iteration`.
    pub fn run(&mut self, scope: &mut dyn Scope, iteration: &str) -> Result<()> {
        let plan = self.prepared(&*scope)?;
        plan.run(scope, iteration)
    }

    /// Run as many iterations as `config` asks for. Returns the number of
    /// completed iterations.
    pub fn run_configured(&mut self, scope: &mut dyn Scope, config: &PlannerConfig) -> Result<usize> {
        let plan = self.prepared(&*scope)?;
        run_iterations(plan, scope, config.max_iterations(), config.iteration_base())
    }

    /// A failed compile or setup leaves the model without a plan.
    fn prepared(&mut self, scope: &dyn Scope) -> Result<&mut ExecNode> {
        let mut plan = match self.plan.take() {
            Some(plan) => plan,
            None => {
                self.allocated = false;
                compile(&self.graph, scope)?
            }
        };

        if !self.allocated {
            if let Some(group) = &self.group {
                plan.setup(Arc::clone(group), scope)?;
                self.allocated = true;
            }
        }

        Ok(self.plan.insert(plan))
    }
}

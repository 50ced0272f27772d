// src/plan/compiler.rs

//! Turn the unit-level DAG into a tree of serial and parallel composites.
//!
//! The working copy is peeled layer by layer: whenever several nodes are
//! ready at once, each of them together with its exclusive branch becomes
//! an arm of a parallel composite. Multi-node arms are collapsed into
//! serial composites first and transformed recursively.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::errors::{PlanError, Result};
use crate::graph::DependencyGraph;
use crate::plan::cycle_error;
use crate::plan::graph::{Connections, PlanGraph};
use crate::plan::node::{ExecNode, NodeId, Transfer};
use crate::plan::parallel::ParallelUnit;
use crate::plan::serial::SerialUnit;
use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Serial,
    Parallel,
}

/// Compile a dependency graph into an execution plan.
///
/// The result is always a serial unit at the top. Units are looked up in
/// `scope` for their worker requests and iteration sets.
pub fn compile(graph: &DependencyGraph, scope: &dyn Scope) -> Result<ExecNode> {
    let mut plan = PlanGraph::from_dependencies(graph);
    add_iteration_edges(&mut plan, scope)?;

    let compiler = Compiler { graph, scope };
    let mut systems = BTreeMap::new();
    compiler.transform(&mut plan, &mut systems)?;

    let id = NodeId::group(plan.nodes().cloned());
    let top = SerialUnit::new(id, plan, systems, Vec::new(), scope)?;

    info!(
        units = graph.len(),
        top_level = top.children().len(),
        required_workers = top.required_workers(),
        "compiled execution plan"
    );
    Ok(ExecNode::Serial(top))
}

/// A unit that iterates over others must run after all of them.
fn add_iteration_edges(plan: &mut PlanGraph, scope: &dyn Scope) -> Result<()> {
    let units: Vec<NodeId> = plan.nodes().cloned().collect();

    for unit in &units {
        let Some(name) = unit.as_leaf() else { continue };
        for member in scope.iteration_set(name) {
            let member = NodeId::leaf(member);
            if member == *unit || !plan.contains(&member) {
                continue;
            }

            plan.add_edge(member.clone(), unit.clone());
            if let Err(cycle) = plan.topological_order() {
                return Err(PlanError::CyclicDependency {
                    cycle: cycle.iter().map(NodeId::to_string).collect(),
                    src: member.to_string(),
                    dest: unit.to_string(),
                });
            }
            debug!(member = %member, unit = %unit, "ordered iteration set member before its driver");
        }
    }

    Ok(())
}

/// Successors of `node` reachable only through `branch`, added to it
/// recursively.
fn exclusive_branch(g: &PlanGraph, node: &NodeId, branch: &mut BTreeSet<NodeId>) {
    for succ in g.successors(node) {
        if branch.contains(succ) {
            continue;
        }
        if g.predecessors(succ).all(|p| branch.contains(p)) {
            branch.insert(succ.clone());
            exclusive_branch(g, succ, branch);
        }
    }
}

struct Compiler<'a> {
    graph: &'a DependencyGraph,
    scope: &'a dyn Scope,
}

impl Compiler<'_> {
    /// Collapse parallel sections of `g` in place. Composites created on
    /// the way are stored in `systems` under their ids.
    fn transform(&self, g: &mut PlanGraph, systems: &mut BTreeMap<NodeId, ExecNode>) -> Result<()> {
        if g.len() <= 1 {
            return Ok(());
        }

        let mut work = g.clone();
        while work.len() > 1 {
            let ready = work.sources();
            match ready.as_slice() {
                [] => {
                    let cycle = work.topological_order().err().unwrap_or_default();
                    let id = NodeId::group(work.nodes().cloned());
                    return Err(cycle_error(&id, cycle));
                }
                [single] => work.remove_node(single),
                _ => {
                    let branches: Vec<BTreeSet<NodeId>> = ready
                        .iter()
                        .map(|node| {
                            let mut branch = BTreeSet::from([node.clone()]);
                            exclusive_branch(&work, node, &mut branch);
                            branch
                        })
                        .collect();

                    let mut arms = BTreeSet::new();
                    for branch in branches {
                        work.remove_nodes(&branch);
                        if branch.len() > 1 {
                            arms.insert(self.collapse(g, systems, &branch, Kind::Serial)?);
                        } else {
                            arms.extend(branch);
                        }
                    }
                    self.collapse(g, systems, &arms, Kind::Parallel)?;
                }
            }
        }

        Ok(())
    }

    /// Replace `members` in `g` by a single composite node and build its
    /// execution node.
    fn collapse(
        &self,
        g: &mut PlanGraph,
        systems: &mut BTreeMap<NodeId, ExecNode>,
        members: &BTreeSet<NodeId>,
        kind: Kind,
    ) -> Result<NodeId> {
        let id = NodeId::group(members.iter().cloned());

        let leaves: BTreeSet<String> = members
            .iter()
            .flat_map(NodeId::leaves)
            .map(str::to_string)
            .collect();

        // Crossing variable connections, keyed by the nodes of `g` they join.
        let mut by_pair: BTreeMap<(NodeId, NodeId), Connections> = BTreeMap::new();
        for crossing in self.graph.crossing_connections(&leaves) {
            let (Some(src), Some(dest)) = (
                g.node_containing(&crossing.src_unit),
                g.node_containing(&crossing.dest_unit),
            ) else {
                continue;
            };
            by_pair
                .entry((src.clone(), dest.clone()))
                .or_default()
                .push((crossing.src, crossing.dest));
        }

        let mut outgoing: BTreeMap<NodeId, Connections> = BTreeMap::new();
        let mut incoming: BTreeMap<NodeId, Connections> = BTreeMap::new();
        for member in members {
            for succ in g.successors(member).filter(|n| !members.contains(*n)) {
                let conns = by_pair.get(&(member.clone(), succ.clone()));
                outgoing
                    .entry(succ.clone())
                    .or_default()
                    .extend(conns.into_iter().flatten().cloned());
            }
            for pred in g.predecessors(member).filter(|n| !members.contains(*n)) {
                let conns = by_pair.get(&(pred.clone(), member.clone()));
                incoming
                    .entry(pred.clone())
                    .or_default()
                    .extend(conns.into_iter().flatten().cloned());
            }
        }

        let transfers: Vec<Transfer> = by_pair
            .into_iter()
            .map(|((from, to), connections)| Transfer {
                from,
                to,
                connections,
            })
            .collect();

        let mut sub = g.induced(members);
        g.remove_nodes(members);
        g.add_node(id.clone());
        for (succ, conns) in outgoing {
            g.add_edge(id.clone(), succ.clone());
            if !conns.is_empty() {
                g.set_transfers(id.clone(), succ, conns);
            }
        }
        for (pred, conns) in incoming {
            g.add_edge(pred.clone(), id.clone());
            if !conns.is_empty() {
                g.set_transfers(pred, id.clone(), conns);
            }
        }

        let mut inner: BTreeMap<NodeId, ExecNode> = members
            .iter()
            .filter_map(|m| systems.remove_entry(m))
            .collect();

        debug!(id = %id, kind = ?kind, members = members.len(), transfers = transfers.len(), "collapsed nodes");

        let node = match kind {
            Kind::Serial => {
                self.transform(&mut sub, &mut inner)?;
                ExecNode::Serial(SerialUnit::new(id.clone(), sub, inner, transfers, self.scope)?)
            }
            Kind::Parallel => {
                ExecNode::Parallel(ParallelUnit::new(id.clone(), sub, inner, transfers, self.scope)?)
            }
        };
        systems.insert(id.clone(), node);

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Unit, VarSet};

    struct Noop;

    impl Unit for Noop {
        fn run(&mut self, _iteration: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn invalidate(&mut self, _inputs: &VarSet) -> VarSet {
            VarSet::none()
        }
    }

    struct Units {
        units: BTreeMap<String, Noop>,
        iterates: BTreeMap<String, Vec<String>>,
    }

    impl Units {
        fn with(names: &[&str]) -> Self {
            Self {
                units: names.iter().map(|n| (n.to_string(), Noop)).collect(),
                iterates: BTreeMap::new(),
            }
        }
    }

    impl Scope for Units {
        fn unit(&self, name: &str) -> Option<&dyn Unit> {
            let unit: &dyn Unit = self.units.get(name)?;
            Some(unit)
        }

        fn unit_mut(&mut self, name: &str) -> Option<&mut dyn Unit> {
            let unit: &mut dyn Unit = self.units.get_mut(name)?;
            Some(unit)
        }

        fn iteration_set(&self, name: &str) -> Vec<String> {
            self.iterates.get(name).cloned().unwrap_or_default()
        }
    }

    fn leaf(name: &str) -> NodeId {
        NodeId::leaf(name)
    }

    #[test]
    fn exclusive_branch_stops_at_shared_successors() {
        // a -> b -> d, c -> d
        let mut g = PlanGraph::new();
        g.add_edge(leaf("a"), leaf("b"));
        g.add_edge(leaf("b"), leaf("d"));
        g.add_edge(leaf("c"), leaf("d"));

        let mut branch = BTreeSet::from([leaf("a")]);
        exclusive_branch(&g, &leaf("a"), &mut branch);
        assert_eq!(branch, BTreeSet::from([leaf("a"), leaf("b")]));
    }

    #[test]
    fn exclusive_branch_follows_diamonds_once() {
        // a -> b, a -> c, b -> d, c -> d
        let mut g = PlanGraph::new();
        g.add_edge(leaf("a"), leaf("b"));
        g.add_edge(leaf("a"), leaf("c"));
        g.add_edge(leaf("b"), leaf("d"));
        g.add_edge(leaf("c"), leaf("d"));

        let mut branch = BTreeSet::from([leaf("a")]);
        exclusive_branch(&g, &leaf("a"), &mut branch);
        assert_eq!(branch.len(), 4);
    }

    #[test]
    fn fan_out_becomes_parallel_after_source() {
        let mut graph = DependencyGraph::new();
        graph.connect("a.x", "b.x").unwrap();
        graph.connect("a.y", "c.y").unwrap();
        let scope = Units::with(&["a", "b", "c"]);

        let plan = compile(&graph, &scope).unwrap();
        let children = plan.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name(), "a");
        assert_eq!(children[1].kind(), "ParallelUnit");
        assert_eq!(children[1].name(), "(b, c)");
        assert_eq!(children[1].required_workers(), 2);
    }

    #[test]
    fn collapse_records_crossing_transfers() {
        let mut graph = DependencyGraph::new();
        graph.connect("a.x", "b.x").unwrap();
        graph.connect("a.y", "c.y").unwrap();
        let scope = Units::with(&["a", "b", "c"]);

        let plan = compile(&graph, &scope).unwrap();
        let transfers = plan.children()[1].transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].from, leaf("a"));
        assert_eq!(transfers[0].to, leaf("b"));
        assert_eq!(transfers[0].connections, vec![("a.x".to_string(), "b.x".to_string())]);

        let top = match &plan {
            ExecNode::Serial(unit) => unit,
            other => panic!("expected serial top, got {}", other.kind()),
        };
        let edge = top
            .graph()
            .transfers_between(&leaf("a"), &NodeId::group([leaf("b"), leaf("c")]))
            .to_vec();
        assert_eq!(edge.len(), 2);
    }

    #[test]
    fn iteration_set_orders_members_first() {
        let mut graph = DependencyGraph::new();
        graph.add_unit("driver").unwrap();
        graph.add_unit("comp").unwrap();
        let mut scope = Units::with(&["driver", "comp"]);
        scope.iterates.insert("driver".into(), vec!["comp".into()]);

        let plan = compile(&graph, &scope).unwrap();
        assert_eq!(plan.leaf_names(), vec!["comp", "driver"]);
        assert_eq!(plan.children().len(), 2);
    }

    #[test]
    fn cyclic_iteration_set_is_rejected() {
        let mut graph = DependencyGraph::new();
        graph.connect("driver.out", "comp.in").unwrap();
        let mut scope = Units::with(&["driver", "comp"]);
        scope.iterates.insert("driver".into(), vec!["comp".into()]);

        let err = compile(&graph, &scope).unwrap_err();
        assert!(matches!(err, PlanError::CyclicDependency { .. }));
    }
}

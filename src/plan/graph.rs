// src/plan/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::DependencyGraph;
use crate::plan::node::NodeId;

/// Qualified `(src, dest)` variable pairs.
pub type Connections = Vec<(String, String)>;

/// Structure of a (sub)plan: nodes, edges and the variable connections
/// each edge stands for.
#[derive(Debug, Clone, Default)]
pub struct PlanGraph {
    succ: BTreeMap<NodeId, BTreeSet<NodeId>>,
    pred: BTreeMap<NodeId, BTreeSet<NodeId>>,
    transfers: BTreeMap<(NodeId, NodeId), Connections>,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf-level copy of the real units of a dependency graph.
    pub fn from_dependencies(graph: &DependencyGraph) -> Self {
        let mut plan = Self::new();
        let units = graph.unit_graph();

        for name in units.keys() {
            plan.add_node(NodeId::leaf(name));
        }
        for (u, succs) in &units {
            for v in succs {
                plan.add_edge(NodeId::leaf(u), NodeId::leaf(v));
                plan.transfers
                    .insert((NodeId::leaf(u), NodeId::leaf(v)), graph.edge_connections(u, v));
            }
        }

        plan
    }

    pub fn len(&self) -> usize {
        self.succ.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succ.is_empty()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.succ.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.succ.keys()
    }

    pub fn successors(&self, node: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.succ.get(node).into_iter().flatten()
    }

    pub fn predecessors(&self, node: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.pred.get(node).into_iter().flatten()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.succ
            .iter()
            .flat_map(|(u, succs)| succs.iter().map(move |v| (u, v)))
    }

    /// Variable connections carried by edge `u -> v` (empty for edges that
    /// only express ordering).
    pub fn transfers_between(&self, u: &NodeId, v: &NodeId) -> &[(String, String)] {
        self.transfers
            .get(&(u.clone(), v.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn add_node(&mut self, node: NodeId) {
        self.succ.entry(node.clone()).or_default();
        self.pred.entry(node).or_default();
    }

    pub(crate) fn add_edge(&mut self, u: NodeId, v: NodeId) {
        self.add_node(u.clone());
        self.add_node(v.clone());
        self.succ.entry(u.clone()).or_default().insert(v.clone());
        self.pred.entry(v).or_default().insert(u);
    }

    pub(crate) fn set_transfers(&mut self, u: NodeId, v: NodeId, connections: Connections) {
        self.transfers.insert((u, v), connections);
    }

    pub(crate) fn remove_node(&mut self, node: &NodeId) {
        if let Some(succs) = self.succ.remove(node) {
            for v in succs {
                if let Some(preds) = self.pred.get_mut(&v) {
                    preds.remove(node);
                }
            }
        }
        if let Some(preds) = self.pred.remove(node) {
            for u in preds {
                if let Some(succs) = self.succ.get_mut(&u) {
                    succs.remove(node);
                }
            }
        }
        self.transfers.retain(|(u, v), _| u != node && v != node);
    }

    pub(crate) fn remove_nodes<'a>(&mut self, nodes: impl IntoIterator<Item = &'a NodeId>) {
        for node in nodes {
            self.remove_node(node);
        }
    }

    /// Subgraph induced by `members`, with the transfers of its internal
    /// edges.
    pub(crate) fn induced(&self, members: &BTreeSet<NodeId>) -> PlanGraph {
        let mut sub = PlanGraph::new();
        for node in members.iter().filter(|n| self.contains(n)) {
            sub.add_node(node.clone());
        }
        for (u, v) in self.edges() {
            if members.contains(u) && members.contains(v) {
                sub.add_edge(u.clone(), v.clone());
                if let Some(conns) = self.transfers.get(&(u.clone(), v.clone())) {
                    sub.set_transfers(u.clone(), v.clone(), conns.clone());
                }
            }
        }
        sub
    }

    /// Nodes with no incoming edge, in id order.
    pub(crate) fn sources(&self) -> Vec<NodeId> {
        self.pred
            .iter()
            .filter(|(_, preds)| preds.is_empty())
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// The node of this graph that contains the given unit.
    pub(crate) fn node_containing(&self, unit: &str) -> Option<&NodeId> {
        self.succ.keys().find(|node| node.contains_leaf(unit))
    }

    /// Kahn's algorithm with ties broken by node id.
    ///
    /// On failure returns the members of a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, Vec<NodeId>> {
        let mut in_degree: BTreeMap<&NodeId, usize> = self
            .pred
            .iter()
            .map(|(node, preds)| (node, preds.len()))
            .collect();
        let mut ready: BTreeSet<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for succ in self.successors(node) {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(succ);
                    }
                }
            }
        }

        if order.len() == self.len() {
            Ok(order)
        } else {
            Err(self.find_cycle())
        }
    }

    fn find_cycle(&self) -> Vec<NodeId> {
        let mut graph: DiGraph<&NodeId, ()> = DiGraph::new();
        let index: BTreeMap<&NodeId, NodeIndex> =
            self.succ.keys().map(|node| (node, graph.add_node(node))).collect();
        for (u, v) in self.edges() {
            graph.add_edge(index[u], index[v], ());
        }

        let mut cycle: Vec<NodeId> = tarjan_scc(&graph)
            .into_iter()
            .find(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .unwrap_or_default()
            .into_iter()
            .map(|idx| NodeId::clone(graph[idx]))
            .collect();
        cycle.sort();
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> NodeId {
        NodeId::leaf(name)
    }

    #[test]
    fn topological_order_breaks_ties_by_id() {
        let mut g = PlanGraph::new();
        g.add_edge(leaf("c"), leaf("d"));
        g.add_node(leaf("a"));
        g.add_node(leaf("b"));

        assert_eq!(
            g.topological_order().unwrap(),
            vec![leaf("a"), leaf("b"), leaf("c"), leaf("d")]
        );
    }

    #[test]
    fn topological_order_reports_cycle_members() {
        let mut g = PlanGraph::new();
        g.add_edge(leaf("a"), leaf("b"));
        g.add_edge(leaf("b"), leaf("c"));
        g.add_edge(leaf("c"), leaf("b"));

        assert_eq!(g.topological_order().unwrap_err(), vec![leaf("b"), leaf("c")]);
    }

    #[test]
    fn remove_node_cleans_edges_and_transfers() {
        let mut g = PlanGraph::new();
        g.add_edge(leaf("a"), leaf("b"));
        g.set_transfers(leaf("a"), leaf("b"), vec![("a.o".into(), "b.i".into())]);
        g.remove_node(&leaf("b"));

        assert_eq!(g.len(), 1);
        assert_eq!(g.successors(&leaf("a")).count(), 0);
        assert!(g.transfers_between(&leaf("a"), &leaf("b")).is_empty());
    }

    #[test]
    fn induced_keeps_internal_edges_only() {
        let mut g = PlanGraph::new();
        g.add_edge(leaf("a"), leaf("b"));
        g.add_edge(leaf("b"), leaf("c"));
        let members: BTreeSet<NodeId> = [leaf("b"), leaf("c")].into();

        let sub = g.induced(&members);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.edges().count(), 1);
        assert_eq!(sub.sources(), vec![leaf("b")]);
    }
}

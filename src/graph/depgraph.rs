// src/graph/depgraph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::errors::{PlanError, Result};
use crate::graph::link::LinkSet;
use crate::graph::path::{
    destination_candidates, qualify, resolve_connection, validate_unit_name, Boundary, GraphNode,
    VarRef,
};
use crate::scope::{Scope, VarSet};

/// One variable connection crossing the border of a set of units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crossing {
    pub src_unit: String,
    pub dest_unit: String,
    /// Fully qualified source path (`unit.var`).
    pub src: String,
    /// Fully qualified destination path (`unit.var`).
    pub dest: String,
}

/// Variable-level dependency graph between units.
///
/// Every edge `u -> v` carries a [`LinkSet`] describing which variables of
/// `u` feed which variables of `v`. The four [`Boundary`] pseudo-nodes are
/// always present. The subgraph induced by real units is kept acyclic: any
/// connection that would close a cycle is rejected before it is recorded.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Outgoing edges; every node has an entry, possibly empty.
    succ: BTreeMap<GraphNode, BTreeMap<GraphNode, LinkSet>>,
    /// Incoming neighbours; mirrors `succ`.
    pred: BTreeMap<GraphNode, BTreeSet<GraphNode>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            succ: BTreeMap::new(),
            pred: BTreeMap::new(),
        };
        for boundary in Boundary::ALL {
            graph.insert_node(GraphNode::Boundary(boundary));
        }
        graph
    }

    fn insert_node(&mut self, node: GraphNode) {
        self.succ.entry(node.clone()).or_default();
        self.pred.entry(node).or_default();
    }

    /// Whether a unit with this name is part of the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.succ.contains_key(&GraphNode::unit(name))
    }

    /// Number of real units (boundary nodes are not counted).
    pub fn len(&self) -> usize {
        self.succ.len() - Boundary::ALL.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.succ.keys().filter_map(GraphNode::unit_name)
    }

    pub fn add_unit(&mut self, name: &str) -> Result<()> {
        validate_unit_name(name)?;
        if !self.contains(name) {
            debug!(unit = %name, "adding unit to dependency graph");
            self.insert_node(GraphNode::unit(name));
        }
        Ok(())
    }

    /// Remove a unit and every edge touching it. Removing an unknown unit
    /// is not an error.
    pub fn remove_unit(&mut self, name: &str) {
        let node = GraphNode::unit(name);
        let Some(outgoing) = self.succ.remove(&node) else {
            debug!(unit = %name, "remove_unit: unit not in graph; nothing to do");
            return;
        };

        for dest in outgoing.keys() {
            if let Some(preds) = self.pred.get_mut(dest) {
                preds.remove(&node);
            }
        }
        if let Some(incoming) = self.pred.remove(&node) {
            for src in incoming {
                if let Some(edges) = self.succ.get_mut(&src) {
                    edges.remove(&node);
                }
            }
        }
        debug!(unit = %name, "removed unit from dependency graph");
    }

    /// The link carried by edge `src -> dest`, if any.
    pub fn link(&self, src: &GraphNode, dest: &GraphNode) -> Option<&LinkSet> {
        self.succ.get(src).and_then(|edges| edges.get(dest))
    }

    /// Connect two variables.
    ///
    /// Fails without modifying the graph if the destination already has a
    /// source, if a path is malformed, or if the new edge would make the
    /// real units cyclic.
    pub fn connect(&mut self, src_path: &str, dest_path: &str) -> Result<()> {
        let (src, dest) = resolve_connection(src_path, dest_path)?;

        // A bare destination is one variable whether it sits on `@bin` or `@bout`.
        let existing = destination_candidates(dest_path)?
            .iter()
            .find_map(|candidate| self.source_ref(candidate));
        if let Some(existing) = existing {
            return Err(PlanError::DuplicateConnection {
                dest: dest.qualified(),
                existing: existing.qualified(),
            });
        }

        if let (GraphNode::Unit(s), GraphNode::Unit(d)) = (&src.node, &dest.node) {
            if self.link(&src.node, &dest.node).is_none() {
                if let Err(cycle) = self.check_acyclic_with(s, d) {
                    return Err(PlanError::CyclicDependency {
                        cycle,
                        src: src.qualified(),
                        dest: dest.qualified(),
                    });
                }
            }
        }

        for node in [&src.node, &dest.node] {
            if let GraphNode::Unit(name) = node {
                self.add_unit(name)?;
            }
        }

        self.succ
            .entry(src.node.clone())
            .or_default()
            .entry(dest.node.clone())
            .or_default()
            .connect(&src.var, &dest.var)?;
        self.pred
            .entry(dest.node.clone())
            .or_default()
            .insert(src.node.clone());

        debug!(src = %src.qualified(), dest = %dest.qualified(), "connected");
        Ok(())
    }

    pub fn disconnect(&mut self, src_path: &str, dest_path: &str) -> Result<()> {
        let (src, dest) = resolve_connection(src_path, dest_path)?;
        let not_connected = || PlanError::NotConnected {
            src: src.qualified(),
            dest: dest.qualified(),
        };

        let edges = self.succ.get_mut(&src.node).ok_or_else(not_connected)?;
        let link = edges.get_mut(&dest.node).ok_or_else(not_connected)?;
        link.disconnect(&src.var, &dest.var).map_err(|_| not_connected())?;

        if link.is_empty() {
            edges.remove(&dest.node);
            if let Some(preds) = self.pred.get_mut(&dest.node) {
                preds.remove(&src.node);
            }
            debug!(src = %src.node, dest = %dest.node, "edge emptied; removed");
        }

        debug!(src = %src.qualified(), dest = %dest.qualified(), "disconnected");
        Ok(())
    }

    /// Fully qualified source of a destination path, if it is connected.
    pub fn get_source(&self, dest_path: &str) -> Option<String> {
        let candidates = match destination_candidates(dest_path) {
            Ok(c) => c,
            Err(err) => {
                warn!(path = %dest_path, error = %err, "get_source: ignoring malformed path");
                return None;
            }
        };
        candidates
            .iter()
            .find_map(|dest| self.source_ref(dest))
            .map(|src| src.qualified())
    }

    fn source_ref(&self, dest: &VarRef) -> Option<VarRef> {
        let preds = self.pred.get(&dest.node)?;
        preds.iter().find_map(|src| {
            self.link(src, &dest.node)
                .and_then(|link| link.source_of(&dest.var))
                .map(|var| VarRef {
                    node: src.clone(),
                    var: var.to_string(),
                })
        })
    }

    /// Check that the real units stay acyclic once `src -> dest` is added.
    ///
    /// On failure returns the sorted members of the offending strongly
    /// connected component.
    fn check_acyclic_with(&self, src: &str, dest: &str) -> std::result::Result<(), Vec<String>> {
        if src == dest {
            return Err(vec![src.to_string()]);
        }

        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.unit_names() {
            graph.add_node(name);
        }
        for (u, edges) in &self.succ {
            let Some(u) = u.unit_name() else { continue };
            for v in edges.keys().filter_map(GraphNode::unit_name) {
                graph.add_edge(u, v, ());
            }
        }
        graph.add_edge(src, dest, ());

        if toposort(&graph, None).is_ok() {
            return Ok(());
        }

        let mut cycle = tarjan_scc(&graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .unwrap_or_default()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        cycle.sort();
        Err(cycle)
    }

    /// Propagate invalidation downstream from the given starting points.
    ///
    /// Each start is a node plus the set of its variables that changed. Every
    /// edge is followed at most once per call. Returns the boundary outputs
    /// (`@bout` / `@exout` destinations) that were reached.
    pub fn invalidate<I>(&self, scope: &mut dyn Scope, starts: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = (GraphNode, VarSet)>,
    {
        let mut stack: Vec<(GraphNode, VarSet)> = starts.into_iter().collect();
        let mut visited: BTreeSet<(GraphNode, GraphNode)> = BTreeSet::new();
        let mut changed = BTreeSet::new();

        while let Some((src, varset)) = stack.pop() {
            let Some(edges) = self.succ.get(&src) else {
                warn!(node = %src, "invalidate: node not in graph; skipping");
                continue;
            };

            for (dest, link) in edges {
                if !visited.insert((src.clone(), dest.clone())) {
                    continue;
                }

                let dests = link.destinations_for(&varset);
                if dests.is_empty() {
                    continue;
                }

                match dest {
                    GraphNode::Boundary(Boundary::PassOut | Boundary::ExternalOut) => {
                        changed.extend(dests);
                    }
                    GraphNode::Boundary(_) => {
                        stack.push((dest.clone(), VarSet::only(dests)));
                    }
                    GraphNode::Unit(name) => {
                        let unit = scope
                            .unit_mut(name)
                            .ok_or_else(|| PlanError::UnknownUnit(name.clone()))?;
                        let outs = unit.invalidate(&VarSet::only(dests));
                        debug!(unit = %name, outputs = ?outs, "invalidated unit inputs");
                        if !outs.is_empty() {
                            stack.push((dest.clone(), outs));
                        }
                    }
                }
            }
        }

        Ok(changed)
    }

    /// `(src, dest)` path pairs for every connection, sorted.
    ///
    /// With `include_boundary = false`, connections that originate at a
    /// boundary node are left out.
    pub fn list_connections(&self, include_boundary: bool) -> Vec<(String, String)> {
        let mut conns: Vec<(String, String)> = self
            .succ
            .iter()
            .filter(|(u, _)| include_boundary || !u.is_boundary())
            .flat_map(|(u, edges)| {
                edges.iter().flat_map(move |(v, link)| {
                    link.iter()
                        .map(move |(src, dest)| (qualify(u, src), qualify(v, dest)))
                })
            })
            .collect();
        conns.sort();
        conns
    }

    /// Incoming `(neighbour, link)` pairs of a node.
    pub fn in_links(&self, node: &GraphNode) -> Vec<(&GraphNode, &LinkSet)> {
        self.pred
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|src| self.link(src, node).map(|link| (src, link)))
            .collect()
    }

    /// Outgoing `(neighbour, link)` pairs of a node.
    pub fn out_links(&self, node: &GraphNode) -> Vec<(&GraphNode, &LinkSet)> {
        self.succ
            .get(node)
            .into_iter()
            .flatten()
            .collect()
    }

    /// For each upstream neighbour of `unit`, the sources and destinations
    /// of its connections whose destination is in `vars`. Neighbours with no
    /// matching destination are omitted.
    pub fn in_map(&self, unit: &str, vars: &BTreeSet<String>) -> Vec<(GraphNode, Vec<String>, Vec<String>)> {
        let node = GraphNode::unit(unit);
        self.in_links(&node)
            .into_iter()
            .filter_map(|(src, link)| {
                let (srcs, dests): (Vec<String>, Vec<String>) = link
                    .iter()
                    .filter(|(_, dest)| vars.contains(*dest))
                    .map(|(s, d)| (s.to_string(), d.to_string()))
                    .unzip();
                (!dests.is_empty()).then(|| (src.clone(), srcs, dests))
            })
            .collect()
    }

    /// Outgoing variable connections of one unit, or of the whole graph.
    pub fn var_edges(&self, unit: Option<&str>) -> Vec<(String, String)> {
        match unit {
            None => self.list_connections(true),
            Some(name) => {
                let node = GraphNode::unit(name);
                self.out_links(&node)
                    .into_iter()
                    .flat_map(|(dest, link)| {
                        let node = &node;
                        link.iter()
                            .map(move |(s, d)| (qualify(node, s), qualify(dest, d)))
                    })
                    .collect()
            }
        }
    }

    /// Destinations fed from the enclosing scope.
    pub fn connected_inputs(&self) -> Vec<String> {
        self.out_links(&GraphNode::Boundary(Boundary::ExternalIn))
            .into_iter()
            .flat_map(|(dest, link)| link.iter().map(move |(_, d)| qualify(dest, d)))
            .collect()
    }

    /// Sources that drive values in the enclosing scope.
    pub fn connected_outputs(&self) -> Vec<String> {
        self.in_links(&GraphNode::Boundary(Boundary::ExternalOut))
            .into_iter()
            .flat_map(|(src, link)| link.iter().map(move |(s, _)| qualify(src, s)))
            .collect()
    }

    /// Successor map of the real units, one entry per unit.
    pub fn unit_graph(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.succ
            .iter()
            .filter_map(|(u, edges)| {
                let name = u.unit_name()?;
                let succs = edges
                    .keys()
                    .filter_map(GraphNode::unit_name)
                    .map(str::to_string)
                    .collect();
                Some((name.to_string(), succs))
            })
            .collect()
    }

    /// Qualified `(src, dest)` pairs carried by the edge between two units.
    pub fn edge_connections(&self, src_unit: &str, dest_unit: &str) -> Vec<(String, String)> {
        let (src, dest) = (GraphNode::unit(src_unit), GraphNode::unit(dest_unit));
        self.link(&src, &dest)
            .map(|link| {
                link.iter()
                    .map(|(s, d)| (qualify(&src, s), qualify(&dest, d)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Connections between a member of `units` and a real unit outside it,
    /// in either direction.
    pub fn crossing_connections(&self, units: &BTreeSet<String>) -> Vec<Crossing> {
        let inside = |node: &GraphNode| node.unit_name().is_some_and(|n| units.contains(n));
        let mut crossings = Vec::new();

        for (u, edges) in &self.succ {
            let Some(src_unit) = u.unit_name() else { continue };
            for (v, link) in edges {
                let Some(dest_unit) = v.unit_name() else { continue };
                if inside(u) == inside(v) {
                    continue;
                }
                crossings.extend(link.iter().map(|(s, d)| Crossing {
                    src_unit: src_unit.to_string(),
                    dest_unit: dest_unit.to_string(),
                    src: qualify(u, s),
                    dest: qualify(v, d),
                }));
            }
        }

        crossings
    }
}

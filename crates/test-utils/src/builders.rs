#![allow(dead_code)]

use dagplan::DependencyGraph;

/// Builder for `DependencyGraph` to keep test setup short.
///
/// Panics on the first rejected edit, which is what a test wants.
pub struct GraphBuilder {
    graph: DependencyGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
        }
    }

    pub fn unit(mut self, name: &str) -> Self {
        self.graph
            .add_unit(name)
            .unwrap_or_else(|e| panic!("add_unit({name}) failed: {e}"));
        self
    }

    pub fn units(self, names: &[&str]) -> Self {
        names.iter().fold(self, |b, name| b.unit(name))
    }

    pub fn connect(mut self, src: &str, dest: &str) -> Self {
        self.graph
            .connect(src, dest)
            .unwrap_or_else(|e| panic!("connect({src}, {dest}) failed: {e}"));
        self
    }

    /// Connect `from.out` to `to.in_<from>` for a unit-level edge.
    pub fn edge(self, from: &str, to: &str) -> Self {
        self.connect(&format!("{from}.out"), &format!("{to}.in_{from}"))
    }

    /// `names[0] -> names[1] -> ...`
    pub fn chain(self, names: &[&str]) -> Self {
        let b = self.units(names);
        names.windows(2).fold(b, |b, pair| b.edge(pair[0], pair[1]))
    }

    pub fn build(self) -> DependencyGraph {
        self.graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

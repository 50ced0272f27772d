// src/graph/mod.rs

//! Variable-level dependency graph.
//!
//! - [`link`] holds the per-edge variable connections.
//! - [`path`] resolves `"unit.var"` paths onto graph nodes, including the
//!   four boundary pseudo-nodes.
//! - [`depgraph`] owns the graph: connect/disconnect with cycle rejection,
//!   source lookup, invalidation and connection listing.

pub mod depgraph;
pub mod link;
pub mod path;

pub use depgraph::{Crossing, DependencyGraph};
pub use link::LinkSet;
pub use path::{Boundary, GraphNode, VarRef, PARENT};

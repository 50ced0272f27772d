// src/graph/path.rs

//! Graph node identities and resolution of `"unit.var"` style paths.

use std::fmt;

use crate::errors::{PlanError, Result};

/// Component name that refers to the enclosing scope.
pub const PARENT: &str = "parent";

/// The four pseudo-nodes every dependency graph carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Boundary {
    /// Values flowing in from the enclosing scope (`parent.x -> ...`).
    ExternalIn,
    /// Values flowing out to the enclosing scope (`... -> parent.y`).
    ExternalOut,
    /// Boundary variables read by internal units (`x -> a.in`).
    PassIn,
    /// Boundary variables driven by internal units (`a.out -> y`).
    PassOut,
}

impl Boundary {
    pub const ALL: [Boundary; 4] = [
        Boundary::ExternalIn,
        Boundary::ExternalOut,
        Boundary::PassIn,
        Boundary::PassOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Boundary::ExternalIn => "@exin",
            Boundary::ExternalOut => "@exout",
            Boundary::PassIn => "@bin",
            Boundary::PassOut => "@bout",
        }
    }
}

/// A node of the dependency graph: a real unit or a boundary pseudo-node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphNode {
    Boundary(Boundary),
    Unit(String),
}

impl GraphNode {
    pub fn unit(name: impl Into<String>) -> Self {
        GraphNode::Unit(name.into())
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, GraphNode::Boundary(_))
    }

    pub fn unit_name(&self) -> Option<&str> {
        match self {
            GraphNode::Unit(name) => Some(name),
            GraphNode::Boundary(_) => None,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Boundary(b) => f.write_str(b.as_str()),
            GraphNode::Unit(name) => f.write_str(name),
        }
    }
}

/// One end of a variable connection as stored in the graph.
///
/// For boundary nodes `var` holds the path exactly as the caller wrote it
/// (`parent.x` or a bare `x`), so the qualified form is just `var`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub node: GraphNode,
    pub var: String,
}

impl VarRef {
    fn new(node: GraphNode, var: &str) -> Self {
        Self {
            node,
            var: var.to_string(),
        }
    }

    pub fn qualified(&self) -> String {
        qualify(&self.node, &self.var)
    }
}

pub(crate) fn qualify(node: &GraphNode, var: &str) -> String {
    match node {
        GraphNode::Unit(name) => format!("{name}.{var}"),
        GraphNode::Boundary(_) => var.to_string(),
    }
}

/// Syntactic shape of a path before it is mapped onto graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsedPath<'a> {
    Bare(&'a str),
    Parent(&'a str),
    Unit(&'a str, &'a str),
}

fn parse(path: &str) -> Result<ParsedPath<'_>> {
    let invalid = || PlanError::InvalidPath(path.to_string());

    match path.split_once('.') {
        None => {
            if path.is_empty() || path == PARENT || path.starts_with('@') {
                return Err(invalid());
            }
            Ok(ParsedPath::Bare(path))
        }
        Some((unit, var)) => {
            if unit.is_empty() || var.is_empty() || unit.starts_with('@') {
                return Err(invalid());
            }
            if unit == PARENT {
                Ok(ParsedPath::Parent(path))
            } else {
                Ok(ParsedPath::Unit(unit, var))
            }
        }
    }
}

/// Map a `(src_path, dest_path)` pair onto graph endpoints.
///
/// A `parent` component routes to the external boundary nodes; a bare
/// variable routes to the pass-through boundary node matching its role.
pub(crate) fn resolve_connection(src_path: &str, dest_path: &str) -> Result<(VarRef, VarRef)> {
    let src = parse(src_path)?;
    let dest = parse(dest_path)?;

    let unit_ref = |unit: &str, var: &str| VarRef::new(GraphNode::unit(unit), var);
    let boundary = |b: Boundary, var: &str| VarRef::new(GraphNode::Boundary(b), var);

    let resolved = match (src, dest) {
        (ParsedPath::Parent(s), d) => {
            let dest = match d {
                ParsedPath::Bare(v) => boundary(Boundary::PassIn, v),
                ParsedPath::Parent(p) => boundary(Boundary::ExternalOut, p),
                ParsedPath::Unit(u, v) => unit_ref(u, v),
            };
            (boundary(Boundary::ExternalIn, s), dest)
        }
        (s, ParsedPath::Parent(d)) => {
            let src = match s {
                ParsedPath::Bare(v) => boundary(Boundary::PassOut, v),
                ParsedPath::Unit(u, v) => unit_ref(u, v),
                ParsedPath::Parent(p) => boundary(Boundary::ExternalIn, p),
            };
            (src, boundary(Boundary::ExternalOut, d))
        }
        (ParsedPath::Bare(s), ParsedPath::Bare(d)) => {
            (boundary(Boundary::PassIn, s), boundary(Boundary::PassOut, d))
        }
        (ParsedPath::Bare(s), ParsedPath::Unit(u, v)) => (boundary(Boundary::PassIn, s), unit_ref(u, v)),
        (ParsedPath::Unit(u, v), ParsedPath::Bare(d)) => (unit_ref(u, v), boundary(Boundary::PassOut, d)),
        (ParsedPath::Unit(su, sv), ParsedPath::Unit(du, dv)) => (unit_ref(su, sv), unit_ref(du, dv)),
    };

    Ok(resolved)
}

/// Candidate graph endpoints a destination path may be stored under.
///
/// A bare variable can be fed from the enclosing scope (stored on `@bin`)
/// or driven by an internal unit (stored on `@bout`).
pub(crate) fn destination_candidates(dest_path: &str) -> Result<Vec<VarRef>> {
    let refs = match parse(dest_path)? {
        ParsedPath::Bare(v) => vec![
            VarRef::new(GraphNode::Boundary(Boundary::PassIn), v),
            VarRef::new(GraphNode::Boundary(Boundary::PassOut), v),
        ],
        ParsedPath::Parent(p) => vec![VarRef::new(GraphNode::Boundary(Boundary::ExternalOut), p)],
        ParsedPath::Unit(u, v) => vec![VarRef::new(GraphNode::unit(u), v)],
    };
    Ok(refs)
}

/// Unit names must not collide with the path syntax or the reserved nodes.
pub(crate) fn validate_unit_name(name: &str) -> Result<()> {
    if name.is_empty() || name == PARENT || name.starts_with('@') || name.contains('.') {
        return Err(PlanError::InvalidPath(name.to_string()));
    }
    Ok(())
}

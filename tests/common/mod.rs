#![allow(dead_code)]

use dagplan::ExecNode;

pub use dagplan_test_utils::init_tracing;

/// Compact rendering of a plan's structure: leaves by name, serial units as
/// `S[..]`, parallel units as `P[..]`.
pub fn shape(node: &ExecNode) -> String {
    let inner = |node: &ExecNode| {
        node.children()
            .iter()
            .map(shape)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match node {
        ExecNode::Leaf(_) => node.name(),
        ExecNode::Serial(_) => format!("S[{}]", inner(node)),
        ExecNode::Parallel(_) => format!("P[{}]", inner(node)),
    }
}

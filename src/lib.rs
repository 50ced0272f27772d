// src/lib.rs

//! Dependency-graph planning for multi-process workflows.
//!
//! - [`graph`] records which unit variables feed which, rejecting cycles
//!   and propagating invalidation downstream.
//! - [`plan`] compiles that graph into a tree of serial and parallel
//!   composites.
//! - [`alloc`] divides a process group among the arms of parallel
//!   composites.
//! - [`engine`] ties a graph to its plan and drives iterations.
//!
//! Units themselves stay opaque and are reached through a [`Scope`].

pub mod alloc;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod plan;
pub mod scope;
pub mod types;

pub use crate::alloc::{Color, LocalGroup, ProcessGroup, ThreadedWorld};
pub use crate::engine::{run_iterations, Model};
pub use crate::errors::{PlanError, Result};
pub use crate::graph::DependencyGraph;
pub use crate::plan::{compile, ExecNode, NodeId};
pub use crate::scope::{Scope, Unit, VarSet};

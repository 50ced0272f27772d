// src/engine/mod.rs

//! Owning layer on top of the graph and the plan.
//!
//! [`Model`] keeps a dependency graph and its compiled plan in sync, and
//! [`run_iterations`] drives a plan through repeated iterations with
//! cooperative stopping.

pub mod driver;
pub mod model;

pub use driver::run_iterations;
pub use model::Model;

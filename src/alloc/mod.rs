// src/alloc/mod.rs

//! Process allocation for parallel plan nodes.
//!
//! - [`allocator`] decides how many processes each arm gets and colors
//!   ranks accordingly.
//! - [`group`] defines the [`ProcessGroup`] collectives a plan needs, plus
//!   a single-rank implementation.
//! - [`threaded`] simulates a multi-rank world with one thread per rank.

pub mod allocator;
pub mod group;
pub mod threaded;

pub use allocator::{allocate, colors, round_robin, split, Color, SubGroup};
pub use group::{GroupEvent, LocalGroup, ProcessGroup};
pub use threaded::{ThreadedGroup, ThreadedWorld};

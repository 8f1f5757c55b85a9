//! Inkflow Workflow
//!
//! This crate turns the flat, `order_index`-ordered node list of a workflow into
//! a nested [`Plan`] that the engine walks.
//!
//! Key differences from `inkflow-config`:
//! - Block markers are matched (stack-balanced, never overlapping)
//! - Exactly one `start` node exists and it comes first
//! - Node ids are unique
//! - Loops, conditions and parallel fan-out are explicit [`Block`]s

mod error;
mod plan;
mod resolve;

pub use error::PlanError;
pub use plan::{Block, Plan, Step};
pub use resolve::resolve;

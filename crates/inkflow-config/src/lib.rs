//! Inkflow Config
//!
//! This crate contains the serializable workflow configuration types for inkflow.
//! These types represent workflows as they are persisted: a flat list of nodes
//! ordered by `order_index`, where loops, conditions and parallel fan-out are
//! expressed with paired block-marker nodes sharing a `block_id`.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `inkflow run workflow.json`)
//! - Database storage (node `config` columns are JSON blobs)
//!
//! The engine takes these types, nests the flat list into a block plan, and
//! deserializes each node's `config` into the typed structs in [`node_config`]
//! right before the node runs.

mod condition;
mod input;
mod node;
pub mod node_config;
mod runtime;
mod workflow;

pub use condition::{ConditionSpec, ConditionType, KeywordMode, LengthOperator};
pub use input::{InputSource, InputSpec};
pub use node::{BlockKind, NodeDef, NodeKind};
pub use runtime::RuntimeConfig;
pub use workflow::WorkflowDef;

//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `EntityKind`: the closed set of node labels the crawler understands
//! - `NodeState`: processing state of a node, derived from its timestamps

mod entity_kind;
mod node_state;

pub use entity_kind::EntityKind;
pub use node_state::{NodeState, UNPROCESSED};

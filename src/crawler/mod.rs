//! Crawler module for expanding the graph pass by pass
//!
//! This module contains the core crawling logic, including:
//! - The expansion rules of each entity kind
//! - Credential pacing against the API quota
//! - Quarantine of nodes whose expansion failed
//! - Pass orchestration over a snapshot of unprocessed nodes

mod budget;
mod expander;
mod frontier;
mod quarantine;

pub use budget::RateBudget;
pub use expander::{
    rules, Direction, EntityExpander, ExpanderSettings, ExpansionRule, ExpansionSummary,
};
pub use frontier::{watch_interrupts, Frontier, PassReport};
pub use quarantine::{error_trace, quarantine, release_all};

//! Output module for reporting on the crawled graph
//!
//! This module handles:
//! - Loading graph statistics from storage
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, GraphStatistics};

//! Quarantine of nodes whose expansion failed
//!
//! A quarantined node keeps `processed = 0` and carries the error message and
//! its cause chain. It is left out of passes while `skip-errored` is set and
//! comes back once its error is cleared.

use crate::storage::{GraphStore, NodeRef, StorageResult};
use std::error::Error;
use std::fmt::Write;

/// Renders an error with its whole cause chain, one cause per line
pub fn error_trace(error: &dyn Error) -> String {
    let mut trace = error.to_string();
    let mut source = error.source();
    let mut depth = 1;

    while let Some(cause) = source {
        let _ = write!(trace, "\n{:>width$}caused by: {}", "", cause, width = depth * 2);
        source = cause.source();
        depth += 1;
    }

    trace
}

/// Records `error` on `node` and logs it
pub fn quarantine(store: &dyn GraphStore, node: &NodeRef, error: &dyn Error) -> StorageResult<()> {
    let trace = error_trace(error);

    tracing::error!(
        uri = %node.uri,
        label = %node.label,
        "Quarantined node: {}",
        trace
    );

    store.mark_errored(node.id, &error.to_string(), &trace)
}

/// Returns every quarantined node to the schedulable set
pub fn release_all(store: &dyn GraphStore) -> StorageResult<u64> {
    let released = store.clear_all_errors()?;
    tracing::info!("Released {} quarantined nodes", released);
    Ok(released)
}

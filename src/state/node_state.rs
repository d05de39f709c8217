/// Processing state of a graph node
///
/// The state is not stored as its own column; it is derived from the
/// `processed` timestamp and the `error` marker of a node.
use std::fmt;

/// Sentinel `processed` value of a node that was never processed
pub const UNPROCESSED: i64 = 0;

/// Represents where a node is in its processing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Discovered but not yet expanded
    Unprocessed,

    /// Expanded successfully; never scheduled again
    Processed,

    /// Expansion failed; skipped while error skipping is enabled
    Quarantined,
}

impl NodeState {
    /// Derives the state from the persisted columns
    pub fn derive(processed: i64, has_error: bool) -> Self {
        if processed != UNPROCESSED {
            Self::Processed
        } else if has_error {
            Self::Quarantined
        } else {
            Self::Unprocessed
        }
    }

    /// Returns true if the node may still be dispatched by a pass
    ///
    /// Quarantined nodes only become schedulable when error skipping is off.
    pub fn is_schedulable(&self, skip_errored: bool) -> bool {
        match self {
            Self::Unprocessed => true,
            Self::Quarantined => !skip_errored,
            Self::Processed => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Processed => "processed",
            Self::Quarantined => "quarantined",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

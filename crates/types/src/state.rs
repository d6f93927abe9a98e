//! Transaction lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle state of a deployment transaction.
///
/// Legal transitions: `Created -> Started -> Updated -> Committed`, with
/// `RolledBack` reachable from `Started` and `Updated` (and from a failed
/// commit). Terminal states are `Committed` and `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Created,
    Started,
    Updated,
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Whether the transaction reached a terminal state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Updated => "updated",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
        };
        write!(f, "{s}")
    }
}

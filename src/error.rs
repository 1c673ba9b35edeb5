//! Error types surfaced by the repository.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Backing tier a call was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Cache,
    Store,
    Node,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cache => "cache",
            Tier::Store => "store",
            Tier::Node => "node",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures returned to repository callers.
///
/// Cache failures never appear here; they are logged and the call falls
/// through to the next tier.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A required identifier was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The entity does not exist in any tier.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Store or node returned a transport or query error.
    #[error("{tier} unavailable during {op}: {source}")]
    TierUnavailable {
        tier: Tier,
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Store or node did not answer within the configured deadline.
    #[error("{tier} did not answer {op} within {timeout:?}")]
    DeadlineExceeded {
        tier: Tier,
        op: &'static str,
        timeout: Duration,
    },

    /// Two views of the same fact could not be reconciled.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

impl RepositoryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RepositoryError::InvalidArgument(msg.into())
    }

    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        RepositoryError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Tier that failed, if the error came from a backing tier.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            RepositoryError::TierUnavailable { tier, .. }
            | RepositoryError::DeadlineExceeded { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::TierUnavailable { .. } | RepositoryError::DeadlineExceeded { .. }
        )
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

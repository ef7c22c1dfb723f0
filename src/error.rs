//! Error taxonomy for the adaptive crawl engine.
//!
//! Mirrors the shape of `riptide_types::error::RiptideError`: a single
//! `thiserror` enum with one variant per failure mode the orchestrator can
//! actually surface, plus `#[from]` conversions for the handful of library
//! errors that cross our boundary unchanged.
//!
//! `FetchFailure` and `EmptyFrontier` are deliberately absent here: per the
//! error-handling design, a failed fetch is logged and skipped inline (it
//! never becomes a `Result::Err`), and an empty frontier is a normal loop
//! exit, not a failure.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AdaptiveError>;

#[derive(Debug, Error)]
pub enum AdaptiveError {
    /// A config validator rejected an option before any network activity.
    #[error("invalid config: {0}")]
    Config(String),

    /// The embedder raised while the embedding strategy was mid-call.
    /// Propagated: the current batch's integration is abandoned so state
    /// stays consistent (integration is all-or-nothing per batch).
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// The query expander raised during query-space expansion at digest start.
    #[error("query expansion failed: {0}")]
    QueryExpansionFailure(String),

    /// Persisted state could not be loaded (missing file, malformed document).
    #[error("failed to load persisted state from {path}: {source}")]
    PersistenceLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Persisted state could not be decoded as JSON.
    #[error("failed to decode persisted state: {0}")]
    PersistenceDecode(#[from] serde_json::Error),

    /// A write failed. Per policy this is logged and the run continues;
    /// this variant exists so the persistence module has something to log,
    /// it is not meant to abort a running loop.
    #[error("failed to write persisted state to {path}: {source}")]
    PersistenceWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A data-model invariant was violated. This indicates a bug in the
    /// engine, not a recoverable runtime condition.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl AdaptiveError {
    pub fn config(msg: impl Into<String>) -> Self {
        AdaptiveError::Config(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        AdaptiveError::InvariantViolation(msg.into())
    }

    /// True for failures that are expected to occur during normal operation
    /// of a correctly configured system (as opposed to bugs or misconfiguration).
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            AdaptiveError::EmbeddingFailure(_) | AdaptiveError::QueryExpansionFailure(_)
        )
    }

    /// True if this error should have been caught before any network activity.
    pub fn is_config(&self) -> bool {
        matches!(self, AdaptiveError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message_includes_field() {
        let err = AdaptiveError::config("max_pages must be >= 1");
        assert!(err.to_string().contains("max_pages"));
        assert!(err.is_config());
    }

    #[test]
    fn invariant_violation_is_not_runtime() {
        let err = AdaptiveError::invariant("total_documents mismatch");
        assert!(!err.is_runtime());
        assert!(!err.is_config());
    }

    #[test]
    fn embedding_failure_is_runtime() {
        let err = AdaptiveError::EmbeddingFailure("provider timeout".into());
        assert!(err.is_runtime());
    }
}

//! Crate-wide error type.
//!
//! One enum covers every failure class named in the error-handling design:
//! inference/backend faults, execution/parse faults, tool faults, store
//! corruption, and the two background-task failure classes (curator,
//! checkpoint). [`Error::is_recoverable`] lets callers decide "log and
//! continue" generically instead of matching on string content.

use uuid::Uuid;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("inference backend error: {0}")]
    Inference(#[from] crate::inference::InferenceError),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("candidate parse error: {0}")]
    Parse(String),

    #[error("hallucinated tool name: {0}")]
    ToolHallucination(String),

    #[error("tool validation failed for {tool}: {reason}")]
    ToolValidation { tool: String, reason: String },

    #[error("security: path escapes workspace root: {0}")]
    SecurityRejected(String),

    #[error("knowledge store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("lesson not found: {0}")]
    NotFound(Uuid),

    #[error("curator error: {0}")]
    Curator(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the outer loop / curator should treat this as transient (log
    /// and keep going) or as a sign the caller's invariant was violated.
    ///
    /// Backend and tool-level faults are always recoverable (the pipeline
    /// degrades gracefully); store corruption and
    /// config errors are surfaced but the process still does not crash the
    /// outer loop, since "the outer loop always makes progress or blocks
    /// cleanly on backend health" is a hard requirement.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Inference(_)
            | Error::Execution(_)
            | Error::Parse(_)
            | Error::ToolHallucination(_)
            | Error::ToolValidation { .. }
            | Error::Curator(_)
            | Error::Checkpoint(_)
            | Error::StoreCorrupt(_) => true,
            Error::SecurityRejected(_) | Error::NotFound(_) | Error::Config(_) => false,
            Error::Serialization(_) | Error::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_corruption_is_recoverable() {
        assert!(Error::StoreCorrupt("bad json".into()).is_recoverable());
    }

    #[test]
    fn security_rejection_is_not_recoverable() {
        assert!(!Error::SecurityRejected("../etc/passwd".into()).is_recoverable());
    }
}

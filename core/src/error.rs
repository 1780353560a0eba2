use std::fmt::Display;

use thiserror::Error;
use uuid::Uuid;

/// Failure of the persistence layer. Always fatal to the job that hit it.
#[derive(Debug, Error)]
#[error("repository error: {0:#}")]
pub struct RepositoryError(#[from] anyhow::Error);

impl RepositoryError {
    pub fn msg(message: impl Display) -> Self {
        RepositoryError(anyhow::Error::msg(message.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ReconError {
    /// Malformed submission; no job is created.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job {0} not found")]
    NotFound(Uuid),

    /// One data or probe source failed. Recovered by the stage that saw it.
    #[error("source {name} unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    /// Every source of a stage failed, or the stage had nothing to work on.
    #[error("{0}")]
    StageExhausted(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("job cancelled")]
    Cancelled,
}

impl ReconError {
    pub fn source_unavailable(name: impl Into<String>, reason: impl Display) -> Self {
        ReconError::SourceUnavailable { name: name.into(), reason: reason.to_string() }
    }

    /// Whether this error ends the job rather than being absorbed by a stage.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReconError::SourceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("insert discovered_ips");
        let err = ReconError::from(RepositoryError::from(inner));
        let text = err.to_string();
        assert!(text.contains("insert discovered_ips"), "{text}");
        assert!(text.contains("disk full"), "{text}");
    }

    #[test]
    fn only_source_errors_are_recoverable() {
        assert!(!ReconError::source_unavailable("radb", "timeout").is_fatal());
        assert!(ReconError::StageExhausted("no prefixes".into()).is_fatal());
        assert!(ReconError::Cancelled.is_fatal());
    }
}

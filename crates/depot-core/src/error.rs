use std::path::PathBuf;

use thiserror::Error;

/// Unified error across the regeneration pipeline.
///
/// Failures are isolated at job and purge-pair granularity by the
/// orchestrator; the soft cases (a missing artifact, a malformed per-plugin
/// metadata file) are handled at the call site and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source unavailable for {repo}: {reason}")]
    SourceUnavailable { repo: String, reason: String },

    #[error("expected artifact missing at {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("failed to parse {item}: {reason}")]
    Parse { item: String, reason: String },

    #[error("registry operation failed: {0}")]
    Registry(#[from] redis::RedisError),

    #[error("purge via {backend} failed: {reason}")]
    Purge { backend: &'static str, reason: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid job name `{0}`")]
    UnknownJob(String),
}

impl Error {
    /// Wrap a serde failure with the name of the document being decoded.
    pub fn parse(item: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            item: item.into(),
            reason: err.to_string(),
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

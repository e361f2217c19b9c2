//! Error types for the retrieval core.
//!
//! This module provides structured error types using thiserror. The taxonomy
//! distinguishes caller mistakes (validation), absent entities, upstream
//! failures, and locally-degraded components, so that callers can react
//! without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for retrieval operations.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Caller supplied invalid or conflicting input.
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    /// The requested entity does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    /// Upstream HTTP failure (timeout, non-2xx, or unparseable body).
    #[error("Upstream request to '{url}' failed: {message}")]
    External {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// A local index is missing, unreadable, or lacks a required feature.
    #[error("Index '{index}' unavailable: {reason}")]
    IndexUnavailable { index: &'static str, reason: String },

    /// The embedding model failed to load or run.
    #[error("Embedding model failure: {reason}")]
    Embedding { reason: String },

    /// A fetched document is structurally corrupt beyond per-attribute recovery.
    #[error("Corrupt upstream document: {reason}")]
    Integrity { reason: String },

    /// Local SQL execution failure.
    #[error("Query against '{index}' failed: {source}")]
    Sql {
        index: &'static str,
        source: rusqlite::Error,
    },

    /// Configuration errors.
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RetrievalError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn external(
        url: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::External {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    pub fn index_unavailable(index: &'static str, reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            index,
            reason: reason.into(),
        }
    }

    /// Get recovery suggestions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Validation { .. } => vec![
                "Supply at least one recognised filter (title, creator, type, material, technique, creationDate, description)",
            ],
            Self::External { .. } => vec![
                "The museum API may be rate-limiting or briefly down; retry after a pause",
                "Check network connectivity to the configured API base URL",
            ],
            Self::IndexUnavailable { .. } => vec![
                "Check the index paths in musea.toml or the MUSEA_INDEXES__* environment variables",
                "Re-run the offline harvest pipeline to rebuild the missing index",
            ],
            Self::Embedding { .. } => vec![
                "Semantic search is disabled but structured search still works",
                "Check that the model cache directory is writable and has disk space",
            ],
            Self::Config { .. } => vec!["Run 'musea init --force' to regenerate a default configuration"],
            _ => vec![],
        }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(e: reqwest::Error) -> Self {
        let url = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let status = e.status().map(|s| s.as_u16());
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        Self::External {
            url,
            status,
            message,
        }
    }
}

/// Result type alias for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Helper trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Attach an index name to a SQL error.
    fn on_index(self, index: &'static str) -> RetrievalResult<T>;
}

impl<T> ErrorContext<T> for Result<T, rusqlite::Error> {
    fn on_index(self, index: &'static str) -> RetrievalResult<T> {
        self.map_err(|source| RetrievalError::Sql { index, source })
    }
}

/// Non-fatal degradations accumulated alongside results.
///
/// Every operation in the public surface returns its warnings; empty result
/// sets always carry at least one entry explaining why.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(transparent)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "warnings", "{message}");
        self.0.push(message);
    }

    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_filter_names() {
        let err = RetrievalError::validation("no filters given");
        let suggestions = err.recovery_suggestions();
        assert!(!suggestions.is_empty());
        assert!(suggestions[0].contains("creator"));
        assert!(suggestions[0].contains("creationDate"));
    }

    #[test]
    fn warnings_accumulate() {
        let mut w = Warnings::new();
        w.push("first");
        w.push("second");
        assert_eq!(w.as_slice(), &["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn not_found_display() {
        let err = RetrievalError::not_found("artwork", "SK-C-5");
        assert_eq!(err.to_string(), "artwork 'SK-C-5' not found");
    }
}

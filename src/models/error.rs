//! Error types for nlsgen.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad config, dataset header mismatch)
//! - I^B materialized: Infrastructure failures (component setup, shard I/O)
//! - K_i violated: Internal invariant violations (bugs)

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for nlsgen.
#[derive(Debug, Error)]
pub enum NlsgenError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Dataset {path} has columns {found:?}, expected {expected:?}")]
    DatasetMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Component for equation {equation_id} failed to initialize in batch {batch}: {source}")]
    ComponentInit {
        equation_id: u64,
        batch: usize,
        #[source]
        source: ComponentError,
    },

    #[error("Component for equation {equation_id} failed in batch {batch}: {source}")]
    Component {
        equation_id: u64,
        batch: usize,
        #[source]
        source: ComponentError,
    },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {context}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by an equation component binding.
///
/// Evaluation outcomes are not errors (see `EvalStatus`); these are setup
/// problems with the component itself.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown equation: {0}")]
    UnknownEquation(u64),

    #[error("Component error: {0}")]
    Other(String),
}

impl NlsgenError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a CSV error with context.
    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }

    /// Check if this error must abort the whole run.
    ///
    /// Shard I/O failures only cost the batch they happened in; everything
    /// else points at a setup problem that every other batch shares.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Csv { .. })
    }
}

/// Result type alias for nlsgen.
pub type Result<T> = std::result::Result<T, NlsgenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_io_errors_are_not_fatal() {
        let err = NlsgenError::io(
            "writing shard",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_component_errors_are_fatal() {
        let err = NlsgenError::ComponentInit {
            equation_id: 14,
            batch: 2,
            source: ComponentError::Instantiation("missing binary".to_string()),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("equation 14"));
        assert!(err.to_string().contains("batch 2"));
    }
}

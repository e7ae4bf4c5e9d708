//! Typed failures for tier loading, tier extraction and shared resources.

use std::{path::PathBuf, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Fault taxonomy surfaced through diagnostics. Never raised to `extract` callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// I/O, parse or timeout while loading a tier.
    LoadFailure,
    /// A loaded tier failed while extracting.
    ExtractionFailure,
    /// A tier cannot be loaded at all with the current settings.
    ConfigurationError,
}

/// Failure while loading the partial or full tier.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("path not configured for {0}")]
    NotConfigured(&'static str),
    #[error("{} does not exist", .0.display())]
    MissingPath(PathBuf),
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("load timed out after {0:?}")]
    Timeout(Duration),
    #[error("load task aborted: {0}")]
    Aborted(String),
    #[error("no tokio runtime available to run background loads")]
    NoRuntime,
}

impl LoadError {
    /// Map a load failure onto the fault taxonomy.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::NotConfigured(_) | Self::MissingPath(_) | Self::NoRuntime => {
                FaultKind::ConfigurationError
            }
            _ => FaultKind::LoadFailure,
        }
    }
}

/// Failure raised by a loaded tier during extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("tier not loaded")]
    NotLoaded,
    #[error("model error: {0}")]
    Model(String),
    #[error("model panicked: {0}")]
    Panicked(String),
}

/// Failure loading one of the shared heavy resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("vector index shape mismatch: {0}")]
    Shape(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
}

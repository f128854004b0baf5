//! Error types for rhil-core

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A partition candidate that the partition tool rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Candidate partition binary that was passed to the tool
    pub file: PathBuf,
    /// Captured stderr (or spawn error) for this candidate
    pub message: String,
}

/// Errors raised while reading build artifacts
#[derive(Debug, Error)]
pub enum CoreError {
    /// Failed to read a file or directory
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A JSON artifact could not be parsed
    #[error("Failed to parse JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Flash manifest offset is neither hex, octal, binary nor decimal
    #[error("Invalid flash offset '{offset}' in '{path}'")]
    InvalidOffset { path: PathBuf, offset: String },

    /// Every partition candidate was rejected by the partition tool
    #[error("No partition table found under {}\n{}", .binary_dir.display(), format_failures(.tool, .failures))]
    NoPartitionTable {
        binary_dir: PathBuf,
        tool: PathBuf,
        failures: Vec<CandidateFailure>,
    },
}

fn format_failures(tool: &std::path::Path, failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} {}:\n{}", tool.display(), f.file.display(), f.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for rhil-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

//! Error types for trace extraction.
//!
//! Every variant except `NoWorkspaceRoot` and directory-level I/O is
//! recoverable: the pipeline logs it and moves on to the next mapping.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    /// A segment file name that doesn't follow `<hex>_<x>_<perm>_<perm>...`
    #[error("malformed mapping name {name:?}: {reason}")]
    MalformedMappingName { name: String, reason: String },

    /// Neither the structured loader nor the shared-library fallback applies
    #[error("could not produce an analysis view for mapping {name:?}")]
    UnrecognizedMapping { name: String },

    #[error("analysis did not complete within {limit:?} (ran for {elapsed:?})")]
    AnalysisTimeout { limit: Duration, elapsed: Duration },

    #[error("no valid instruction at 0x{address:x}")]
    DecodeFailure { address: u64 },

    /// The memory directory sits too close to the filesystem root for the
    /// `<workspace>/<subdir>/<memory-dir>` layout
    #[error("cannot derive a workspace root from {}", path.display())]
    NoWorkspaceRoot { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;

//! Typed error taxonomy for the memex engine.
//!
//! Build-time per-file failures are recovered locally (skip-and-continue,
//! see [`crate::walker`]); everything else propagates to the caller as one
//! of these variants so that an empty result set and a failure are always
//! distinguishable.

use std::path::PathBuf;

use thiserror::Error;

pub type MemexResult<T> = Result<T, MemexError>;

#[derive(Error, Debug)]
pub enum MemexError {
    /// Search or timeline invoked before any successful build.
    #[error("no index found at {path} (run `mx build` first)")]
    IndexMissing { path: PathBuf },

    /// The persisted artifact carries a format version this binary does
    /// not understand. Never silently misinterpreted.
    #[error(
        "index at {path} has unsupported format version {found} (this binary supports {supported})"
    )]
    IncompatibleIndexVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// An explicit id did not resolve to any chunk in the store.
    #[error("unknown chunk id: {0}")]
    UnknownId(String),

    /// A timeline query anchor resolved to nothing above the relevance floor.
    #[error("no anchor found for query \"{query}\"")]
    NoAnchorFound { query: String },

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A single source file could not be read or parsed. Raised only when
    /// a caller asks for one specific file; the build pipeline reports
    /// these per-file and continues.
    #[error("failed to read source {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

//! Mashup Maker - A Rust CLI tool for building audio mashups from searched media
//!
//! This library searches a media provider for a source query, extracts the audio of every
//! downloaded item, trims each track to a fixed length and concatenates the clips into one
//! output file. Intermediate files live in run-scoped staging areas that are always removed.

pub mod cli;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod source;
pub mod stages;
pub mod staging;
pub mod utils;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use media::{FfmpegToolkit, MediaProbe, MediaToolkit};
pub use pipeline::{MashupOutcome, MashupPipeline, RunOptions};
pub use source::{MediaSource, YtDlpSource};
pub use stages::{MergeSummary, StageKind, StageResult, StagedItem};
pub use staging::{StagingArea, StagingScope};
pub use validate::{PipelineRequest, RawArgs, ValidationError};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Fatal outcomes of a pipeline run
///
/// Every stage variant means the stage produced zero usable outputs; per-item failures never
/// surface here, only as reduced counts in a [`StageResult`].
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Acquisition failed: {reason}")]
    Acquisition { reason: String },

    #[error("Audio extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("Trimming failed: {reason}")]
    Trim { reason: String },

    #[error("Merge failed: {reason}")]
    Merge { reason: String },

    #[error("Pipeline cancelled before completion")]
    Cancelled,

    #[error("Could not prepare staging directory: {0}")]
    Staging(String),
}

/// Failure to remove a staging directory. Logged, never returned to callers.
#[derive(thiserror::Error, Debug)]
#[error("Failed to remove staging directory {path}: {source}")]
pub struct CleanupError {
    pub path: std::path::PathBuf,
    #[source]
    pub source: std::io::Error,
}

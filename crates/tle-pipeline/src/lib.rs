//! TLE Ingest Pipeline
//!
//! Drives the archive from the outside world:
//!
//! - [`BulkExtractor`] folds local TLE dumps into the per-object archive and
//!   refreshes the derived-parameter CSVs.
//! - [`FetchRunner`] pulls one day of history at a time from a
//!   [`TleSource`], resuming from the persisted watermark, then hands the
//!   downloads to the extractor under the epoch-watermark policy.
//!
//! Progress, logs and metrics are reported as [`PipelineEvent`]s over an
//! unbounded channel and mirrored to `tracing`.

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod control;
pub mod events;
pub mod extractor;
pub mod fetcher;
pub mod source;
pub mod watermark;

pub use config::PipelineConfig;
pub use control::StopSignal;
pub use events::{event_channel, EventSink, LogLevel, Phase, PipelineEvent, RunSummary};
pub use extractor::BulkExtractor;
pub use fetcher::FetchRunner;
pub use source::{SourceError, SpaceTrackSource, TleQuery, TleSource};
pub use watermark::Watermark;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot create directory {path:?}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No readable input file")]
    NoReadableInput,
    #[error("A run is already in progress")]
    AlreadyRunning,
    #[error("Archive error: {0}")]
    Archive(#[from] tle_archive::ArchiveError),
    #[error("Watermark file {path:?}: {reason}")]
    Watermark { path: PathBuf, reason: String },
    #[error("Config file {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
    #[error("TLE source: {0}")]
    Source(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! TLE Archive
//!
//! One time-ordered archive per tracked object:
//!
//! ```text
//! <objects>/txt/<norad_id>.txt   raw line pairs, oldest first
//! <objects>/csv/<norad_id>.csv   derived parameters, sorted by epoch_utc
//! ```
//!
//! New element sets are folded in with [`merge`] under a [`DedupPolicy`];
//! [`ArchiveStore`] owns the files and serialises writers per object.

use std::path::PathBuf;
use thiserror::Error;

pub mod csv_export;
pub mod merge;
pub mod store;

pub use merge::{merge, DedupPolicy, MergeOutcome};
pub use store::ArchiveStore;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive IO error for NORAD {norad_id}: {source}")]
    Io {
        norad_id: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot create directory {path:?}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot read directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error for NORAD {norad_id}: {source}")]
    Csv {
        norad_id: u32,
        #[source]
        source: csv::Error,
    },
}

impl ArchiveError {
    /// Catalog number of the object the failure belongs to, if any.
    pub fn norad_id(&self) -> Option<u32> {
        match self {
            ArchiveError::Io { norad_id, .. } | ArchiveError::Csv { norad_id, .. } => {
                Some(*norad_id)
            }
            ArchiveError::DirectoryCreation { .. } | ArchiveError::ReadDir { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

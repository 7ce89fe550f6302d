//! Pipeline configuration
//!
//! Defaults, overlaid by an optional JSON file, overlaid by environment
//! variables. Command-line flags are applied last by the binary.

use crate::{PipelineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tle_archive::DedupPolicy;
use tle_elements::ParseOptions;

pub const ENV_OBJECTS_DIR: &str = "TLE_OBJECTS_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the `txt/` and `csv/` archive trees.
    pub objects_dir: PathBuf,
    /// Where fetched `tle_YYYY-MM-DD.txt` files land.
    pub download_dir: PathBuf,
    pub strict_bstar: bool,
    pub verify_checksum: bool,
    /// Pause between catalog requests.
    pub request_delay_secs: u64,
    /// First day to fetch when no watermark exists yet.
    pub fetch_start_date: Option<NaiveDate>,
    /// Overrides the per-command merge policy when set.
    pub dedup_policy: Option<DedupPolicy>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            objects_dir: PathBuf::from("data/objects"),
            download_dir: PathBuf::from("data/downloads"),
            strict_bstar: true,
            verify_checksum: false,
            request_delay_secs: 15,
            fetch_start_date: None,
            dedup_policy: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON file; keys it does not mention keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Defaults, or the file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_OBJECTS_DIR).filter(|v| !v.is_empty()) {
            self.objects_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict_bstar: self.strict_bstar,
            verify_checksum: self.verify_checksum,
            ..ParseOptions::default()
        }
    }

    /// Merge policy for bulk extraction.
    pub fn extract_policy(&self) -> DedupPolicy {
        self.dedup_policy.unwrap_or(DedupPolicy::ExactContent)
    }

    /// Merge policy for the daily fetch.
    pub fn fetch_policy(&self) -> DedupPolicy {
        self.dedup_policy.unwrap_or(DedupPolicy::EpochWatermark)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}

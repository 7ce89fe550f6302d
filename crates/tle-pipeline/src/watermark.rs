//! Last-fetched-date watermark

use crate::{PipelineError, Result};
use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const WATERMARK_FILE: &str = "last_fetched.txt";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// `<objects>/last_fetched.txt`: the first day not fetched yet.
#[derive(Debug, Clone)]
pub struct Watermark {
    path: PathBuf,
}

impl Watermark {
    pub fn in_dir(objects_dir: &Path) -> Self {
        Self {
            path: objects_dir.join(WATERMARK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl ToString) -> PipelineError {
        PipelineError::Watermark {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn read(&self) -> Result<Option<NaiveDate>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path).map_err(|e| self.error(e))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Some)
            .map_err(|e| self.error(format!("{:?}: {}", text, e)))
    }

    pub fn write(&self, date: NaiveDate) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.error(e))?;
        writeln!(tmp, "{}", date.format(DATE_FORMAT)).map_err(|e| self.error(e))?;
        tmp.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }
}

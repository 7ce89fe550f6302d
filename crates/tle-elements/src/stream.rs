//! Parsing of concatenated TLE text (2LE or 3LE)

use crate::record::{ParseOptions, TleRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// A line pair (or lone line) that was not turned into a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry {
    /// 1-based line number of the first offending line.
    pub line_number: usize,
    pub reason: String,
    /// The offending line(s), trailing whitespace removed.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub records: Vec<TleRecord>,
    pub skipped: Vec<SkippedEntry>,
}

impl ParsedBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse every element pair found in `text`.
///
/// Blank lines and name lines are ignored. A `"1 "` line must be directly
/// followed by its `"2 "` line; anything else is reported in
/// [`ParsedBatch::skipped`] and parsing carries on.
pub fn parse_stream(text: &str, options: &ParseOptions) -> ParsedBatch {
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();
    let mut batch = ParsedBatch::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("1 ") {
            match lines.get(i + 1) {
                Some(next) if next.starts_with("2 ") => {
                    match TleRecord::parse_with(line, next, options) {
                        Ok(record) => batch.records.push(record),
                        Err(e) => {
                            debug!("Skipping pair at line {}: {}", i + 1, e);
                            batch.skipped.push(SkippedEntry {
                                line_number: i + 1,
                                reason: e.to_string(),
                                lines: vec![line.to_string(), next.to_string()],
                            });
                        }
                    }
                    i += 2;
                }
                _ => {
                    batch.skipped.push(SkippedEntry {
                        line_number: i + 1,
                        reason: "line 1 without a following line 2".to_string(),
                        lines: vec![line.to_string()],
                    });
                    i += 1;
                }
            }
        } else if line.starts_with("2 ") {
            batch.skipped.push(SkippedEntry {
                line_number: i + 1,
                reason: "line 2 without a preceding line 1".to_string(),
                lines: vec![line.to_string()],
            });
            i += 1;
        } else {
            // Blank or title line.
            i += 1;
        }
    }

    batch
}

/// Group records by catalog number, keeping input order inside each group.
pub fn group_by_norad(records: Vec<TleRecord>) -> BTreeMap<u32, Vec<TleRecord>> {
    let mut groups: BTreeMap<u32, Vec<TleRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.norad_id).or_default().push(record);
    }
    groups
}

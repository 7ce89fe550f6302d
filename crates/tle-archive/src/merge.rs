//! Deduplicating merge of new element sets into an existing archive

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tle_elements::TleRecord;

/// How new records are reconciled with what the archive already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Bulk re-import: drop any pair whose raw lines were already seen,
    /// then re-sort the whole archive.
    #[default]
    ExactContent,
    /// Incremental feed: only records newer than the latest archived epoch
    /// are accepted, one per epoch.
    EpochWatermark,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" | "exact-content" | "exact_content" => Ok(DedupPolicy::ExactContent),
            "watermark" | "epoch-watermark" | "epoch_watermark" => Ok(DedupPolicy::EpochWatermark),
            other => Err(format!(
                "unknown dedup policy {:?} (expected exact-content or epoch-watermark)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// The merged archive, ascending by epoch, epoch-less records first.
    pub records: Vec<TleRecord>,
    /// New records that made it into the archive.
    pub added: usize,
    /// Records dropped as duplicates (or, under the watermark policy, as stale).
    pub duplicates: usize,
    /// Records in the merged archive without a resolved epoch.
    pub anomalies: usize,
}

fn content_key(record: &TleRecord) -> (&str, &str) {
    record.lines()
}

/// Merge `new` into `existing`.
///
/// Both policies are idempotent: merging the same batch twice, or merging
/// an already merged result with either input again, changes nothing.
pub fn merge(existing: &[TleRecord], new: &[TleRecord], policy: DedupPolicy) -> MergeOutcome {
    let (mut records, added, duplicates) = match policy {
        DedupPolicy::ExactContent => merge_exact(existing, new),
        DedupPolicy::EpochWatermark => merge_watermark(existing, new),
    };

    // Stable: ties keep first-seen order.
    records.sort_by_key(|r| r.sort_key());
    let anomalies = records.iter().filter(|r| r.has_epoch_anomaly()).count();

    MergeOutcome {
        records,
        added,
        duplicates,
        anomalies,
    }
}

fn merge_exact(existing: &[TleRecord], new: &[TleRecord]) -> (Vec<TleRecord>, usize, usize) {
    let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(existing.len() + new.len());
    let mut records = Vec::with_capacity(existing.len() + new.len());
    let mut duplicates = 0;

    for record in existing {
        if seen.insert(content_key(record)) {
            records.push(record.clone());
        } else {
            duplicates += 1;
        }
    }

    let mut added = 0;
    for record in new {
        if seen.insert(content_key(record)) {
            records.push(record.clone());
            added += 1;
        } else {
            duplicates += 1;
        }
    }

    (records, added, duplicates)
}

fn merge_watermark(existing: &[TleRecord], new: &[TleRecord]) -> (Vec<TleRecord>, usize, usize) {
    let watermark: Option<DateTime<Utc>> = existing.iter().filter_map(|r| r.epoch).max();
    let archived: HashSet<(&str, &str)> = existing.iter().map(content_key).collect();

    let mut seen_epochs: HashSet<DateTime<Utc>> = HashSet::new();
    let mut seen_content: HashSet<(&str, &str)> = HashSet::new();
    let mut records = existing.to_vec();
    let mut added = 0;

    for record in new {
        let stale = match (record.epoch, watermark) {
            (_, None) => false,
            (Some(epoch), Some(mark)) => epoch <= mark,
            // Epoch-less records sort before any watermark.
            (None, Some(_)) => true,
        };
        if stale || archived.contains(&content_key(record)) {
            continue;
        }

        let fresh = match record.epoch {
            Some(epoch) => seen_epochs.insert(epoch),
            None => seen_content.insert(content_key(record)),
        };
        if fresh {
            records.push(record.clone());
            added += 1;
        }
    }

    (records, added, new.len() - added)
}

//! Derived-parameter CSV files

use crate::merge::DedupPolicy;
use crate::{ArchiveError, Result};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;
use tle_elements::{DerivedParameterRow, TleRecord, CSV_HEADER};
use tracing::debug;

/// Read every row of an existing CSV file; a missing file is an empty one.
pub fn read_rows(path: &Path, norad_id: u32) -> Result<Vec<DerivedParameterRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|source| ArchiveError::Io { norad_id, source })?;
    let mut reader = csv::Reader::from_reader(file);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<DerivedParameterRow>, _>>()
        .map_err(|source| ArchiveError::Csv { norad_id, source })
}

/// Replace `path` with `rows`, header first, via a temp file in the same
/// directory.
pub fn write_rows(path: &Path, norad_id: u32, rows: &[DerivedParameterRow]) -> Result<()> {
    let io_err = |source| ArchiveError::Io { norad_id, source };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;

    {
        // Header comes from the serde field names, or is written by hand
        // when there is no row to derive it from.
        let mut writer = csv::Writer::from_writer(tmp.as_file());
        if rows.is_empty() {
            writer
                .write_record(CSV_HEADER)
                .map_err(|source| ArchiveError::Csv { norad_id, source })?;
        }
        for row in rows {
            writer
                .serialize(row)
                .map_err(|source| ArchiveError::Csv { norad_id, source })?;
        }
        writer.flush().map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Rows from `records` that the CSV does not have yet, in epoch order.
///
/// Epoch-less records have no `epoch_utc` and never produce a row.
pub fn new_rows(
    existing: &[DerivedParameterRow],
    records: &[TleRecord],
    policy: DedupPolicy,
) -> Vec<DerivedParameterRow> {
    let mut known: HashSet<String> = existing.iter().map(|r| r.epoch_utc.clone()).collect();
    let latest = existing.iter().map(|r| r.epoch_utc.as_str()).max();

    let mut rows = Vec::new();
    for record in records {
        if record.has_epoch_anomaly() {
            debug!("NORAD {}: no epoch, not exported", record.norad_id);
            continue;
        }
        let row = DerivedParameterRow::from_record(record);
        let accept = match policy {
            DedupPolicy::ExactContent => !known.contains(&row.epoch_utc),
            DedupPolicy::EpochWatermark => latest.map_or(true, |l| row.epoch_utc.as_str() > l),
        };
        // Second-resolution epochs can collide inside one batch too.
        if accept && known.insert(row.epoch_utc.clone()) {
            rows.push(row);
        }
    }
    rows
}

/// Bring `path` up to date with `records`. Returns the number of rows added.
pub fn sync(path: &Path, norad_id: u32, records: &[TleRecord], policy: DedupPolicy) -> Result<usize> {
    let mut rows = read_rows(path, norad_id)?;
    let fresh = new_rows(&rows, records, policy);
    let added = fresh.len();

    if added == 0 && path.exists() {
        return Ok(0);
    }

    rows.extend(fresh);
    // Fixed-width timestamps: string order is chronological.
    rows.sort_by(|a, b| a.epoch_utc.cmp(&b.epoch_utc));
    write_rows(path, norad_id, &rows)?;
    debug!("NORAD {}: {} CSV rows added", norad_id, added);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const A1: &str = "1 25544U 98067A   24045.50000000  .00016717  00000-0  10270-3 0  9995";
    const A2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.50000000439680";
    const B1: &str = "1 25544U 98067A   24046.25000000  .00016717  00000-0  10270-3 0  9998";
    const B2: &str = "2 25544  51.6417 243.7000 0006710 131.0000 229.1000 15.50010000439801";
    const C1: &str = "1 25544U 98067A   24044.75000000  .00016717  00000-0  10270-3 0  9980";
    const C2: &str = "2 25544  51.6415 251.2000 0006690 129.9000 230.2000 15.49990000439567";

    fn rec(l1: &str, l2: &str) -> TleRecord {
        TleRecord::parse(l1, l2).unwrap()
    }

    #[test]
    fn test_header_and_row_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("25544.csv");

        let added = sync(&path, 25544, &[rec(B1, B2), rec(A1, A2)], DedupPolicy::ExactContent)
            .unwrap();
        assert_eq!(added, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        assert!(lines.next().unwrap().starts_with("2024-02-14 12:00:00,"));
        assert!(lines.next().unwrap().starts_with("2024-02-15 06:00:00,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_exact_policy_skips_known_epochs_and_backfills() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("25544.csv");

        sync(&path, 25544, &[rec(A1, A2)], DedupPolicy::ExactContent).unwrap();
        let added = sync(
            &path,
            25544,
            &[rec(A1, A2), rec(C1, C2), rec(B1, B2)],
            DedupPolicy::ExactContent,
        )
        .unwrap();
        assert_eq!(added, 2);

        let rows = read_rows(&path, 25544).unwrap();
        let epochs: Vec<&str> = rows.iter().map(|r| r.epoch_utc.as_str()).collect();
        assert_eq!(
            epochs,
            vec!["2024-02-13 18:00:00", "2024-02-14 12:00:00", "2024-02-15 06:00:00"]
        );
    }

    #[test]
    fn test_watermark_policy_ignores_older_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("25544.csv");

        sync(&path, 25544, &[rec(A1, A2)], DedupPolicy::EpochWatermark).unwrap();
        let added = sync(
            &path,
            25544,
            &[rec(C1, C2), rec(B1, B2)],
            DedupPolicy::EpochWatermark,
        )
        .unwrap();
        assert_eq!(added, 1);
        assert_eq!(read_rows(&path, 25544).unwrap().len(), 2);
    }

    #[test]
    fn test_rows_survive_a_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("25544.csv");
        let record = rec(A1, A2);

        sync(&path, 25544, &[record.clone()], DedupPolicy::ExactContent).unwrap();
        let rows = read_rows(&path, 25544).unwrap();
        assert_eq!(rows, vec![DerivedParameterRow::from_record(&record)]);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_rows(&dir.path().join("1.csv"), 1).unwrap().is_empty());
    }
}

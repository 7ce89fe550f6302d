//! On-disk archive store

use crate::merge::{merge, DedupPolicy, MergeOutcome};
use crate::{csv_export, ArchiveError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tle_elements::{parse_stream, ParseOptions, TleRecord};
use tracing::{debug, info, warn};

const TXT_DIR: &str = "txt";
const CSV_DIR: &str = "csv";

/// Owner of the `txt/` and `csv/` trees under one objects directory.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct ArchiveStore {
    root: PathBuf,
    txt_dir: PathBuf,
    csv_dir: PathBuf,
    read_options: ParseOptions,
    locks: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

/// Parsed and unparsed content of one archive file.
#[derive(Debug, Default)]
struct ArchiveContents {
    records: Vec<TleRecord>,
    unparsed: Vec<String>,
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ArchiveStore {
    /// Open (creating if needed) the archive rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let txt_dir = root.join(TXT_DIR);
        let csv_dir = root.join(CSV_DIR);

        for dir in [&root, &txt_dir, &csv_dir] {
            fs::create_dir_all(dir).map_err(|source| ArchiveError::DirectoryCreation {
                path: dir.clone(),
                source,
            })?;
        }
        info!("Archive store at {:?}", root);

        Ok(Self {
            root,
            txt_dir,
            csv_dir,
            // Stored history is never dropped over a drag term.
            read_options: ParseOptions::lenient(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn txt_path(&self, norad_id: u32) -> PathBuf {
        self.txt_dir.join(format!("{}.txt", norad_id))
    }

    pub fn csv_path(&self, norad_id: u32) -> PathBuf {
        self.csv_dir.join(format!("{}.csv", norad_id))
    }

    fn object_lock(&self, norad_id: u32) -> Arc<Mutex<()>> {
        let mut locks = lock_ignoring_poison(&self.locks);
        locks.entry(norad_id).or_default().clone()
    }

    /// Catalog numbers with a `txt/` archive, ascending.
    pub fn list_objects(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.txt_dir).map_err(|source| ArchiveError::ReadDir {
            path: self.txt_dir.clone(),
            source,
        })?;

        let mut ids: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "txt" {
                    return None;
                }
                path.file_stem()?.to_str()?.parse().ok()
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Every record archived for `norad_id`, in file order.
    pub fn load(&self, norad_id: u32) -> Result<Vec<TleRecord>> {
        Ok(self.read_archive(norad_id)?.records)
    }

    fn read_archive(&self, norad_id: u32) -> Result<ArchiveContents> {
        let path = self.txt_path(norad_id);
        if !path.exists() {
            return Ok(ArchiveContents::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| ArchiveError::Io { norad_id, source })?;
        let batch = parse_stream(&text, &self.read_options);
        if !batch.skipped.is_empty() {
            warn!(
                "NORAD {}: {} unreadable entries in {:?}, kept verbatim",
                norad_id,
                batch.skipped.len(),
                path
            );
        }
        Ok(ArchiveContents {
            records: batch.records,
            unparsed: batch.skipped.into_iter().flat_map(|s| s.lines).collect(),
        })
    }

    /// Fold `new` into the archive of `norad_id` and persist the result.
    ///
    /// The file is rewritten only when the merged content differs.
    pub fn merge_into(
        &self,
        norad_id: u32,
        new: &[TleRecord],
        policy: DedupPolicy,
    ) -> Result<MergeOutcome> {
        let lock = self.object_lock(norad_id);
        let _guard = lock_ignoring_poison(&lock);

        let existing = self.read_archive(norad_id)?;
        let outcome = merge(&existing.records, new, policy);

        if outcome.records != existing.records || !self.txt_path(norad_id).exists() {
            self.write_archive(norad_id, &existing.unparsed, &outcome.records)?;
        }
        debug!(
            "NORAD {}: {} added, {} duplicates, {} total",
            norad_id,
            outcome.added,
            outcome.duplicates,
            outcome.records.len()
        );
        Ok(outcome)
    }

    /// Regenerate missing derived-parameter rows for `norad_id`.
    pub fn sync_csv(&self, norad_id: u32, policy: DedupPolicy) -> Result<usize> {
        let lock = self.object_lock(norad_id);
        let _guard = lock_ignoring_poison(&lock);

        let records = self.load(norad_id)?;
        csv_export::sync(&self.csv_path(norad_id), norad_id, &records, policy)
    }

    /// Unreadable lines go first, byte for byte, then the records.
    fn write_archive(&self, norad_id: u32, unparsed: &[String], records: &[TleRecord]) -> Result<()> {
        let io_err = |source| ArchiveError::Io { norad_id, source };
        let mut tmp = NamedTempFile::new_in(&self.txt_dir).map_err(io_err)?;
        for line in unparsed {
            writeln!(tmp, "{}", line).map_err(io_err)?;
        }
        for record in records {
            tmp.write_all(record.to_tle_text().as_bytes()).map_err(io_err)?;
        }
        tmp.flush().map_err(io_err)?;
        tmp.persist(self.txt_path(norad_id)).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
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
    fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path().join("objects")).unwrap();
        assert!(store.root().join("txt").is_dir());
        assert!(store.root().join("csv").is_dir());
        assert!(store.list_objects().unwrap().is_empty());
    }

    #[test]
    fn test_merge_into_writes_chronological_pairs() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();

        store
            .merge_into(25544, &[rec(B1, B2), rec(A1, A2)], DedupPolicy::ExactContent)
            .unwrap();
        let outcome = store
            .merge_into(25544, &[rec(C1, C2), rec(A1, A2)], DedupPolicy::ExactContent)
            .unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.duplicates, 1);

        let text = fs::read_to_string(store.txt_path(25544)).unwrap();
        assert_eq!(text, format!("{C1}\n{C2}\n{A1}\n{A2}\n{B1}\n{B2}\n"));
        assert_eq!(store.list_objects().unwrap(), vec![25544]);
    }

    #[test]
    fn test_reimport_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let batch = [rec(A1, A2), rec(B1, B2)];

        store.merge_into(25544, &batch, DedupPolicy::ExactContent).unwrap();
        let before = fs::metadata(store.txt_path(25544)).unwrap().modified().unwrap();
        let outcome = store.merge_into(25544, &batch, DedupPolicy::ExactContent).unwrap();
        let after = fs::metadata(store.txt_path(25544)).unwrap().modified().unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(before, after);
    }

    #[test]
    fn test_sync_csv_follows_archive() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        store
            .merge_into(25544, &[rec(A1, A2), rec(B1, B2)], DedupPolicy::ExactContent)
            .unwrap();

        assert_eq!(store.sync_csv(25544, DedupPolicy::ExactContent).unwrap(), 2);
        assert_eq!(store.sync_csv(25544, DedupPolicy::ExactContent).unwrap(), 0);
        assert!(store.csv_path(25544).exists());
    }

    #[test]
    fn test_concurrent_merges_on_one_object() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArchiveStore::open(dir.path()).unwrap());
        let batches = [vec![rec(A1, A2)], vec![rec(B1, B2)], vec![rec(C1, C2)]];

        thread::scope(|s| {
            for batch in &batches {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    store
                        .merge_into(25544, batch, DedupPolicy::ExactContent)
                        .unwrap();
                });
            }
        });

        let records = store.load(25544).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key()));
    }

    #[test]
    fn test_lenient_reread_keeps_bad_bstar() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let broken = A1.replace("10270-3", "1027x-3");
        fs::write(store.txt_path(25544), format!("{}\n{}\n", broken, A2)).unwrap();

        let records = store.load(25544).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bstar, 0.0);
    }

    #[test]
    fn test_unparsed_pairs_survive_a_merge() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let bad_a2 = A2.replace("51.6416", "51.64x6");
        fs::write(store.txt_path(25544), format!("{}\n{}\n", A1, bad_a2)).unwrap();

        let outcome = store
            .merge_into(25544, &[rec(B1, B2)], DedupPolicy::ExactContent)
            .unwrap();
        assert_eq!(outcome.added, 1);
        let expected = format!("{A1}\n{bad_a2}\n{B1}\n{B2}\n");
        assert_eq!(fs::read_to_string(store.txt_path(25544)).unwrap(), expected);

        store
            .merge_into(25544, &[rec(B1, B2)], DedupPolicy::ExactContent)
            .unwrap();
        assert_eq!(fs::read_to_string(store.txt_path(25544)).unwrap(), expected);
        assert_eq!(store.load(25544).unwrap().len(), 1);
    }

    #[test]
    fn test_list_objects_reports_missing_txt_dir() {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        fs::remove_dir_all(dir.path().join("txt")).unwrap();

        assert!(matches!(
            store.list_objects(),
            Err(ArchiveError::ReadDir { .. })
        ));
    }
}

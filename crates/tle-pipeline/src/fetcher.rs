//! Resumable day-by-day fetch from an external catalog

use crate::config::PipelineConfig;
use crate::control::{RunGuard, StopSignal};
use crate::events::{percent, EventSink, Phase, PipelineEvent, RunSummary};
use crate::extractor::BulkExtractor;
use crate::source::{SourceError, TleQuery, TleSource};
use crate::watermark::Watermark;
use crate::{PipelineError, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tle_archive::ArchiveStore;

const DOWNLOAD_PREFIX: &str = "tle_";

pub struct FetchRunner {
    download_dir: PathBuf,
    watermark: Watermark,
    start_date: Option<NaiveDate>,
    norad_ids: Vec<u32>,
    request_delay: Duration,
    extractor: BulkExtractor,
    stop: StopSignal,
    today: Box<dyn Fn() -> NaiveDate + Send + Sync>,
    running: AtomicBool,
}

/// `tle_YYYY-MM-DD.txt` files in `dir`, oldest first.
pub fn downloaded_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(DOWNLOAD_PREFIX) && n.ends_with(".txt"))
        })
        .collect();
    files.sort();
    files
}

impl FetchRunner {
    pub fn new(store: Arc<ArchiveStore>, config: &PipelineConfig) -> Self {
        let stop = StopSignal::new();
        let watermark = Watermark::in_dir(store.root());
        let extractor = BulkExtractor::new(store, config.parse_options())
            .with_policy(config.fetch_policy())
            .with_stop_signal(stop.clone());

        Self {
            download_dir: config.download_dir.clone(),
            watermark,
            start_date: config.fetch_start_date,
            norad_ids: Vec::new(),
            request_delay: config.request_delay(),
            extractor,
            stop,
            today: Box::new(|| Utc::now().date_naive()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_norad_ids(mut self, norad_ids: &[u32]) -> Self {
        self.norad_ids = norad_ids.to_vec();
        self
    }

    /// Override "today", the exclusive end of the fetch range.
    pub fn with_today(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Fetch every day from the watermark up to yesterday, then fold all
    /// downloaded files into the archive.
    pub fn run(&self, source: &mut dyn TleSource, sink: &EventSink) -> Result<RunSummary> {
        let _guard = RunGuard::acquire(&self.running).ok_or(PipelineError::AlreadyRunning)?;

        fs::create_dir_all(&self.download_dir).map_err(|source| {
            PipelineError::DirectoryCreation {
                path: self.download_dir.clone(),
                source,
            }
        })?;

        source.authenticate()?;
        sink.info("Authenticated with TLE source");

        let today = (self.today)();
        let mut summary = RunSummary::default();
        let start = match self.watermark.read()?.or(self.start_date) {
            Some(date) => date,
            None => {
                let yesterday = today - ChronoDuration::days(1);
                sink.info(format!("No watermark or start date, fetching from {}", yesterday));
                yesterday
            }
        };

        summary.days_fetched = self.fetch_days(source, start, today, sink)?;
        sink.progress(Phase::Fetch, 100);

        if self.stop.is_stopped() {
            summary.cancelled = true;
        } else {
            let files = downloaded_files(&self.download_dir);
            if files.is_empty() {
                sink.warn("No TLE files found to process");
            } else {
                let processed = self.extractor.process(&files, sink)?;
                summary = RunSummary {
                    days_fetched: summary.days_fetched,
                    ..processed
                };
            }
        }

        sink.progress(Phase::Extract, 100);
        sink.progress(Phase::Convert, 100);
        sink.emit(PipelineEvent::Finished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Returns the number of days the watermark advanced by.
    fn fetch_days(
        &self,
        source: &mut dyn TleSource,
        start: NaiveDate,
        today: NaiveDate,
        sink: &EventSink,
    ) -> Result<usize> {
        let total_days = (today - start).num_days().max(0) as f64;
        let mut current = start;
        let mut fetched = 0;

        while current < today {
            if self.stop.is_stopped() {
                break;
            }

            let query = TleQuery::day(current).with_norad_ids(&self.norad_ids);
            sink.info(format!("Fetching TLEs for {}", current));

            match source.fetch(&query) {
                Ok(text) => {
                    let name = format!("{}{}.txt", DOWNLOAD_PREFIX, current.format("%Y-%m-%d"));
                    let path = self.download_dir.join(&name);
                    if let Err(e) = fs::write(&path, text) {
                        // Keep the watermark so the day is fetched again.
                        sink.error(format!("Cannot save {}: {}", name, e));
                        break;
                    }
                    sink.info(format!("Downloaded {}", name));
                }
                Err(SourceError::EmptyResult(_)) => {
                    sink.warn(format!("No data for {}", current));
                }
                Err(e) => {
                    sink.error(format!("Failed to fetch {}: {}", current, e));
                    break;
                }
            }

            current = current + ChronoDuration::days(1);
            fetched += 1;
            self.watermark.write(current)?;
            sink.emit(PipelineEvent::WatermarkAdvanced { date: current });
            sink.progress(Phase::Fetch, percent(fetched as f64, total_days));

            if current < today && !self.stop.sleep(self.request_delay) {
                break;
            }
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const A1: &str = "1 25544U 98067A   24045.50000000  .00016717  00000-0  10270-3 0  9995";
    const A2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.50000000439680";
    const B1: &str = "1 25544U 98067A   24046.25000000  .00016717  00000-0  10270-3 0  9998";
    const B2: &str = "2 25544  51.6417 243.7000 0006710 131.0000 229.1000 15.50010000439801";
    const C1: &str = "1 25544U 98067A   24044.75000000  .00016717  00000-0  10270-3 0  9980";
    const C2: &str = "2 25544  51.6415 251.2000 0006690 129.9000 230.2000 15.49990000439567";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Default)]
    struct MockSource {
        days: HashMap<NaiveDate, std::result::Result<String, SourceError>>,
        fail_login: bool,
        requested: Vec<NaiveDate>,
    }

    impl TleSource for MockSource {
        fn authenticate(&mut self) -> std::result::Result<(), SourceError> {
            if self.fail_login {
                Err(SourceError::Authentication("bad password".to_string()))
            } else {
                Ok(())
            }
        }

        fn fetch(&mut self, query: &TleQuery) -> std::result::Result<String, SourceError> {
            self.requested.push(query.start);
            self.days
                .get(&query.start)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::EmptyResult(query.to_string())))
        }
    }

    fn runner(dir: &TempDir, start: NaiveDate, today: NaiveDate) -> (Arc<ArchiveStore>, FetchRunner) {
        let store = Arc::new(ArchiveStore::open(dir.path().join("objects")).unwrap());
        let config = PipelineConfig {
            objects_dir: dir.path().join("objects"),
            download_dir: dir.path().join("downloads"),
            request_delay_secs: 0,
            fetch_start_date: Some(start),
            ..PipelineConfig::default()
        };
        let runner = FetchRunner::new(Arc::clone(&store), &config).with_today(move || today);
        (store, runner)
    }

    #[tokio::test]
    async fn test_fetches_each_day_and_advances_watermark() {
        let dir = TempDir::new().unwrap();
        let (store, runner) = runner(&dir, date(2024, 2, 13), date(2024, 2, 16));

        let mut source = MockSource::default();
        source.days.insert(date(2024, 2, 13), Ok(format!("{A1}\n{A2}\n")));
        source.days.insert(date(2024, 2, 15), Ok(format!("{C1}\n{C2}\n{B1}\n{B2}\n")));

        let (sink, mut rx) = event_channel();
        let summary = runner.run(&mut source, &sink).unwrap();
        drop(sink);

        assert_eq!(
            source.requested,
            vec![date(2024, 2, 13), date(2024, 2, 14), date(2024, 2, 15)]
        );
        assert_eq!(summary.days_fetched, 3);
        assert_eq!(runner.watermark().read().unwrap(), Some(date(2024, 2, 16)));
        assert_eq!(downloaded_files(&dir.path().join("downloads")).len(), 2);

        // C is older than the archived A once A is in: dropped by the watermark.
        let archived = store.load(25544).unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0].line1(), A1);
        assert_eq!(archived[1].line1(), B1);

        let mut advanced = Vec::new();
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::WatermarkAdvanced { date } = event {
                advanced.push(date);
            }
        }
        assert_eq!(advanced, vec![date(2024, 2, 14), date(2024, 2, 15), date(2024, 2, 16)]);
    }

    #[test]
    fn test_resumes_from_watermark() {
        let dir = TempDir::new().unwrap();
        let (_store, runner) = runner(&dir, date(2024, 1, 1), date(2024, 2, 16));
        runner.watermark().write(date(2024, 2, 15)).unwrap();

        let mut source = MockSource::default();
        runner.run(&mut source, &EventSink::log_only()).unwrap();
        assert_eq!(source.requested, vec![date(2024, 2, 15)]);
    }

    #[test]
    fn test_transport_error_keeps_watermark() {
        let dir = TempDir::new().unwrap();
        let (_store, runner) = runner(&dir, date(2024, 2, 13), date(2024, 2, 16));

        let mut source = MockSource::default();
        source.days.insert(
            date(2024, 2, 14),
            Err(SourceError::Transport("connection reset".to_string())),
        );

        let summary = runner.run(&mut source, &EventSink::log_only()).unwrap();
        assert_eq!(summary.days_fetched, 1);
        assert_eq!(runner.watermark().read().unwrap(), Some(date(2024, 2, 14)));
    }

    #[test]
    fn test_failed_login_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (_store, runner) = runner(&dir, date(2024, 2, 13), date(2024, 2, 16));
        let mut source = MockSource {
            fail_login: true,
            ..MockSource::default()
        };

        assert!(matches!(
            runner.run(&mut source, &EventSink::log_only()),
            Err(PipelineError::Source(SourceError::Authentication(_)))
        ));
        assert!(source.requested.is_empty());
    }

    #[test]
    fn test_stop_prevents_requests() {
        let dir = TempDir::new().unwrap();
        let (_store, runner) = runner(&dir, date(2024, 2, 13), date(2024, 2, 16));
        runner.stop_signal().stop();

        let mut source = MockSource::default();
        let summary = runner.run(&mut source, &EventSink::log_only()).unwrap();
        assert!(summary.cancelled);
        assert!(source.requested.is_empty());
        assert_eq!(runner.watermark().read().unwrap(), None);
    }
}

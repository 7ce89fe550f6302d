//! Bulk extraction of TLE dumps into the per-object archive

use crate::control::{RunGuard, StopSignal};
use crate::events::{percent, EventSink, Phase, PipelineEvent, RunSummary};
use crate::{PipelineError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tle_archive::{ArchiveStore, DedupPolicy};
use tle_elements::{group_by_norad, parse_stream, ParseOptions};

pub struct BulkExtractor {
    store: Arc<ArchiveStore>,
    options: ParseOptions,
    policy: DedupPolicy,
    stop: StopSignal,
    running: AtomicBool,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl BulkExtractor {
    pub fn new(store: Arc<ArchiveStore>, options: ParseOptions) -> Self {
        Self {
            store,
            options,
            policy: DedupPolicy::ExactContent,
            stop: StopSignal::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_policy(mut self, policy: DedupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Process every input file, then report [`PipelineEvent::Finished`].
    ///
    /// Unreadable files and objects that fail to merge are logged and
    /// skipped. The run fails only when no input could be read at all.
    pub fn run(&self, inputs: &[PathBuf], sink: &EventSink) -> Result<RunSummary> {
        let _guard = RunGuard::acquire(&self.running).ok_or(PipelineError::AlreadyRunning)?;

        let summary = self.process(inputs, sink)?;
        sink.progress(Phase::Extract, 100);
        sink.progress(Phase::Convert, 100);
        if summary.cancelled {
            sink.warn("Extraction stopped before all files were processed");
        } else {
            sink.info("All files processed");
        }
        sink.emit(PipelineEvent::Finished {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    pub(crate) fn process(&self, inputs: &[PathBuf], sink: &EventSink) -> Result<RunSummary> {
        if inputs.is_empty() {
            return Err(PipelineError::NoReadableInput);
        }

        let total_files = inputs.len() as f64;
        let mut summary = RunSummary::default();
        let mut unique = BTreeSet::new();
        let mut readable = 0;

        for (file_index, path) in inputs.iter().enumerate() {
            if self.stop.is_stopped() {
                summary.cancelled = true;
                break;
            }
            let name = display_name(path);
            let done = (file_index + 1) as f64;
            sink.info(format!("Processing file: {}", name));

            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    sink.warn(format!("Cannot read {}: {}", name, e));
                    summary.files_skipped += 1;
                    sink.progress(Phase::Extract, percent(done, total_files));
                    sink.progress(Phase::Convert, percent(done, total_files));
                    continue;
                }
            };
            readable += 1;

            let batch = parse_stream(&text, &self.options);
            for skipped in &batch.skipped {
                sink.warn(format!(
                    "{}: skipped entry at line {}: {}",
                    name, skipped.line_number, skipped.reason
                ));
            }
            if batch.records.is_empty() {
                sink.warn(format!("No TLE data found in {}", name));
                summary.files_skipped += 1;
                sink.progress(Phase::Extract, percent(done, total_files));
                sink.progress(Phase::Convert, percent(done, total_files));
                continue;
            }

            summary.total_tles += batch.records.len();
            let groups = group_by_norad(batch.records);

            let mut touched = Vec::with_capacity(groups.len());
            for (norad_id, records) in &groups {
                if self.stop.is_stopped() {
                    summary.cancelled = true;
                    break;
                }
                match self.store.merge_into(*norad_id, records, self.policy) {
                    Ok(outcome) => {
                        summary.records_added += outcome.added;
                        touched.push(*norad_id);
                    }
                    Err(e) => {
                        sink.warn(format!("NORAD {}: merge failed: {}", norad_id, e));
                        summary.failed_objects += 1;
                    }
                }
            }
            sink.info(format!("Extracted {} NORAD objects from {}", touched.len(), name));
            sink.progress(Phase::Extract, percent(done, total_files));

            let converted = self.convert(&touched, file_index, total_files, &mut summary, sink);
            sink.info(format!(
                "Converted {}/{} objects to CSV from {}",
                converted,
                touched.len(),
                name
            ));

            unique.extend(touched);
            summary.files_processed += 1;
            summary.unique_objects = unique.len();
            sink.metrics(summary.total_tles, summary.unique_objects);

            if summary.cancelled {
                break;
            }
        }

        if readable == 0 && !summary.cancelled {
            return Err(PipelineError::NoReadableInput);
        }
        Ok(summary)
    }

    fn convert(
        &self,
        norad_ids: &[u32],
        file_index: usize,
        total_files: f64,
        summary: &mut RunSummary,
        sink: &EventSink,
    ) -> usize {
        let mut converted = 0;
        let total = norad_ids.len() as f64;

        for (i, norad_id) in norad_ids.iter().enumerate() {
            if self.stop.is_stopped() {
                summary.cancelled = true;
                break;
            }
            match self.store.sync_csv(*norad_id, self.policy) {
                Ok(rows) => {
                    summary.csv_rows_added += rows;
                    converted += 1;
                }
                Err(e) => {
                    sink.warn(format!("NORAD {}: CSV conversion failed: {}", norad_id, e));
                    summary.failed_objects += 1;
                }
            }
            let file_fraction = (i + 1) as f64 / total;
            sink.progress(
                Phase::Convert,
                percent(file_index as f64 + file_fraction, total_files),
            );
        }
        converted
    }
}

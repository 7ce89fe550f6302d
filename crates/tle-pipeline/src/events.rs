//! Pipeline events
//!
//! Every event is mirrored to `tracing` before it is queued, so a run with
//! no listener still leaves a complete log.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Fetch,
    Extract,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Totals of one extractor or fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub total_tles: usize,
    pub unique_objects: usize,
    pub records_added: usize,
    pub csv_rows_added: usize,
    pub failed_objects: usize,
    pub days_fetched: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    Log { level: LogLevel, message: String },
    Progress { phase: Phase, percent: u8 },
    Metrics { total_tles: usize, unique_objects: usize },
    WatermarkAdvanced { date: NaiveDate },
    Finished { summary: RunSummary },
}

/// Sending half handed to the orchestrators. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<PipelineEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, rx)
}

impl EventSink {
    /// Sink that only logs.
    pub fn log_only() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::Log { level, message } => match level {
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            },
            PipelineEvent::Progress { phase, percent } => debug!("{:?} {}%", phase, percent),
            PipelineEvent::Metrics {
                total_tles,
                unique_objects,
            } => info!("{} TLEs, {} objects", total_tles, unique_objects),
            PipelineEvent::WatermarkAdvanced { date } => info!("Last fetched date is now {}", date),
            PipelineEvent::Finished { summary } => info!("Run finished: {:?}", summary),
        }

        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening; the log above stays.
            let _ = tx.send(event);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Log {
            level: LogLevel::Info,
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Log {
            level: LogLevel::Warn,
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Log {
            level: LogLevel::Error,
            message: message.into(),
        });
    }

    pub fn progress(&self, phase: Phase, percent: u8) {
        self.emit(PipelineEvent::Progress {
            phase,
            percent: percent.min(100),
        });
    }

    pub fn metrics(&self, total_tles: usize, unique_objects: usize) {
        self.emit(PipelineEvent::Metrics {
            total_tles,
            unique_objects,
        });
    }
}

/// `done` of `total` as a whole percentage, truncated.
pub fn percent(done: f64, total: f64) -> u8 {
    if total <= 0.0 {
        return 100;
    }
    ((done / total) * 100.0).clamp(0.0, 100.0) as u8
}

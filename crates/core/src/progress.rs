//! Progress event streaming and metrics collection
//!
//! This module provides structured progress events for the phases and hook
//! invocations of an environment run, plus in-memory metrics collection with
//! histogram aggregation.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Global event ID counter for deterministic ordering
pub static EVENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Tracker shared between the timer and the task executor; `None` disables tracking
pub type SharedProgressTracker = Arc<Mutex<Option<ProgressTracker>>>;

/// Progress event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Timed phase events
    #[serde(rename = "phase.begin")]
    PhaseBegin {
        id: u64,
        timestamp: u64,
        phase: String,
    },
    #[serde(rename = "phase.end")]
    PhaseEnd {
        id: u64,
        timestamp: u64,
        phase: String,
        duration_ms: u64,
    },

    /// Single hook invocation events
    #[serde(rename = "hook.begin")]
    HookBegin {
        id: u64,
        timestamp: u64,
        origin: String,
        hook: String,
    },
    #[serde(rename = "hook.end")]
    HookEnd {
        id: u64,
        timestamp: u64,
        origin: String,
        hook: String,
        duration_ms: u64,
        success: bool,
    },
}

impl ProgressEvent {
    /// Returns the unique identifier for this event.
    ///
    /// ```
    /// use stackenv_core::progress::ProgressEvent;
    /// let ev = ProgressEvent::PhaseBegin { id: 42, timestamp: 0, phase: "initEnvPlatform".into() };
    /// assert_eq!(ev.id(), 42);
    /// ```
    pub fn id(&self) -> u64 {
        match self {
            ProgressEvent::PhaseBegin { id, .. } => *id,
            ProgressEvent::PhaseEnd { id, .. } => *id,
            ProgressEvent::HookBegin { id, .. } => *id,
            ProgressEvent::HookEnd { id, .. } => *id,
        }
    }

    /// Milliseconds since the Unix epoch at which the event was created
    pub fn timestamp(&self) -> u64 {
        match self {
            ProgressEvent::PhaseBegin { timestamp, .. } => *timestamp,
            ProgressEvent::PhaseEnd { timestamp, .. } => *timestamp,
            ProgressEvent::HookBegin { timestamp, .. } => *timestamp,
            ProgressEvent::HookEnd { timestamp, .. } => *timestamp,
        }
    }
}

/// Duration histogram for collecting timing metrics
#[derive(Debug, Clone)]
pub struct DurationHistogram {
    buckets: Vec<Duration>,
    counts: Vec<u64>,
    total_count: u64,
    total_duration: Duration,
}

impl DurationHistogram {
    /// Constructs a histogram with thresholds from 10ms up to 300s.
    ///
    /// An extra overflow bucket collects durations greater than the largest threshold.
    ///
    /// ```
    /// use stackenv_core::progress::DurationHistogram;
    /// let hist = DurationHistogram::new();
    /// assert_eq!(hist.summary().count, 0);
    /// ```
    pub fn new() -> Self {
        let buckets = vec![
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(60),
            Duration::from_secs(300),
        ];
        let counts = vec![0; buckets.len() + 1]; // +1 for values > max bucket

        Self {
            buckets,
            counts,
            total_count: 0,
            total_duration: Duration::ZERO,
        }
    }

    /// Records a duration into the first bucket whose threshold is >= `duration`
    pub fn record(&mut self, duration: Duration) {
        self.total_count += 1;
        self.total_duration += duration;

        let bucket_index = self
            .buckets
            .iter()
            .position(|threshold| duration <= *threshold)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_index] += 1;
    }

    /// Returns a serializable summary of the recorded durations
    pub fn summary(&self) -> HistogramSummary {
        let avg_duration = if self.total_count > 0 {
            self.total_duration / self.total_count as u32
        } else {
            Duration::ZERO
        };

        HistogramSummary {
            count: self.total_count,
            total_duration: self.total_duration,
            avg_duration,
            buckets: self
                .buckets
                .iter()
                .zip(self.counts.iter())
                .map(|(threshold, count)| BucketSummary {
                    threshold_ms: threshold.as_millis() as u64,
                    count: *count,
                })
                .collect(),
            overflow_count: self.counts[self.buckets.len()],
        }
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a duration histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Total number of events recorded
    pub count: u64,
    /// Sum of all recorded durations
    pub total_duration: Duration,
    /// Average duration per event
    pub avg_duration: Duration,
    /// Per-bucket statistics
    pub buckets: Vec<BucketSummary>,
    /// Number of events that exceeded the largest bucket threshold
    pub overflow_count: u64,
}

/// Summary for a single histogram bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSummary {
    /// Maximum duration (in milliseconds) for events in this bucket
    pub threshold_ms: u64,
    /// Number of events that fall within this bucket
    pub count: u64,
}

/// In-memory metrics collection
#[derive(Debug, Default)]
pub struct Metrics {
    histograms: HashMap<String, DurationHistogram>,
}

impl Metrics {
    /// Create a new, empty Metrics collection.
    ///
    /// ```
    /// use std::time::Duration;
    /// use stackenv_core::progress::Metrics;
    /// let mut metrics = Metrics::new();
    /// metrics.record_duration("initEnvPlatform", Duration::from_millis(15));
    /// assert!(metrics.summary().histograms.contains_key("initEnvPlatform"));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration for the named operation, creating its histogram if needed
    pub fn record_duration(&mut self, operation: &str, duration: Duration) {
        let histogram = self.histograms.entry(operation.to_string()).or_default();
        histogram.record(duration);
        debug!("Recorded {} duration: {:?}", operation, duration);
    }

    /// Snapshot of all recorded histograms
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            histograms: self
                .histograms
                .iter()
                .map(|(name, histogram)| (name.clone(), histogram.summary()))
                .collect(),
        }
    }
}

/// Summary of all collected metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub histograms: HashMap<String, HistogramSummary>,
}

/// Progress event emitter and metrics collector
#[derive(Debug)]
pub struct ProgressTracker {
    emitter: Option<Box<dyn ProgressEmitter>>,
    metrics: Arc<Mutex<Metrics>>,
}

impl ProgressTracker {
    /// Creates a tracker; `None` disables event emission but metrics are still kept.
    pub fn new(emitter: Option<Box<dyn ProgressEmitter>>) -> Self {
        Self {
            emitter,
            metrics: Arc::new(Mutex::new(Metrics::new())),
        }
    }

    /// Dispatches a progress event to the configured emitter.
    ///
    /// Hook end events also record the hook's duration under `hook.<name>`.
    ///
    /// ```
    /// use stackenv_core::progress::{ProgressEvent, ProgressTracker, SilentEmitter};
    /// let mut tracker = ProgressTracker::new(Some(Box::new(SilentEmitter)));
    /// let event = ProgressEvent::PhaseBegin {
    ///     id: ProgressTracker::next_event_id(),
    ///     timestamp: ProgressTracker::current_timestamp(),
    ///     phase: "initEnvCategories".into(),
    /// };
    /// tracker.emit_event(event).unwrap();
    /// ```
    pub fn emit_event(&mut self, event: ProgressEvent) -> Result<()> {
        if let ProgressEvent::HookEnd {
            hook, duration_ms, ..
        } = &event
        {
            self.record_duration(
                &format!("hook.{}", hook),
                Duration::from_millis(*duration_ms),
            );
        }
        if let Some(ref mut emitter) = self.emitter {
            emitter.emit(&event)?;
        }
        Ok(())
    }

    /// Records a duration for an operation; a poisoned metrics lock makes this a no-op
    pub fn record_duration(&self, operation: &str, duration: Duration) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_duration(operation, duration);
        }
    }

    /// Snapshot of recorded metrics, `None` if the metrics lock is poisoned
    pub fn metrics_summary(&self) -> Option<MetricsSummary> {
        self.metrics.lock().ok().map(|metrics| metrics.summary())
    }

    /// Returns a unique event identifier and advances the global counter
    pub fn next_event_id() -> u64 {
        EVENT_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    /// Current wall-clock time in milliseconds since the Unix epoch (0 if the clock is earlier)
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Trait for progress event emission
pub trait ProgressEmitter: Send + Sync + std::fmt::Debug {
    /// Emit a progress event
    fn emit(&mut self, event: &ProgressEvent) -> Result<()>;
}

/// JSON line emitter that writes to a file
#[derive(Debug)]
pub struct JsonFileEmitter {
    writer: BufWriter<File>,
}

impl JsonFileEmitter {
    /// Open `file_path` in append mode, creating it and its parent directory if needed
    pub fn new(file_path: &Path) -> Result<Self> {
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ProgressEmitter for JsonFileEmitter {
    fn emit(&mut self, event: &ProgressEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Silent emitter that discards all events
#[derive(Debug)]
pub struct SilentEmitter;

impl ProgressEmitter for SilentEmitter {
    fn emit(&mut self, _event: &ProgressEvent) -> Result<()> {
        Ok(())
    }
}

/// Emit an event through a shared tracker, logging instead of failing on emitter errors
pub fn emit_shared(tracker: &SharedProgressTracker, event: ProgressEvent) {
    if let Ok(mut guard) = tracker.lock() {
        if let Some(tracker) = guard.as_mut() {
            if let Err(e) = tracker.emit_event(event) {
                warn!("Failed to emit progress event: {}", e);
            }
        }
    }
}

/// Create a progress tracker writing JSON lines to `progress_file`, or a metrics-only one
pub fn create_progress_tracker(progress_file: Option<&Path>) -> Result<ProgressTracker> {
    let emitter: Box<dyn ProgressEmitter> = match progress_file {
        Some(path) => Box::new(JsonFileEmitter::new(path)?),
        None => Box::new(SilentEmitter),
    };
    Ok(ProgressTracker::new(Some(emitter)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_event_id_generation() {
        let id1 = ProgressTracker::next_event_id();
        let id2 = ProgressTracker::next_event_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_phase_event_serialization() {
        let event = ProgressEvent::PhaseEnd {
            id: 7,
            timestamp: 1234567890,
            phase: "initEnvPlatform".to_string(),
            duration_ms: 250,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"phase.end\""));
        assert!(json.contains("initEnvPlatform"));

        let deserialized: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
        assert_eq!(deserialized.timestamp(), 1234567890);
    }

    #[test]
    fn test_histogram() {
        let mut histogram = DurationHistogram::new();

        histogram.record(Duration::from_millis(25));
        histogram.record(Duration::from_millis(75));
        histogram.record(Duration::from_secs(400));

        let summary = histogram.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.overflow_count, 1);
        assert_eq!(summary.buckets[1].count, 1);
        assert_eq!(summary.buckets[2].count, 1);
    }

    #[test]
    fn test_tracker_records_metrics() {
        let tracker = ProgressTracker::new(None);
        tracker.record_duration("initEnvCategories", Duration::from_millis(5));
        tracker.record_duration("initEnvCategories", Duration::from_millis(15));

        let summary = tracker.metrics_summary().unwrap();
        assert_eq!(summary.histograms["initEnvCategories"].count, 2);
    }

    #[test]
    fn test_hook_end_records_duration() {
        let mut tracker = ProgressTracker::new(None);
        tracker
            .emit_event(ProgressEvent::HookEnd {
                id: ProgressTracker::next_event_id(),
                timestamp: ProgressTracker::current_timestamp(),
                origin: "provider 'local'".to_string(),
                hook: "initEnv".to_string(),
                duration_ms: 12,
                success: true,
            })
            .unwrap();

        let summary = tracker.metrics_summary().unwrap();
        assert_eq!(summary.histograms["hook.initEnv"].count, 1);
    }

    #[test]
    fn test_json_file_emitter_appends_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("progress.jsonl");

        let mut tracker = create_progress_tracker(Some(&path)).unwrap();
        for phase in ["initEnvPlatform", "initEnvCategories"] {
            tracker
                .emit_event(ProgressEvent::PhaseBegin {
                    id: ProgressTracker::next_event_id(),
                    timestamp: ProgressTracker::current_timestamp(),
                    phase: phase.to_string(),
                })
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ProgressEvent = serde_json::from_str(lines[0]).unwrap();
        assert!(matches!(first, ProgressEvent::PhaseBegin { ref phase, .. } if phase == "initEnvPlatform"));
    }
}

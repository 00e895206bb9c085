//! Phase timing
//!
//! Named code-path timers bracket the provider and category initialization
//! phases. [`time_phase`] starts a timer before the wrapped future runs and
//! stops it through a drop guard, so the stop is recorded whether the phase
//! succeeds, fails, panics or is cancelled.

use crate::progress::{
    emit_shared, Metrics, MetricsSummary, ProgressEvent, ProgressTracker, SharedProgressTracker,
};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Timer identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodePathTimer {
    InitEnvPlatform,
    InitEnvCategories,
}

impl CodePathTimer {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePathTimer::InitEnvPlatform => "initEnvPlatform",
            CodePathTimer::InitEnvCategories => "initEnvCategories",
        }
    }
}

impl fmt::Display for CodePathTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage telemetry sink
pub trait Telemetry: Send + Sync {
    fn start_code_path_timer(&self, timer: CodePathTimer);
    fn stop_code_path_timer(&self, timer: CodePathTimer);
}

/// Stops the timer when dropped
struct TimerGuard<'a> {
    telemetry: &'a dyn Telemetry,
    timer: CodePathTimer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.telemetry.stop_code_path_timer(self.timer);
    }
}

/// Run `phase` bracketed by `timer`, returning its output unchanged
pub async fn time_phase<F, T>(telemetry: &dyn Telemetry, timer: CodePathTimer, phase: F) -> T
where
    F: Future<Output = T>,
{
    telemetry.start_code_path_timer(timer);
    let _guard = TimerGuard { telemetry, timer };
    phase.await
}

/// Telemetry recording phase durations and emitting phase progress events
#[derive(Debug, Default)]
pub struct UsageTimers {
    started: Mutex<HashMap<CodePathTimer, Instant>>,
    metrics: Mutex<Metrics>,
    progress: Option<SharedProgressTracker>,
}

impl UsageTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: SharedProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Durations recorded so far
    pub fn metrics_summary(&self) -> Option<MetricsSummary> {
        self.metrics.lock().ok().map(|metrics| metrics.summary())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            emit_shared(progress, event);
        }
    }
}

impl Telemetry for UsageTimers {
    fn start_code_path_timer(&self, timer: CodePathTimer) {
        if let Ok(mut started) = self.started.lock() {
            started.insert(timer, Instant::now());
        }
        debug!("Started timer {}", timer);
        self.emit(ProgressEvent::PhaseBegin {
            id: ProgressTracker::next_event_id(),
            timestamp: ProgressTracker::current_timestamp(),
            phase: timer.to_string(),
        });
    }

    fn stop_code_path_timer(&self, timer: CodePathTimer) {
        let start = self
            .started
            .lock()
            .ok()
            .and_then(|mut started| started.remove(&timer));
        let Some(start) = start else {
            warn!("Timer {} stopped without being started", timer);
            return;
        };

        let duration = start.elapsed();
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_duration(timer.as_str(), duration);
        }
        self.emit(ProgressEvent::PhaseEnd {
            id: ProgressTracker::next_event_id(),
            timestamp: ProgressTracker::current_timestamp(),
            phase: timer.to_string(),
            duration_ms: duration.as_millis() as u64,
        });
    }
}

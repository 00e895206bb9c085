//! Init and pull command implementation
//!
//! Both commands run the environment initializer against the project's files.
//! They differ in wording and in the default push decision.

use crate::ui::TerminalUi;
use anyhow::Result;
use stackenv_core::context::{ExecutionInfo, RunContext};
use stackenv_core::init_env::{EnvInitializer, InitServices};
use stackenv_core::progress::{MetricsSummary, SharedProgressTracker};
use stackenv_core::timer::UsageTimers;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Project root
    pub project_dir: PathBuf,
    /// Reuse the held meta instead of rebuilding it from the project files
    pub restore: bool,
    /// Push decision made on the command line; `None` asks
    pub push: Option<bool>,
    /// Pull wording for an existing environment
    pub pulling: bool,
}

impl InitArgs {
    fn exe_info(&self) -> ExecutionInfo {
        ExecutionInfo {
            restore_backend: self.restore,
            force_push: self.push,
            is_pulling: self.pulling,
        }
    }
}

/// Execute the init or pull command
#[instrument(skip_all, fields(project = %args.project_dir.display(), pulling = args.pulling))]
pub async fn execute_init(args: InitArgs, progress: SharedProgressTracker) -> Result<()> {
    debug!("Init args: {:?}", args);

    let mut ctx = RunContext::load(&args.project_dir, args.exe_info())?;

    let timers = Arc::new(UsageTimers::new().with_progress(progress.clone()));
    let services =
        InitServices::for_project(&args.project_dir, timers.clone(), Arc::new(TerminalUi::new()));

    let outcome = EnvInitializer::new(services)
        .with_progress(progress.clone())
        .run(&mut ctx)
        .await?;
    debug!("Init outcome: {:?}", outcome);

    if let Some(summary) = timers.metrics_summary() {
        log_summary(&summary);
    }
    if let Ok(tracker) = progress.lock() {
        if let Some(summary) = tracker.as_ref().and_then(|t| t.metrics_summary()) {
            log_summary(&summary);
        }
    }
    Ok(())
}

fn log_summary(summary: &MetricsSummary) {
    for (name, histogram) in &summary.histograms {
        debug!(
            "{}: {} run(s), {:?} total, {:?} average",
            name, histogram.count, histogram.total_duration, histogram.avg_duration
        );
    }
}

//! Bound hook invocations and their sequential execution

use crate::context::RunContext;
use crate::errors::HookError;
use crate::plugins::{Hook, LifecycleHooks};
use crate::progress::{emit_shared, ProgressEvent, ProgressTracker, SharedProgressTracker};
use crate::status::ResourceDefinition;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument};

/// Who contributed a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOrigin {
    Category(String),
    Provider(String),
}

impl fmt::Display for TaskOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOrigin::Category(name) => write!(f, "category '{}'", name),
            TaskOrigin::Provider(name) => write!(f, "provider '{}'", name),
        }
    }
}

/// The hook call a task makes, with its bound arguments
#[derive(Debug, Clone)]
pub enum TaskAction {
    CategoryInit,
    ProviderInit { provider_meta: Value },
    Push { definition: ResourceDefinition },
}

impl TaskAction {
    pub fn hook(&self) -> Hook {
        match self {
            TaskAction::CategoryInit | TaskAction::ProviderInit { .. } => Hook::InitEnv,
            TaskAction::Push { .. } => Hook::PushResources,
        }
    }
}

/// One deferred hook invocation bound to its plugin
pub struct Task {
    pub origin: TaskOrigin,
    pub hooks: Arc<dyn LifecycleHooks>,
    pub action: TaskAction,
}

impl Task {
    pub fn new(origin: TaskOrigin, hooks: Arc<dyn LifecycleHooks>, action: TaskAction) -> Self {
        Self {
            origin,
            hooks,
            action,
        }
    }

    /// Invoke the bound hook against the shared context
    pub async fn run(&self, ctx: &mut RunContext) -> Result<(), HookError> {
        match &self.action {
            TaskAction::CategoryInit => self.hooks.init_env(ctx).await,
            TaskAction::ProviderInit { provider_meta } => {
                self.hooks.init_provider_env(ctx, provider_meta).await
            }
            TaskAction::Push { definition } => self.hooks.push_resources(ctx, definition).await,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("origin", &self.origin)
            .field("plugin", &self.hooks.name())
            .field("hook", &self.action.hook())
            .finish()
    }
}

/// Runs tasks one after another, stopping at the first failure
#[derive(Debug, Default)]
pub struct SequentialTaskExecutor {
    progress: Option<SharedProgressTracker>,
}

impl SequentialTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `hook.begin`/`hook.end` events for every task
    pub fn with_progress(mut self, progress: SharedProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every task in order. Each task completes before the next starts;
    /// the first error is returned as is and later tasks never run.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn run_all(&self, tasks: &[Task], ctx: &mut RunContext) -> Result<(), HookError> {
        for (index, task) in tasks.iter().enumerate() {
            let hook = task.action.hook();
            debug!(
                "Running task {} of {}: {} {}",
                index + 1,
                tasks.len(),
                task.origin,
                hook
            );
            self.emit(ProgressEvent::HookBegin {
                id: ProgressTracker::next_event_id(),
                timestamp: ProgressTracker::current_timestamp(),
                origin: task.origin.to_string(),
                hook: hook.to_string(),
            });

            let start = Instant::now();
            let result = task.run(ctx).await;

            self.emit(ProgressEvent::HookEnd {
                id: ProgressTracker::next_event_id(),
                timestamp: ProgressTracker::current_timestamp(),
                origin: task.origin.to_string(),
                hook: hook.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
                success: result.is_ok(),
            });

            if let Err(e) = result {
                error!("{} hook of {} failed: {}", hook, task.origin, e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            emit_shared(progress, event);
        }
    }
}

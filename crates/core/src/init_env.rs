//! Environment initialization
//!
//! [`EnvInitializer`] brings an environment into a consistent state. A run is
//! strictly linear and stops at the first failure:
//!
//! 1. rebuild (or restore) the environment meta
//! 2. resolve category and provider hooks into tasks
//! 3. run provider initialization (timed as `initEnvPlatform`)
//! 4. refresh the project details in the run context
//! 5. run category initialization (timed as `initEnvCategories`)
//! 6. decide whether to push, asking the user when the caller did not
//! 7. push every provider's resources when the decision is yes
//! 8. regenerate outputs
//! 9. report completion
//!
//! Whatever fails, the spinner is failed once and the original error is
//! returned unchanged.

use crate::config::ProjectLayout;
use crate::context::RunContext;
use crate::errors::{InitError, PluginError, Result, StackenvError};
use crate::merge::ConfigMerger;
use crate::meta::{EnvironmentMeta, FileMetaStore, MetaStore};
use crate::params::{ParameterStore, TeamProviderParamStore};
use crate::plugins::{
    resolve_category_tasks, resolve_provider_tasks, DefaultPluginLoader, Hook, PluginLoader,
    PluginRegistry, ProjectPluginRegistry, ResolvedProviders,
};
use crate::progress::SharedProgressTracker;
use crate::status::{FileProject, ProjectFacade};
use crate::task::{SequentialTaskExecutor, Task, TaskAction, TaskOrigin};
use crate::timer::{time_phase, CodePathTimer, Telemetry};
use crate::ui::{SpinnerHandle, Ui};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const PUSH_PROMPT: &str = "Do you want to push your resources to the cloud for your environment?";
pub const FAILURE_MESSAGE: &str = "There was an error initializing your environment.";
const PLATFORM_RESOLUTION: &str =
    "Check the provider configuration and credentials for this environment, then run the command again.";
const CATEGORIES_RESOLUTION: &str =
    "Review the category plugin output above, fix the reported problem, then run the command again.";

/// Collaborators used by a run
#[derive(Clone)]
pub struct InitServices {
    pub meta_store: Arc<dyn MetaStore>,
    pub params: Arc<dyn ParameterStore>,
    pub registry: Arc<dyn PluginRegistry>,
    pub loader: Arc<dyn PluginLoader>,
    pub project: Arc<dyn ProjectFacade>,
    pub telemetry: Arc<dyn Telemetry>,
    pub ui: Arc<dyn Ui>,
}

impl InitServices {
    /// File-backed collaborators for the project at `project_path`
    pub fn for_project(
        project_path: &Path,
        telemetry: Arc<dyn Telemetry>,
        ui: Arc<dyn Ui>,
    ) -> Self {
        let meta_store: Arc<dyn MetaStore> = Arc::new(FileMetaStore::new(project_path));
        Self {
            params: Arc::new(TeamProviderParamStore::new(&ProjectLayout::new(project_path))),
            registry: Arc::new(ProjectPluginRegistry),
            loader: Arc::new(DefaultPluginLoader::new(project_path, meta_store.clone())),
            project: Arc::new(FileProject::new(meta_store.clone())),
            meta_store,
            telemetry,
            ui,
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub env_name: String,
    pub provider_tasks: usize,
    pub category_tasks: usize,
    pub pushed: bool,
}

/// Messages that differ between `init` and `pull`
struct Messages {
    start: String,
    provider_done: String,
    complete: String,
}

impl Messages {
    fn new(env_name: &str, is_pulling: bool) -> Self {
        if is_pulling {
            Self {
                start: format!(
                    "Fetching updates to backend environment: {} from the cloud.",
                    env_name
                ),
                provider_done: format!(
                    "Successfully pulled backend environment {} from the cloud.",
                    env_name
                ),
                complete: format!("Pulled backend environment {} successfully.", env_name),
            }
        } else {
            Self {
                start: format!("Initializing your environment: {}", env_name),
                provider_done: "Initialized provider successfully.".to_string(),
                complete: "Initialized your environment successfully.".to_string(),
            }
        }
    }
}

/// Environment initialization orchestrator
pub struct EnvInitializer {
    services: InitServices,
    executor: SequentialTaskExecutor,
}

impl EnvInitializer {
    pub fn new(services: InitServices) -> Self {
        Self {
            services,
            executor: SequentialTaskExecutor::new(),
        }
    }

    /// Emit hook progress events through `progress`
    pub fn with_progress(mut self, progress: SharedProgressTracker) -> Self {
        self.executor = SequentialTaskExecutor::new().with_progress(progress);
        self
    }

    /// Run the initialization for the context's environment
    #[instrument(skip_all, fields(env = %ctx.env_name, pulling = ctx.exe_info.is_pulling))]
    pub async fn run(&self, ctx: &mut RunContext) -> Result<InitOutcome> {
        let mut spinner = None;
        match self.run_steps(ctx, &mut spinner).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                match spinner.as_mut() {
                    Some(handle) => handle.fail(FAILURE_MESSAGE),
                    None => self.services.ui.spinner_fail(FAILURE_MESSAGE),
                }
                Err(e)
            }
        }
    }

    async fn run_steps<'a>(
        &'a self,
        ctx: &mut RunContext,
        spinner: &mut Option<SpinnerHandle<'a>>,
    ) -> Result<InitOutcome> {
        let env_name = ctx.env_name.clone();
        let provider_names = ctx.providers().to_vec();
        let messages = Messages::new(&env_name, ctx.exe_info.is_pulling);

        let merger = ConfigMerger::new(
            self.services.meta_store.clone(),
            self.services.params.clone(),
        );
        let meta = merger.build_meta(
            &ctx.project_path,
            &env_name,
            &provider_names,
            ctx.exe_info.restore_backend,
        )?;

        let loader = self.services.loader.as_ref();
        let category_info = self.services.registry.category_plugin_info(ctx)?;
        let category_tasks = resolve_category_tasks(loader, &category_info, &meta.category_names())?;
        let provider_locations = self.services.registry.provider_plugins(ctx)?;
        let providers =
            resolve_provider_tasks(loader, &provider_names, &provider_locations, &meta)?;
        debug!(
            "Resolved {} provider tasks and {} category tasks",
            providers.tasks.len(),
            category_tasks.len()
        );

        let previous_meta = if self.services.meta_store.current_meta_file_exists() {
            self.services.meta_store.get_current_meta()?
        } else {
            EnvironmentMeta::default()
        };

        let spinner = spinner.insert(SpinnerHandle::start(
            self.services.ui.as_ref(),
            &messages.start,
        ));

        time_phase(
            self.services.telemetry.as_ref(),
            CodePathTimer::InitEnvPlatform,
            self.executor.run_all(&providers.tasks, ctx),
        )
        .await
        .map_err(|source| InitError::Platform {
            env_name: env_name.clone(),
            message: source.to_string(),
            resolution: PLATFORM_RESOLUTION,
            source,
        })?;
        spinner.succeed(&messages.provider_done);

        let details = self.services.project.project_details(ctx).await?;
        ctx.project_details = Some(details);

        time_phase(
            self.services.telemetry.as_ref(),
            CodePathTimer::InitEnvCategories,
            self.executor.run_all(&category_tasks, ctx),
        )
        .await
        .map_err(|source| InitError::Categories {
            env_name: env_name.clone(),
            message: source.to_string(),
            resolution: CATEGORIES_RESOLUTION,
            source,
        })?;

        let push = match ctx.exe_info.force_push {
            Some(decision) => decision,
            None => self.services.ui.confirm(PUSH_PROMPT, false)?,
        };
        ctx.exe_info.force_push = Some(push);

        if push {
            let push_tasks = self.push_tasks(ctx, &provider_names, &providers).await?;
            self.executor
                .run_all(&push_tasks, ctx)
                .await
                .map_err(StackenvError::Push)?;
        } else {
            debug!("Skipping push for '{}'", env_name);
        }

        self.services
            .project
            .on_category_outputs_change(ctx, &previous_meta)
            .await?;

        self.services.ui.success(&messages.complete);
        info!("Environment '{}' is ready", env_name);

        Ok(InitOutcome {
            env_name,
            provider_tasks: providers.tasks.len(),
            category_tasks: category_tasks.len(),
            pushed: push,
        })
    }

    /// One push task per provider, bound to that provider's resource status
    async fn push_tasks(
        &self,
        ctx: &RunContext,
        provider_names: &[String],
        providers: &ResolvedProviders,
    ) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(provider_names.len());
        for provider in provider_names {
            let hooks =
                providers
                    .plugins
                    .get(provider)
                    .ok_or_else(|| PluginError::ProviderNotRegistered {
                        provider: provider.clone(),
                    })?;
            if !hooks.provides(Hook::PushResources) {
                return Err(PluginError::MissingProviderHook {
                    provider: provider.clone(),
                    hook: Hook::PushResources.to_string(),
                }
                .into());
            }
            let definition = self.services.project.resource_status(ctx, provider).await?;
            tasks.push(Task::new(
                TaskOrigin::Provider(provider.clone()),
                hooks.clone(),
                TaskAction::Push { definition },
            ));
        }
        Ok(tasks)
    }
}

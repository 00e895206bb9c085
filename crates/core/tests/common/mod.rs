//! Shared test helpers for core integration tests.
//!
//! Every mock appends to one shared call log so tests can assert on the exact
//! order of collaborator calls across a run.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use stackenv_core::config::ProjectConfig;
use stackenv_core::context::{ExecutionInfo, ProjectDetails, RunContext};
use stackenv_core::errors::{HookError, Result, UiError};
use stackenv_core::init_env::InitServices;
use stackenv_core::meta::{BackendConfig, EnvironmentMeta, MetaStore, TeamProviderInfo};
use stackenv_core::params::{EnvParamManager, ParameterStore};
use stackenv_core::plugins::{
    Hook, LifecycleHooks, LoadError, PluginInfo, PluginLoader, PluginRegistry,
};
use stackenv_core::status::{ProjectFacade, ResourceDefinition};
use stackenv_core::timer::{CodePathTimer, Telemetry};
use stackenv_core::ui::Ui;
use stackenv_core::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn count(log: &CallLog, entry: &str) -> usize {
    log.lock().unwrap().iter().filter(|c| *c == entry).count()
}

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

pub struct MockMetaStore {
    pub log: CallLog,
    pub held: Mutex<EnvironmentMeta>,
    pub team_provider_info: TeamProviderInfo,
    pub backend_config: BackendConfig,
    pub current: Mutex<Option<EnvironmentMeta>>,
    pub set_meta_calls: Mutex<Vec<EnvironmentMeta>>,
}

impl MockMetaStore {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            held: Mutex::new(EnvironmentMeta::default()),
            team_provider_info: TeamProviderInfo::default(),
            backend_config: BackendConfig::default(),
            current: Mutex::new(None),
            set_meta_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MetaStore for MockMetaStore {
    fn get_meta(&self) -> Result<EnvironmentMeta> {
        record(&self.log, "get_meta");
        Ok(self.held.lock().unwrap().clone())
    }

    fn set_meta(&self, _project_path: &Path, meta: &EnvironmentMeta) -> Result<()> {
        record(&self.log, "set_meta");
        *self.held.lock().unwrap() = meta.clone();
        self.set_meta_calls.lock().unwrap().push(meta.clone());
        Ok(())
    }

    fn current_meta_file_exists(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    fn get_current_meta(&self) -> Result<EnvironmentMeta> {
        record(&self.log, "get_current_meta");
        Ok(self.current.lock().unwrap().clone().unwrap_or_default())
    }

    fn set_current_meta(&self, meta: &EnvironmentMeta) -> Result<()> {
        *self.current.lock().unwrap() = Some(meta.clone());
        Ok(())
    }

    fn get_team_provider_info(&self, _project_path: &Path) -> Result<TeamProviderInfo> {
        record(&self.log, "get_team_provider_info");
        Ok(self.team_provider_info.clone())
    }

    fn get_backend_config(&self, _project_path: &Path) -> Result<BackendConfig> {
        record(&self.log, "get_backend_config");
        Ok(self.backend_config.clone())
    }
}

pub struct MockParams {
    pub log: CallLog,
    pub categories: Value,
}

impl ParameterStore for MockParams {
    fn ensure_env_param_manager(&self, env_name: &str) -> Result<EnvParamManager> {
        record(&self.log, format!("params:{}", env_name));
        Ok(EnvParamManager::from_categories(&self.categories))
    }
}

pub struct MockRegistry {
    pub categories: IndexMap<String, Vec<PluginInfo>>,
    pub providers: IndexMap<String, String>,
}

impl PluginRegistry for MockRegistry {
    fn category_plugin_info(&self, _ctx: &RunContext) -> Result<IndexMap<String, Vec<PluginInfo>>> {
        Ok(self.categories.clone())
    }

    fn provider_plugins(&self, _ctx: &RunContext) -> Result<IndexMap<String, String>> {
        Ok(self.providers.clone())
    }
}

/// Plugin recording every hook call; failures are configured per hook
pub struct MockPlugin {
    pub name: String,
    pub hooks: Vec<Hook>,
    pub log: CallLog,
    pub init_error: Option<String>,
    pub push_error: Option<String>,
    pub pushed: Mutex<Vec<ResourceDefinition>>,
    pub provider_meta: Mutex<Vec<Value>>,
}

impl MockPlugin {
    pub fn new(name: &str, hooks: &[Hook], log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            hooks: hooks.to_vec(),
            log: log.clone(),
            init_error: None,
            push_error: None,
            pushed: Mutex::new(Vec::new()),
            provider_meta: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_init(mut self, message: &str) -> Self {
        self.init_error = Some(message.to_string());
        self
    }

    pub fn failing_push(mut self, message: &str) -> Self {
        self.push_error = Some(message.to_string());
        self
    }

    fn outcome(error: &Option<String>) -> std::result::Result<(), HookError> {
        match error {
            Some(message) => Err(HookError::failed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LifecycleHooks for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self, hook: Hook) -> bool {
        self.hooks.contains(&hook)
    }

    async fn init_env(&self, ctx: &mut RunContext) -> std::result::Result<(), HookError> {
        record(&self.log, format!("init:{}", self.name));
        ctx.hook_state
            .insert(format!("init:{}", self.name), json!(ctx.hook_state.len()));
        Self::outcome(&self.init_error)
    }

    async fn init_provider_env(
        &self,
        ctx: &mut RunContext,
        provider_meta: &Value,
    ) -> std::result::Result<(), HookError> {
        record(&self.log, format!("init_provider:{}", self.name));
        self.provider_meta.lock().unwrap().push(provider_meta.clone());
        ctx.hook_state
            .insert(format!("init_provider:{}", self.name), json!(true));
        Self::outcome(&self.init_error)
    }

    async fn push_resources(
        &self,
        _ctx: &mut RunContext,
        definition: &ResourceDefinition,
    ) -> std::result::Result<(), HookError> {
        record(&self.log, format!("push:{}", self.name));
        self.pushed.lock().unwrap().push(definition.clone());
        Self::outcome(&self.push_error)
    }
}

/// Loader serving registered plugins by location; unknown locations fail to load
#[derive(Default)]
pub struct MockLoader {
    pub plugins: HashMap<String, Arc<dyn LifecycleHooks>>,
    pub loaded: Mutex<Vec<String>>,
}

impl MockLoader {
    pub fn with(mut self, location: &str, plugin: Arc<dyn LifecycleHooks>) -> Self {
        self.plugins.insert(location.to_string(), plugin);
        self
    }
}

impl PluginLoader for MockLoader {
    fn load(&self, location: &str) -> std::result::Result<Arc<dyn LifecycleHooks>, LoadError> {
        self.loaded.lock().unwrap().push(location.to_string());
        self.plugins
            .get(location)
            .cloned()
            .ok_or_else(|| LoadError::ManifestNotFound(location.to_string()))
    }
}

pub struct MockProject {
    pub log: CallLog,
    pub definitions: HashMap<String, ResourceDefinition>,
    pub previous_meta: Mutex<Vec<EnvironmentMeta>>,
    /// `exe_info.force_push` as seen by the outputs step
    pub outputs_force_push: Mutex<Vec<Option<bool>>>,
}

impl MockProject {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            definitions: HashMap::new(),
            previous_meta: Mutex::new(Vec::new()),
            outputs_force_push: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProjectFacade for MockProject {
    async fn project_details(&self, ctx: &RunContext) -> Result<ProjectDetails> {
        record(&self.log, "project_details");
        Ok(ProjectDetails {
            project_config: ctx.project_config.clone(),
            env_name: ctx.env_name.clone(),
            team_provider_info: TeamProviderInfo::default(),
            meta: EnvironmentMeta::default(),
        })
    }

    async fn resource_status(&self, _ctx: &RunContext, provider: &str) -> Result<ResourceDefinition> {
        record(&self.log, format!("resource_status:{}", provider));
        Ok(self.definitions.get(provider).cloned().unwrap_or_default())
    }

    async fn on_category_outputs_change(
        &self,
        ctx: &RunContext,
        previous_meta: &EnvironmentMeta,
    ) -> Result<()> {
        record(&self.log, "outputs_changed");
        self.outputs_force_push
            .lock()
            .unwrap()
            .push(ctx.exe_info.force_push);
        self.previous_meta.lock().unwrap().push(previous_meta.clone());
        Ok(())
    }
}

pub struct MockTelemetry {
    pub log: CallLog,
}

impl Telemetry for MockTelemetry {
    fn start_code_path_timer(&self, timer: CodePathTimer) {
        record(&self.log, format!("timer_start:{}", timer));
    }

    fn stop_code_path_timer(&self, timer: CodePathTimer) {
        record(&self.log, format!("timer_stop:{}", timer));
    }
}

/// UI answering the push question with `answer`; `None` behaves like a missing terminal
pub struct MockUi {
    pub log: CallLog,
    pub answer: Option<bool>,
}

impl Ui for MockUi {
    fn spinner_start(&self, message: &str) {
        record(&self.log, format!("spinner_start:{}", message));
    }

    fn spinner_succeed(&self, message: &str) {
        record(&self.log, format!("spinner_succeed:{}", message));
    }

    fn spinner_fail(&self, message: &str) {
        record(&self.log, format!("spinner_fail:{}", message));
    }

    fn spinner_stop(&self) {
        record(&self.log, "spinner_stop");
    }

    fn info(&self, message: &str) {
        record(&self.log, format!("info:{}", message));
    }

    fn success(&self, message: &str) {
        record(&self.log, format!("success:{}", message));
    }

    fn confirm(&self, message: &str, _default: bool) -> std::result::Result<bool, UiError> {
        record(&self.log, "confirm");
        self.answer.ok_or_else(|| UiError::NonInteractive {
            question: message.to_string(),
        })
    }
}

/// The reference scenario: environment `dev`, provider `awscloudformation`,
/// one initialized category `auth`, each with a plugin exposing `initEnv`
pub struct Scenario {
    pub log: CallLog,
    pub meta_store: Arc<MockMetaStore>,
    pub params: Arc<MockParams>,
    pub registry: MockRegistry,
    pub loader: MockLoader,
    pub project: MockProject,
    pub answer: Option<bool>,
    pub provider: Arc<MockPlugin>,
    pub category: Arc<MockPlugin>,
}

pub const PROVIDER: &str = "awscloudformation";
pub const PROVIDER_LOCATION: &str = "plugins/aws";
pub const CATEGORY: &str = "auth";
pub const CATEGORY_LOCATION: &str = "plugins/auth";

impl Scenario {
    pub fn new() -> Self {
        let log = new_log();
        let provider = Arc::new(MockPlugin::new(
            PROVIDER,
            &[Hook::InitEnv, Hook::PushResources],
            &log,
        ));
        let category = Arc::new(MockPlugin::new(CATEGORY, &[Hook::InitEnv], &log));
        Self::with_plugins(log, provider, category)
    }

    pub fn with_plugins(log: CallLog, provider: Arc<MockPlugin>, category: Arc<MockPlugin>) -> Self {
        let mut meta_store = MockMetaStore::new(&log);
        meta_store.team_provider_info.insert(
            "dev".to_string(),
            [(PROVIDER.to_string(), json!({ "Region": "us-east-1" }))]
                .into_iter()
                .collect(),
        );
        meta_store.backend_config.insert(
            CATEGORY.to_string(),
            [("userPool".to_string(), json!({ "service": "Cognito" }))]
                .into_iter()
                .collect(),
        );

        let registry = MockRegistry {
            categories: [(
                CATEGORY.to_string(),
                vec![PluginInfo {
                    package_location: CATEGORY_LOCATION.to_string(),
                }],
            )]
            .into_iter()
            .collect(),
            providers: [(PROVIDER.to_string(), PROVIDER_LOCATION.to_string())]
                .into_iter()
                .collect(),
        };

        let loader = MockLoader::default()
            .with(PROVIDER_LOCATION, provider.clone())
            .with(CATEGORY_LOCATION, category.clone());

        Self {
            params: Arc::new(MockParams {
                log: log.clone(),
                categories: json!({}),
            }),
            meta_store: Arc::new(meta_store),
            registry,
            loader,
            project: MockProject::new(&log),
            answer: Some(false),
            provider,
            category,
            log,
        }
    }

    /// Build the services; consumes the mutable parts of the scenario
    pub fn services(&mut self) -> (InitServices, Arc<MockProject>, Arc<MockLoader>) {
        let project = Arc::new(std::mem::replace(
            &mut self.project,
            MockProject::new(&self.log),
        ));
        let loader = Arc::new(std::mem::take(&mut self.loader));
        let registry = MockRegistry {
            categories: self.registry.categories.clone(),
            providers: self.registry.providers.clone(),
        };
        let services = InitServices {
            meta_store: self.meta_store.clone(),
            params: self.params.clone(),
            registry: Arc::new(registry),
            loader: loader.clone(),
            project: project.clone(),
            telemetry: Arc::new(MockTelemetry {
                log: self.log.clone(),
            }),
            ui: Arc::new(MockUi {
                log: self.log.clone(),
                answer: self.answer,
            }),
        };
        (services, project, loader)
    }

    pub fn ctx(&self, exe_info: ExecutionInfo) -> RunContext {
        RunContext::new(
            "/projects/notes",
            "dev",
            ProjectConfig {
                project_name: "notes".to_string(),
                version: None,
                providers: vec![PROVIDER.to_string()],
            },
            exe_info,
        )
    }
}

/// Write the project files of a file-backed project rooted at `root`
pub fn write_project(
    root: &Path,
    providers: &[&str],
    plugins: Value,
    team_provider_info: Value,
    backend_config: Value,
) {
    let layout = stackenv_core::config::ProjectLayout::new(root);
    let write = |path: std::path::PathBuf, value: Value| {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    };
    write(
        layout.project_config_path(),
        json!({ "projectName": "notes", "providers": providers }),
    );
    write(layout.local_env_info_path(), json!({ "envName": "dev" }));
    write(layout.plugins_path(), plugins);
    write(layout.team_provider_info_path(), team_provider_info);
    write(layout.backend_config_path(), backend_config);
}

/// Create a manifest plugin directory at `root/location`
pub fn write_manifest_plugin(root: &Path, location: &str, manifest: Value) {
    let dir = root.join(location);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(stackenv_core::plugins::manifest::MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
}

//! Plugin hooks and their resolution into tasks
//!
//! Categories and providers contribute behavior through plugins implementing
//! [`LifecycleHooks`]. The project records where each plugin lives
//! (`plugins.json`); a [`PluginLoader`] turns a location into a loaded plugin.
//!
//! ## Plugin kinds
//!
//! - `builtin:<name>` resolves to a plugin compiled into this crate
//! - any other location is a directory (relative to the project root) holding
//!   a `stackenv-plugin.json` manifest whose hooks are shell commands
//!
//! Resolution is eager: every location is loaded up front, before any hook
//! runs, so a broken plugin fails the run before anything changes.

pub mod builtin;
pub mod manifest;

use crate::config::{ConfigLoader, ProjectLayout};
use crate::context::RunContext;
use crate::errors::{HookError, PluginError, Result};
use crate::meta::{EnvironmentMeta, MetaStore};
use crate::status::ResourceDefinition;
use crate::task::{Task, TaskAction, TaskOrigin};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Prefix of locations that name a compiled-in plugin
pub const BUILTIN_PREFIX: &str = "builtin:";

/// Hooks a plugin may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    InitEnv,
    PushResources,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::InitEnv => "initEnv",
            Hook::PushResources => "pushResources",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities a loaded plugin exposes.
///
/// Hook methods default to [`HookError::Unsupported`]; implementors override
/// the ones they report through [`LifecycleHooks::provides`].
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Whether the plugin implements `hook`
    fn provides(&self, hook: Hook) -> bool;

    /// Category environment initialization
    async fn init_env(&self, _ctx: &mut RunContext) -> std::result::Result<(), HookError> {
        Err(unsupported(self.name(), Hook::InitEnv))
    }

    /// Provider environment initialization with the provider's slice of the meta
    async fn init_provider_env(
        &self,
        _ctx: &mut RunContext,
        _provider_meta: &Value,
    ) -> std::result::Result<(), HookError> {
        Err(unsupported(self.name(), Hook::InitEnv))
    }

    /// Push the given resources
    async fn push_resources(
        &self,
        _ctx: &mut RunContext,
        _definition: &ResourceDefinition,
    ) -> std::result::Result<(), HookError> {
        Err(unsupported(self.name(), Hook::PushResources))
    }
}

fn unsupported(plugin: &str, hook: Hook) -> HookError {
    HookError::Unsupported {
        plugin: plugin.to_string(),
        hook: hook.to_string(),
    }
}

/// Where a category plugin lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub package_location: String,
}

/// `plugins.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginsFile {
    #[serde(default)]
    pub categories: IndexMap<String, Vec<PluginInfo>>,
    #[serde(default)]
    pub providers: IndexMap<String, String>,
}

/// Source of plugin locations
pub trait PluginRegistry: Send + Sync {
    /// Category name to its plugin locations, in registration order
    fn category_plugin_info(&self, ctx: &RunContext) -> Result<IndexMap<String, Vec<PluginInfo>>>;

    /// Provider name to its plugin location
    fn provider_plugins(&self, ctx: &RunContext) -> Result<IndexMap<String, String>>;
}

/// Reads plugin locations from the project's `plugins.json`
#[derive(Debug, Clone, Default)]
pub struct ProjectPluginRegistry;

impl ProjectPluginRegistry {
    fn read(ctx: &RunContext) -> Result<PluginsFile> {
        ConfigLoader::read_json_or_default(&ProjectLayout::new(&ctx.project_path).plugins_path())
    }
}

impl PluginRegistry for ProjectPluginRegistry {
    fn category_plugin_info(&self, ctx: &RunContext) -> Result<IndexMap<String, Vec<PluginInfo>>> {
        Ok(Self::read(ctx)?.categories)
    }

    fn provider_plugins(&self, ctx: &RunContext) -> Result<IndexMap<String, String>> {
        Ok(Self::read(ctx)?.providers)
    }
}

/// Why a plugin location could not be loaded
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no built-in plugin named '{0}'")]
    UnknownBuiltin(String),

    #[error("plugin manifest not found at {0}")]
    ManifestNotFound(String),

    #[error("invalid plugin manifest {path}: {message}")]
    InvalidManifest { path: String, message: String },
}

/// Turns a plugin location into a loaded plugin
pub trait PluginLoader: Send + Sync {
    fn load(&self, location: &str) -> std::result::Result<Arc<dyn LifecycleHooks>, LoadError>;
}

/// Loader for built-in and manifest plugins
pub struct DefaultPluginLoader {
    project_path: PathBuf,
    builtins: HashMap<String, Arc<dyn LifecycleHooks>>,
}

impl DefaultPluginLoader {
    /// Loader resolving manifest directories against `project_path`, with the
    /// stock built-in plugins registered
    pub fn new(project_path: impl Into<PathBuf>, meta_store: Arc<dyn MetaStore>) -> Self {
        let loader = Self {
            project_path: project_path.into(),
            builtins: HashMap::new(),
        };
        loader.with_builtin(Arc::new(builtin::LocalProvider::new(meta_store)))
    }

    /// Register a compiled-in plugin under its own name
    pub fn with_builtin(mut self, plugin: Arc<dyn LifecycleHooks>) -> Self {
        self.builtins.insert(plugin.name().to_string(), plugin);
        self
    }
}

impl PluginLoader for DefaultPluginLoader {
    fn load(&self, location: &str) -> std::result::Result<Arc<dyn LifecycleHooks>, LoadError> {
        if let Some(name) = location.strip_prefix(BUILTIN_PREFIX) {
            return self
                .builtins
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::UnknownBuiltin(name.to_string()));
        }
        let dir = self.project_path.join(location);
        let plugin = manifest::ManifestPlugin::load(&dir)?;
        Ok(Arc::new(plugin))
    }
}

/// Build the category initialization tasks.
///
/// Only categories present in `initialized` are considered. Every location of
/// such a category is loaded; plugins without `initEnv` contribute nothing.
/// Order follows `info` and each category's location list.
#[instrument(skip_all)]
pub fn resolve_category_tasks(
    loader: &dyn PluginLoader,
    info: &IndexMap<String, Vec<PluginInfo>>,
    initialized: &[String],
) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for (category, plugins) in info {
        if !initialized.iter().any(|c| c == category) {
            debug!("Skipping category '{}': not initialized", category);
            continue;
        }
        for plugin in plugins {
            let hooks = loader.load(&plugin.package_location).map_err(|e| {
                PluginError::CategoryLoad {
                    category: category.clone(),
                    location: plugin.package_location.clone(),
                    message: e.to_string(),
                }
            })?;
            if hooks.provides(Hook::InitEnv) {
                tasks.push(Task::new(
                    TaskOrigin::Category(category.clone()),
                    hooks,
                    TaskAction::CategoryInit,
                ));
            } else {
                debug!(
                    "Plugin '{}' of category '{}' has no initEnv hook",
                    hooks.name(),
                    category
                );
            }
        }
    }
    Ok(tasks)
}

/// Provider initialization tasks plus the loaded provider plugins
pub struct ResolvedProviders {
    pub tasks: Vec<Task>,
    pub plugins: IndexMap<String, Arc<dyn LifecycleHooks>>,
}

/// Build one provider initialization task per configured provider, in order.
///
/// Each task is bound to the provider's slice of `meta` (`null` when absent).
/// An unregistered provider, a load failure or a plugin without `initEnv` is
/// fatal and names the provider.
#[instrument(skip_all)]
pub fn resolve_provider_tasks(
    loader: &dyn PluginLoader,
    providers: &[String],
    locations: &IndexMap<String, String>,
    meta: &EnvironmentMeta,
) -> Result<ResolvedProviders> {
    let mut resolved = ResolvedProviders {
        tasks: Vec::with_capacity(providers.len()),
        plugins: IndexMap::new(),
    };
    for provider in providers {
        let location =
            locations
                .get(provider)
                .ok_or_else(|| PluginError::ProviderNotRegistered {
                    provider: provider.clone(),
                })?;
        let hooks = loader
            .load(location)
            .map_err(|e| PluginError::ProviderLoad {
                provider: provider.clone(),
                location: location.clone(),
                message: e.to_string(),
            })?;
        if !hooks.provides(Hook::InitEnv) {
            return Err(PluginError::MissingProviderHook {
                provider: provider.clone(),
                hook: Hook::InitEnv.to_string(),
            }
            .into());
        }
        let provider_meta = meta.providers.get(provider).cloned().unwrap_or(Value::Null);
        resolved.tasks.push(Task::new(
            TaskOrigin::Provider(provider.clone()),
            hooks.clone(),
            TaskAction::ProviderInit { provider_meta },
        ));
        resolved.plugins.insert(provider.clone(), hooks);
    }
    Ok(resolved)
}

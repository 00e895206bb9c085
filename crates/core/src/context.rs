//! Shared run context handed to every hook
//!
//! A `RunContext` lives for one command invocation. Hooks receive it mutably
//! one at a time and may read what earlier hooks wrote to `hook_state`.

use crate::config::{ConfigLoader, ProjectConfig, ProjectLayout};
use crate::errors::Result;
use crate::meta::{EnvironmentMeta, TeamProviderInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Flags describing how the run was invoked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    /// Reuse the held meta instead of rebuilding it
    pub restore_backend: bool,
    /// `Some` when the caller decided up front whether to push; `None` asks the user
    pub force_push: Option<bool>,
    /// Run is a pull of an existing environment rather than a fresh init
    pub is_pulling: bool,
}

/// Snapshot of project-level details, refreshed after provider initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    pub project_config: ProjectConfig,
    pub env_name: String,
    pub team_provider_info: TeamProviderInfo,
    pub meta: EnvironmentMeta,
}

/// Mutable state shared by every step of a run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub project_path: PathBuf,
    pub env_name: String,
    pub project_config: ProjectConfig,
    pub exe_info: ExecutionInfo,
    pub project_details: Option<ProjectDetails>,
    /// Free-form values hooks record for later hooks in the same run
    pub hook_state: Map<String, Value>,
}

impl RunContext {
    pub fn new(
        project_path: impl Into<PathBuf>,
        env_name: impl Into<String>,
        project_config: ProjectConfig,
        exe_info: ExecutionInfo,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            env_name: env_name.into(),
            project_config,
            exe_info,
            project_details: None,
            hook_state: Map::new(),
        }
    }

    /// Load the project config and environment name from the project files
    #[instrument(skip(exe_info))]
    pub fn load(project_path: &Path, exe_info: ExecutionInfo) -> Result<Self> {
        let layout = ProjectLayout::new(project_path);
        let project_config = ConfigLoader::load_project_config(&layout)?;
        let env_info = ConfigLoader::load_local_env_info(&layout)?;
        debug!(
            "Run context for project '{}' in environment '{}'",
            project_config.project_name, env_info.env_name
        );
        Ok(Self::new(
            project_path,
            env_info.env_name,
            project_config,
            exe_info,
        ))
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project_path)
    }

    /// Configured providers in execution order
    pub fn providers(&self) -> &[String] {
        &self.project_config.providers
    }
}

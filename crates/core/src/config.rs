//! Project configuration files and layout
//!
//! A stackenv project keeps its persisted state under `<project>/stackenv/`.
//! This module knows where every file lives and how to read and write them.
//! Files are parsed as JSON5 (comments and trailing commas allowed) and written
//! back as pretty-printed JSON.

use crate::errors::{ConfigError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Directory under the project root holding all stackenv state
pub const STACKENV_DIR: &str = "stackenv";

/// Well-known file locations for a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Create a layout rooted at the project directory
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            root: project_path.into(),
        }
    }

    /// Project root directory
    pub fn project_path(&self) -> &Path {
        &self.root
    }

    pub fn stackenv_dir(&self) -> PathBuf {
        self.root.join(STACKENV_DIR)
    }

    pub fn dot_config_dir(&self) -> PathBuf {
        self.stackenv_dir().join(".config")
    }

    pub fn project_config_path(&self) -> PathBuf {
        self.dot_config_dir().join("project-config.json")
    }

    pub fn local_env_info_path(&self) -> PathBuf {
        self.dot_config_dir().join("local-env-info.json")
    }

    pub fn plugins_path(&self) -> PathBuf {
        self.dot_config_dir().join("plugins.json")
    }

    pub fn team_provider_info_path(&self) -> PathBuf {
        self.stackenv_dir().join("team-provider-info.json")
    }

    pub fn backend_dir(&self) -> PathBuf {
        self.stackenv_dir().join("backend")
    }

    pub fn backend_config_path(&self) -> PathBuf {
        self.backend_dir().join("backend-config.json")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.backend_dir().join("stackenv-meta.json")
    }

    pub fn current_backend_dir(&self) -> PathBuf {
        self.stackenv_dir().join("#current-cloud-backend")
    }

    pub fn current_meta_path(&self) -> PathBuf {
        self.current_backend_dir().join("stackenv-meta.json")
    }

    pub fn outputs_path(&self) -> PathBuf {
        self.stackenv_dir()
            .join("outputs")
            .join("stackenv-outputs.json")
    }
}

/// `project-config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Ordered provider list; order is the execution order of provider hooks
    #[serde(default)]
    pub providers: Vec<String>,
}

/// `local-env-info.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEnvInfo {
    pub env_name: String,
}

/// Reads and writes project files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the project config and validate it
    #[instrument(skip_all, fields(project = %layout.project_path().display()))]
    pub fn load_project_config(layout: &ProjectLayout) -> Result<ProjectConfig> {
        let config: ProjectConfig = Self::read_json(&layout.project_config_path())?;
        Self::validate_project_config(&config)?;
        debug!(
            "Loaded project '{}' with providers {:?}",
            config.project_name, config.providers
        );
        Ok(config)
    }

    /// Load the local environment info
    pub fn load_local_env_info(layout: &ProjectLayout) -> Result<LocalEnvInfo> {
        let info: LocalEnvInfo = Self::read_json(&layout.local_env_info_path())?;
        if info.env_name.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!(
                    "envName in {} must not be empty",
                    layout.local_env_info_path().display()
                ),
            }
            .into());
        }
        Ok(info)
    }

    fn validate_project_config(config: &ProjectConfig) -> Result<()> {
        if config.providers.is_empty() {
            return Err(ConfigError::Validation {
                message: format!(
                    "Project '{}' does not declare any providers",
                    config.project_name
                ),
            }
            .into());
        }
        let mut seen = std::collections::HashSet::new();
        for provider in &config.providers {
            if !seen.insert(provider.as_str()) {
                return Err(ConfigError::Validation {
                    message: format!("Provider '{}' is declared more than once", provider),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Read a required JSON5 file
    pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        json5::from_str(&content).map_err(|e| {
            debug!("Failed to parse {}: {}", path.display(), e);
            ConfigError::Parsing {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Read an optional JSON5 file, returning the default when it is absent
    pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
        if !path.exists() {
            debug!("{} does not exist, using defaults", path.display());
            return Ok(T::default());
        }
        Self::read_json(path)
    }

    /// Write a value as pretty JSON, creating parent directories
    pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let write_err = |message: String| ConfigError::Write {
            path: path.display().to_string(),
            message,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let mut content =
            serde_json::to_string_pretty(value).map_err(|e| write_err(e.to_string()))?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

//! Environment meta snapshot and its persistence
//!
//! `EnvironmentMeta` is the in-memory view of a project's environment: provider
//! metadata keyed by provider name plus per-category resource entries. It is
//! serialized flat, with a `providers` key next to one key per category.

use crate::config::{ConfigLoader, ProjectLayout};
use crate::errors::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, instrument};

/// Resource entries of one category, keyed by resource name
pub type CategoryResources = IndexMap<String, Value>;

/// `team-provider-info.json`: environment name to provider (and `categories`) entries
pub type TeamProviderInfo = IndexMap<String, IndexMap<String, Value>>;

/// `backend-config.json`: category name to resource entries
pub type BackendConfig = IndexMap<String, CategoryResources>;

/// Key inside a team-provider-info environment entry that holds resource parameters
pub const CATEGORIES_KEY: &str = "categories";

/// In-memory environment meta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMeta {
    /// Provider-specific metadata; `null` when the environment has none recorded
    #[serde(default)]
    pub providers: IndexMap<String, Value>,
    /// Category-specific metadata, including per-resource fields
    #[serde(flatten)]
    pub categories: IndexMap<String, CategoryResources>,
}

impl EnvironmentMeta {
    /// Names of categories with recorded state, in meta order
    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Look up one resource entry
    pub fn resource(&self, category: &str, resource: &str) -> Option<&Value> {
        self.categories.get(category)?.get(resource)
    }

    /// Deep-merge backend config entries into the category entries
    pub fn merge_backend_config(&mut self, backend: &BackendConfig) {
        for (category, resources) in backend {
            let entry = self.categories.entry(category.clone()).or_default();
            for (name, fields) in resources {
                match entry.get_mut(name) {
                    Some(existing) => deep_merge(existing, fields),
                    None => {
                        entry.insert(name.clone(), fields.clone());
                    }
                }
            }
        }
    }
}

/// Merge `overlay` into `base`; objects merge key by key, anything else is replaced
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (key, value) in overlay_obj {
                match base_obj.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_obj.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Persisted meta collaborator
pub trait MetaStore: Send + Sync {
    /// The meta currently persisted for the project
    fn get_meta(&self) -> Result<EnvironmentMeta>;

    /// Persist the meta for the project at `project_path`
    fn set_meta(&self, project_path: &Path, meta: &EnvironmentMeta) -> Result<()>;

    /// Whether a last-deployed meta snapshot exists
    fn current_meta_file_exists(&self) -> bool;

    /// The last-deployed meta snapshot
    fn get_current_meta(&self) -> Result<EnvironmentMeta>;

    /// Replace the last-deployed meta snapshot
    fn set_current_meta(&self, meta: &EnvironmentMeta) -> Result<()>;

    /// Team/environment scoped provider info
    fn get_team_provider_info(&self, project_path: &Path) -> Result<TeamProviderInfo>;

    /// Backend configuration
    fn get_backend_config(&self, project_path: &Path) -> Result<BackendConfig>;
}

/// File-backed meta store rooted at one project.
///
/// Every read goes to disk so changes made by plugin commands between steps
/// are always visible.
#[derive(Debug, Clone)]
pub struct FileMetaStore {
    layout: ProjectLayout,
}

impl FileMetaStore {
    pub fn new(project_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            layout: ProjectLayout::new(project_path),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }
}

impl MetaStore for FileMetaStore {
    fn get_meta(&self) -> Result<EnvironmentMeta> {
        ConfigLoader::read_json_or_default(&self.layout.meta_path())
    }

    #[instrument(skip(self, meta))]
    fn set_meta(&self, project_path: &Path, meta: &EnvironmentMeta) -> Result<()> {
        ConfigLoader::write_json(&ProjectLayout::new(project_path).meta_path(), meta)?;
        debug!(
            "Persisted meta with {} providers and {} categories",
            meta.providers.len(),
            meta.categories.len()
        );
        Ok(())
    }

    fn current_meta_file_exists(&self) -> bool {
        self.layout.current_meta_path().exists()
    }

    fn get_current_meta(&self) -> Result<EnvironmentMeta> {
        ConfigLoader::read_json_or_default(&self.layout.current_meta_path())
    }

    fn set_current_meta(&self, meta: &EnvironmentMeta) -> Result<()> {
        ConfigLoader::write_json(&self.layout.current_meta_path(), meta)
    }

    fn get_team_provider_info(&self, project_path: &Path) -> Result<TeamProviderInfo> {
        ConfigLoader::read_json_or_default(&ProjectLayout::new(project_path).team_provider_info_path())
    }

    fn get_backend_config(&self, project_path: &Path) -> Result<BackendConfig> {
        ConfigLoader::read_json_or_default(&ProjectLayout::new(project_path).backend_config_path())
    }
}

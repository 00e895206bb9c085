//! Per-environment resource parameters
//!
//! Parameters are user-supplied values scoped to one environment and one
//! resource. They are kept in `team-provider-info.json` under
//! `<env>.categories.<category>.<resource>` and are layered over the backend
//! configuration when the environment meta is rebuilt.

use crate::config::ConfigLoader;
use crate::config::ProjectLayout;
use crate::errors::Result;
use crate::meta::{TeamProviderInfo, CATEGORIES_KEY};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

/// Parameters of a single resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceParamManager {
    params: Map<String, Value>,
}

impl ResourceParamManager {
    pub fn new(params: Map<String, Value>) -> Self {
        Self { params }
    }

    pub fn has_any_params(&self) -> bool {
        !self.params.is_empty()
    }

    /// All parameters as one JSON object
    pub fn get_all_params(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// Parameters of every resource in one environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvParamManager {
    resources: IndexMap<(String, String), ResourceParamManager>,
}

impl EnvParamManager {
    /// Build from a `categories` object: category to resource to parameter object
    pub fn from_categories(categories: &Value) -> Self {
        let mut resources = IndexMap::new();
        if let Some(categories) = categories.as_object() {
            for (category, entries) in categories {
                let Some(entries) = entries.as_object() else {
                    continue;
                };
                for (resource, params) in entries {
                    if let Some(params) = params.as_object() {
                        resources.insert(
                            (category.clone(), resource.clone()),
                            ResourceParamManager::new(params.clone()),
                        );
                    }
                }
            }
        }
        Self { resources }
    }

    pub fn has_resource_param_manager(&self, category: &str, resource: &str) -> bool {
        self.resources
            .contains_key(&(category.to_string(), resource.to_string()))
    }

    pub fn get_resource_param_manager(
        &self,
        category: &str,
        resource: &str,
    ) -> Option<&ResourceParamManager> {
        self.resources
            .get(&(category.to_string(), resource.to_string()))
    }
}

/// Parameter storage collaborator
pub trait ParameterStore: Send + Sync {
    /// Ensure the parameter manager for an environment is loaded and return it
    fn ensure_env_param_manager(&self, env_name: &str) -> Result<EnvParamManager>;
}

/// Reads parameters from `team-provider-info.json`
#[derive(Debug, Clone)]
pub struct TeamProviderParamStore {
    path: PathBuf,
}

impl TeamProviderParamStore {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            path: layout.team_provider_info_path(),
        }
    }
}

impl ParameterStore for TeamProviderParamStore {
    fn ensure_env_param_manager(&self, env_name: &str) -> Result<EnvParamManager> {
        let info: TeamProviderInfo = ConfigLoader::read_json_or_default(&self.path)?;
        let manager = info
            .get(env_name)
            .and_then(|env| env.get(CATEGORIES_KEY))
            .map(EnvParamManager::from_categories)
            .unwrap_or_default();
        debug!(
            "Loaded parameters for {} resources in environment '{}'",
            manager.resources.len(),
            env_name
        );
        Ok(manager)
    }
}

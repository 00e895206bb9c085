//! Project facade: details, resource status and outputs
//!
//! Resource status is derived by comparing the persisted meta with the meta as
//! last deployed. Entries are matched by category and resource name and
//! compared by a content digest that ignores deployment-only fields.

use crate::config::{ConfigLoader, ProjectLayout};
use crate::context::{ProjectDetails, RunContext};
use crate::errors::Result;
use crate::meta::{EnvironmentMeta, MetaStore};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Fields that change on deployment and are ignored when comparing resources
const VOLATILE_FIELDS: &[&str] = &["output", "lastPushTimeStamp"];

/// One resource as seen by status and push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub category: String,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_plugin: Option<String>,
}

/// Resource status for one provider, handed to its push hook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub resources_to_be_created: Vec<ResourceRef>,
    pub resources_to_be_updated: Vec<ResourceRef>,
    pub resources_to_be_deleted: Vec<ResourceRef>,
    pub resources_no_change: Vec<ResourceRef>,
    pub all_resources: Vec<ResourceRef>,
}

impl ResourceDefinition {
    /// Whether a push would change anything
    pub fn has_changes(&self) -> bool {
        !(self.resources_to_be_created.is_empty()
            && self.resources_to_be_updated.is_empty()
            && self.resources_to_be_deleted.is_empty())
    }
}

/// Project-level collaborator used around the hook phases
#[async_trait]
pub trait ProjectFacade: Send + Sync {
    /// Fresh project details for the run's environment
    async fn project_details(&self, ctx: &RunContext) -> Result<ProjectDetails>;

    /// Resource status for the resources handled by `provider`
    async fn resource_status(&self, ctx: &RunContext, provider: &str) -> Result<ResourceDefinition>;

    /// Regenerate outputs after the run, given the last-deployed meta from before it
    async fn on_category_outputs_change(
        &self,
        ctx: &RunContext,
        previous_meta: &EnvironmentMeta,
    ) -> Result<()>;
}

/// File-backed project facade
pub struct FileProject {
    meta_store: Arc<dyn MetaStore>,
}

impl FileProject {
    pub fn new(meta_store: Arc<dyn MetaStore>) -> Self {
        Self { meta_store }
    }
}

#[async_trait]
impl ProjectFacade for FileProject {
    async fn project_details(&self, ctx: &RunContext) -> Result<ProjectDetails> {
        let layout = ctx.layout();
        Ok(ProjectDetails {
            project_config: ConfigLoader::load_project_config(&layout)?,
            env_name: ctx.env_name.clone(),
            team_provider_info: self.meta_store.get_team_provider_info(&ctx.project_path)?,
            meta: self.meta_store.get_meta()?,
        })
    }

    #[instrument(skip(self, _ctx))]
    async fn resource_status(
        &self,
        _ctx: &RunContext,
        provider: &str,
    ) -> Result<ResourceDefinition> {
        let persisted = self.meta_store.get_meta()?;
        let current = if self.meta_store.current_meta_file_exists() {
            self.meta_store.get_current_meta()?
        } else {
            EnvironmentMeta::default()
        };
        Ok(classify_resources(&persisted, &current, provider))
    }

    #[instrument(skip_all)]
    async fn on_category_outputs_change(
        &self,
        ctx: &RunContext,
        previous_meta: &EnvironmentMeta,
    ) -> Result<()> {
        let meta = self.meta_store.get_meta()?;
        let outputs = collect_outputs(&meta);
        let previous = collect_outputs(previous_meta);

        for (category, resources) in &outputs {
            if previous.get(category) != Some(resources) {
                info!("Outputs changed for category '{}'", category);
            }
        }
        for category in previous.keys().filter(|c| !outputs.contains_key(*c)) {
            info!("Outputs removed for category '{}'", category);
        }

        let layout = ProjectLayout::new(&ctx.project_path);
        ConfigLoader::write_json(&layout.outputs_path(), &outputs)
    }
}

/// Compare persisted and last-deployed meta for one provider
pub fn classify_resources(
    persisted: &EnvironmentMeta,
    current: &EnvironmentMeta,
    provider: &str,
) -> ResourceDefinition {
    let mut definition = ResourceDefinition::default();

    for (category, resources) in &persisted.categories {
        for (name, entry) in resources {
            if !belongs_to(entry, provider) {
                continue;
            }
            let resource = resource_ref(category, name, entry);
            match current.resource(category, name) {
                None => definition.resources_to_be_created.push(resource.clone()),
                Some(deployed) if resource_digest(deployed) != resource_digest(entry) => {
                    definition.resources_to_be_updated.push(resource.clone())
                }
                Some(_) => definition.resources_no_change.push(resource.clone()),
            }
            definition.all_resources.push(resource);
        }
    }

    for (category, resources) in &current.categories {
        for (name, entry) in resources {
            if belongs_to(entry, provider) && persisted.resource(category, name).is_none() {
                definition
                    .resources_to_be_deleted
                    .push(resource_ref(category, name, entry));
            }
        }
    }

    debug!(
        "Provider '{}': {} to create, {} to update, {} to delete, {} unchanged",
        provider,
        definition.resources_to_be_created.len(),
        definition.resources_to_be_updated.len(),
        definition.resources_to_be_deleted.len(),
        definition.resources_no_change.len()
    );
    definition
}

/// Resources without a `providerPlugin` are handled by every provider
fn belongs_to(entry: &Value, provider: &str) -> bool {
    match entry.get("providerPlugin").and_then(Value::as_str) {
        Some(owner) => owner == provider,
        None => true,
    }
}

fn resource_ref(category: &str, name: &str, entry: &Value) -> ResourceRef {
    let field = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
    ResourceRef {
        category: category.to_string(),
        resource_name: name.to_string(),
        service: field("service"),
        provider_plugin: field("providerPlugin"),
    }
}

/// SHA-256 over the entry's canonical JSON, without volatile fields
pub fn resource_digest(entry: &Value) -> String {
    let mut stripped = entry.clone();
    if let Value::Object(map) = &mut stripped {
        for field in VOLATILE_FIELDS {
            map.remove(*field);
        }
    }
    // A `Value` always serializes
    let canonical = serde_json::to_vec(&sorted_keys(stripped)).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    format!("sha256:{:x}", hasher.finalize())
}

/// Rebuild with object keys sorted at every level so insertion order does not
/// affect the digest
fn sorted_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, sorted_keys(value)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        scalar => scalar,
    }
}

/// `output` objects by category and resource
fn collect_outputs(meta: &EnvironmentMeta) -> IndexMap<String, IndexMap<String, Value>> {
    let mut outputs: IndexMap<String, IndexMap<String, Value>> = IndexMap::new();
    for (category, resources) in &meta.categories {
        for (name, entry) in resources {
            if let Some(output) = entry.get("output").filter(|o| o.is_object()) {
                outputs
                    .entry(category.clone())
                    .or_default()
                    .insert(name.clone(), output.clone());
            }
        }
    }
    outputs
}

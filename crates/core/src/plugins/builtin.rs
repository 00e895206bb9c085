//! Built-in plugins

use super::{Hook, LifecycleHooks};
use crate::context::RunContext;
use crate::errors::HookError;
use crate::meta::MetaStore;
use crate::status::ResourceDefinition;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Provider that keeps everything on the local filesystem.
///
/// `initEnv` records the provider meta in the hook state and makes sure the
/// last-deployed snapshot directory exists. `pushResources` stamps pushed
/// resources and copies them into the last-deployed snapshot.
pub struct LocalProvider {
    meta_store: Arc<dyn MetaStore>,
}

impl LocalProvider {
    pub const NAME: &'static str = "local";

    /// Field stamped on every pushed resource
    pub const PUSH_TIMESTAMP_FIELD: &'static str = "lastPushTimeStamp";

    pub fn new(meta_store: Arc<dyn MetaStore>) -> Self {
        Self { meta_store }
    }
}

#[async_trait]
impl LifecycleHooks for LocalProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn provides(&self, hook: Hook) -> bool {
        matches!(hook, Hook::InitEnv | Hook::PushResources)
    }

    async fn init_provider_env(
        &self,
        ctx: &mut RunContext,
        provider_meta: &Value,
    ) -> Result<(), HookError> {
        let current_dir = ctx.layout().current_backend_dir();
        tokio::fs::create_dir_all(&current_dir)
            .await
            .map_err(|e| {
                HookError::failed(format!(
                    "Failed to create {}: {}",
                    current_dir.display(),
                    e
                ))
            })?;
        ctx.hook_state.insert(
            Self::NAME.to_string(),
            json!({ "providerMeta": provider_meta }),
        );
        debug!("Local provider initialized for '{}'", ctx.env_name);
        Ok(())
    }

    async fn push_resources(
        &self,
        ctx: &mut RunContext,
        definition: &ResourceDefinition,
    ) -> Result<(), HookError> {
        let mut meta = self.meta_store.get_meta().map_err(anyhow::Error::from)?;
        let mut current = if self.meta_store.current_meta_file_exists() {
            self.meta_store
                .get_current_meta()
                .map_err(anyhow::Error::from)?
        } else {
            Default::default()
        };

        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let pushed = definition
            .resources_to_be_created
            .iter()
            .chain(&definition.resources_to_be_updated);
        for resource in pushed {
            let Some(entry) = meta
                .categories
                .get_mut(&resource.category)
                .and_then(|resources| resources.get_mut(&resource.resource_name))
            else {
                continue;
            };
            if let Value::Object(fields) = entry {
                fields.insert(Self::PUSH_TIMESTAMP_FIELD.to_string(), json!(stamp));
            }
            current
                .categories
                .entry(resource.category.clone())
                .or_default()
                .insert(resource.resource_name.clone(), entry.clone());
        }

        for resource in &definition.resources_to_be_deleted {
            if let Some(resources) = current.categories.get_mut(&resource.category) {
                resources.shift_remove(&resource.resource_name);
                if resources.is_empty() {
                    current.categories.shift_remove(&resource.category);
                }
            }
        }
        current.providers = meta.providers.clone();

        self.meta_store
            .set_meta(&ctx.project_path, &meta)
            .map_err(anyhow::Error::from)?;
        self.meta_store
            .set_current_meta(&current)
            .map_err(anyhow::Error::from)?;

        info!(
            "Pushed {} resources and removed {} for '{}'",
            definition.resources_to_be_created.len() + definition.resources_to_be_updated.len(),
            definition.resources_to_be_deleted.len(),
            ctx.env_name
        );
        Ok(())
    }
}

//! Environment meta reconstruction
//!
//! `ConfigMerger` rebuilds the in-memory environment meta from persisted
//! sources before any plugin hook runs: team provider info, backend
//! configuration and per-resource parameters.

use crate::errors::Result;
use crate::meta::{deep_merge, EnvironmentMeta, MetaStore};
use crate::params::ParameterStore;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Builds the environment meta for a run
pub struct ConfigMerger {
    meta_store: Arc<dyn MetaStore>,
    params: Arc<dyn ParameterStore>,
}

impl ConfigMerger {
    pub fn new(meta_store: Arc<dyn MetaStore>, params: Arc<dyn ParameterStore>) -> Self {
        Self { meta_store, params }
    }

    /// Produce the environment meta for `env_name`.
    ///
    /// With `restore_backend` set the meta already held by the store is returned
    /// as is and nothing is read or written. Otherwise the meta is rebuilt from
    /// scratch:
    ///
    /// 1. every configured provider gets the team provider info entry for the
    ///    environment, or `null` when there is none
    /// 2. the backend configuration is deep-merged into the category entries
    /// 3. resource parameters are deep-merged over matching resource entries
    ///
    /// and the result is persisted exactly once.
    #[instrument(skip(self, providers), fields(env = %env_name))]
    pub fn build_meta(
        &self,
        project_path: &Path,
        env_name: &str,
        providers: &[String],
        restore_backend: bool,
    ) -> Result<EnvironmentMeta> {
        if restore_backend {
            debug!("Restoring backend; using the held meta unchanged");
            return self.meta_store.get_meta();
        }

        let mut meta = EnvironmentMeta::default();

        let team_provider_info = self.meta_store.get_team_provider_info(project_path)?;
        let env_info = team_provider_info.get(env_name);
        for provider in providers {
            let provider_meta = env_info
                .and_then(|entries| entries.get(provider))
                .cloned()
                .unwrap_or(Value::Null);
            meta.providers.insert(provider.clone(), provider_meta);
        }

        let backend_config = self.meta_store.get_backend_config(project_path)?;
        meta.merge_backend_config(&backend_config);

        let env_params = self.params.ensure_env_param_manager(env_name)?;
        for (category, resources) in meta.categories.iter_mut() {
            for (resource, entry) in resources.iter_mut() {
                let Some(manager) = env_params.get_resource_param_manager(category, resource)
                else {
                    continue;
                };
                if manager.has_any_params() {
                    debug!("Applying parameters to {}/{}", category, resource);
                    deep_merge(entry, &manager.get_all_params());
                }
            }
        }

        self.meta_store.set_meta(project_path, &meta)?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, ProjectLayout};
    use crate::meta::FileMetaStore;
    use crate::params::TeamProviderParamStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn merger_for(temp: &TempDir) -> (ConfigMerger, Arc<FileMetaStore>) {
        let layout = ProjectLayout::new(temp.path());
        let store = Arc::new(FileMetaStore::new(temp.path()));
        let merger = ConfigMerger::new(
            store.clone(),
            Arc::new(TeamProviderParamStore::new(&layout)),
        );
        (merger, store)
    }

    #[test]
    fn test_build_meta_from_files() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::new(temp.path());
        ConfigLoader::write_json(
            &layout.team_provider_info_path(),
            &json!({
                "dev": {
                    "awscloudformation": { "Region": "eu-west-1" },
                    "categories": { "api": { "rest": { "stage": "dev" } } }
                }
            }),
        )
        .unwrap();
        ConfigLoader::write_json(
            &layout.backend_config_path(),
            &json!({ "api": { "rest": { "service": "Gateway", "stage": "base" } } }),
        )
        .unwrap();

        let (merger, _store) = merger_for(&temp);
        let providers = vec!["awscloudformation".to_string(), "local".to_string()];
        let meta = merger
            .build_meta(temp.path(), "dev", &providers, false)
            .unwrap();

        assert_eq!(meta.providers["awscloudformation"], json!({ "Region": "eu-west-1" }));
        assert_eq!(meta.providers["local"], Value::Null);
        assert_eq!(
            meta.resource("api", "rest").unwrap(),
            &json!({ "service": "Gateway", "stage": "dev" })
        );

        let persisted: EnvironmentMeta = ConfigLoader::read_json(&layout.meta_path()).unwrap();
        assert_eq!(persisted, meta);
    }

    #[test]
    fn test_restore_backend_returns_held_meta() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::new(temp.path());
        let held = json!({
            "providers": { "local": { "kept": true } },
            "hosting": { "site": { "service": "S3" } }
        });
        ConfigLoader::write_json(&layout.meta_path(), &held).unwrap();
        ConfigLoader::write_json(
            &layout.backend_config_path(),
            &json!({ "api": { "rest": {} } }),
        )
        .unwrap();

        let (merger, _store) = merger_for(&temp);
        let meta = merger
            .build_meta(temp.path(), "dev", &["local".to_string()], true)
            .unwrap();

        assert_eq!(serde_json::to_value(&meta).unwrap(), held);
        assert!(meta.resource("api", "rest").is_none());
    }
}

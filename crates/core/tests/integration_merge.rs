//! Integration tests for environment meta reconstruction

mod common;

use common::*;
use serde_json::json;
use stackenv_core::config::ProjectLayout;
use stackenv_core::merge::ConfigMerger;
use stackenv_core::meta::{EnvironmentMeta, FileMetaStore, MetaStore};
use stackenv_core::params::TeamProviderParamStore;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Backend config, provider meta and nested parameters combine in one persisted meta
#[test]
fn test_build_meta_from_project_files() {
    stackenv_core::logging::init(None).ok();

    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_project(
        root,
        &["awscloudformation", "local"],
        json!({}),
        json!({
            "dev": {
                "awscloudformation": { "Region": "us-east-1", "StackName": "notes-dev" },
                "categories": {
                    "api": { "notesApi": { "auth": { "mode": "API_KEY", "ttlDays": 7 } } },
                    "storage": { "bucket": {} }
                }
            },
            "prod": { "awscloudformation": { "Region": "eu-west-1" } }
        }),
        json!({
            "api": {
                "notesApi": {
                    "service": "AppSync",
                    "auth": { "mode": "IAM", "roles": ["admin"] }
                }
            },
            "storage": { "bucket": { "service": "S3" } }
        }),
    );
    // JSON5 is accepted for hand-edited files
    let layout = ProjectLayout::new(root);
    let backend = std::fs::read_to_string(layout.backend_config_path()).unwrap();
    std::fs::write(
        layout.backend_config_path(),
        format!("// edited by hand\n{}", backend),
    )
    .unwrap();

    let store = Arc::new(FileMetaStore::new(root));
    let merger = ConfigMerger::new(store.clone(), Arc::new(TeamProviderParamStore::new(&layout)));
    let providers = vec!["awscloudformation".to_string(), "local".to_string()];

    let meta = merger.build_meta(root, "dev", &providers, false).unwrap();

    assert_eq!(
        meta.providers.keys().collect::<Vec<_>>(),
        vec!["awscloudformation", "local"]
    );
    assert_eq!(meta.providers["awscloudformation"]["StackName"], json!("notes-dev"));
    assert_eq!(meta.providers["local"], serde_json::Value::Null);
    assert_eq!(
        meta.resource("api", "notesApi"),
        Some(&json!({
            "service": "AppSync",
            "auth": { "mode": "API_KEY", "roles": ["admin"], "ttlDays": 7 }
        }))
    );
    // An empty parameter set leaves the resource untouched
    assert_eq!(meta.resource("storage", "bucket"), Some(&json!({ "service": "S3" })));

    assert_eq!(store.get_meta().unwrap(), meta);
}

/// Rebuilding persists exactly once and restoring persists nothing
#[test]
fn test_persist_counts() {
    let log = new_log();
    let mut store = MockMetaStore::new(&log);
    store.backend_config.insert(
        "hosting".to_string(),
        [("site".to_string(), json!({ "service": "S3AndCloudFront" }))]
            .into_iter()
            .collect(),
    );
    let store = Arc::new(store);
    let params = Arc::new(MockParams {
        log: log.clone(),
        categories: json!({ "hosting": { "site": { "index": "index.html" } } }),
    });
    let merger = ConfigMerger::new(store.clone(), params);
    let providers = vec!["awscloudformation".to_string()];

    let built = merger
        .build_meta(Path::new("/projects/site"), "dev", &providers, false)
        .unwrap();
    assert_eq!(count(&log, "set_meta"), 1);
    assert_eq!(
        built.resource("hosting", "site"),
        Some(&json!({ "service": "S3AndCloudFront", "index": "index.html" }))
    );

    let restored = merger
        .build_meta(Path::new("/projects/site"), "dev", &providers, true)
        .unwrap();
    assert_eq!(count(&log, "set_meta"), 1);
    assert_eq!(count(&log, "get_meta"), 1);
    assert_eq!(restored, built);
}

/// A fresh project with no state files yields providers only
#[test]
fn test_build_meta_without_state_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let store = Arc::new(FileMetaStore::new(root));
    let merger = ConfigMerger::new(
        store,
        Arc::new(TeamProviderParamStore::new(&ProjectLayout::new(root))),
    );

    let meta = merger
        .build_meta(root, "dev", &["local".to_string()], false)
        .unwrap();

    let mut expected = EnvironmentMeta::default();
    expected
        .providers
        .insert("local".to_string(), serde_json::Value::Null);
    assert_eq!(meta, expected);
    assert!(ProjectLayout::new(root).meta_path().is_file());
}

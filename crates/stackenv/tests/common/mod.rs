//! Shared fixtures for CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// A project using the built-in local provider and one shell category plugin
/// whose initEnv hook runs `category_hook`
pub fn local_project(category_hook: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config = root.join("stackenv/.config");
    write_json(
        &config.join("project-config.json"),
        &json!({ "projectName": "notes", "providers": ["local"] }),
    );
    write_json(&config.join("local-env-info.json"), &json!({ "envName": "dev" }));
    write_json(
        &config.join("plugins.json"),
        &json!({
            "categories": { "auth": [{ "packageLocation": "plugins/auth" }] },
            "providers": { "local": "builtin:local" }
        }),
    );
    write_json(
        &root.join("stackenv/team-provider-info.json"),
        &json!({ "dev": { "local": { "Root": "." } } }),
    );
    write_json(
        &root.join("stackenv/backend/backend-config.json"),
        &json!({
            "auth": { "userPool": { "service": "Cognito", "providerPlugin": "local" } }
        }),
    );
    write_json(
        &root.join("plugins/auth/stackenv-plugin.json"),
        &json!({ "name": "auth", "hooks": { "initEnv": category_hook } }),
    );
    tmp
}

/// The stackenv binary pointed at `project`, with a closed stdin
pub fn stackenv(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stackenv").unwrap();
    cmd.arg("--project-dir")
        .arg(project)
        .env_remove("STACKENV_LOG_FORMAT")
        .write_stdin("");
    cmd
}

//! Manifest plugins
//!
//! A manifest plugin is a directory containing `stackenv-plugin.json`:
//!
//! ```json
//! { "name": "aws", "hooks": { "initEnv": "./init.sh", "pushResources": "./push.sh" } }
//! ```
//!
//! Each hook is a shell command run with `sh -c` from the plugin directory.
//! The run is described through `STACKENV_*` environment variables. JSON
//! payloads are written to temporary files and passed by path in the
//! `STACKENV_*_FILE` variables, since a single environment string is capped
//! by the OS. The command can hand values to later hooks by printing
//! `::set-state <key>=<json>` lines on stdout.

use super::{Hook, LifecycleHooks, LoadError};
use crate::context::RunContext;
use crate::errors::HookError;
use crate::status::ResourceDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Manifest file name inside a plugin directory
pub const MANIFEST_FILE: &str = "stackenv-plugin.json";

/// Stdout prefix for hook state writes
const SET_STATE_PREFIX: &str = "::set-state ";

/// `stackenv-plugin.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub hooks: ManifestHooks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestHooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_resources: Option<String>,
}

/// A plugin whose hooks are shell commands
#[derive(Debug, Clone)]
pub struct ManifestPlugin {
    manifest: PluginManifest,
    dir: PathBuf,
}

impl ManifestPlugin {
    /// Load the manifest from `dir`
    pub fn load(dir: &Path) -> Result<Self, LoadError> {
        let path = dir.join(MANIFEST_FILE);
        let invalid = |message: String| LoadError::InvalidManifest {
            path: path.display().to_string(),
            message,
        };
        if !path.is_file() {
            return Err(LoadError::ManifestNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let manifest: PluginManifest =
            json5::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        if manifest.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        debug!("Loaded plugin '{}' from {}", manifest.name, dir.display());
        Ok(Self {
            manifest,
            dir: dir.to_path_buf(),
        })
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn command_for(&self, hook: Hook) -> Option<&str> {
        match hook {
            Hook::InitEnv => self.manifest.hooks.init_env.as_deref(),
            Hook::PushResources => self.manifest.hooks.push_resources.as_deref(),
        }
    }

    fn spawn_error(&self, hook: Hook, message: String) -> HookError {
        HookError::Spawn {
            plugin: self.manifest.name.clone(),
            hook: hook.to_string(),
            message,
        }
    }

    /// Write a JSON payload to a temp file that lives until the returned handle drops
    fn payload_file(&self, hook: Hook, contents: &str) -> Result<NamedTempFile, HookError> {
        let mut file = tempfile::Builder::new()
            .prefix("stackenv-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| self.spawn_error(hook, format!("Failed to create payload file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| self.spawn_error(hook, format!("Failed to write payload file: {}", e)))?;
        Ok(file)
    }

    #[instrument(skip_all, fields(plugin = %self.manifest.name, hook = %hook))]
    async fn run_hook(
        &self,
        hook: Hook,
        ctx: &mut RunContext,
        payload: Option<(&str, String)>,
    ) -> Result<(), HookError> {
        let command_line = self.command_for(hook).ok_or_else(|| HookError::Unsupported {
            plugin: self.manifest.name.clone(),
            hook: hook.to_string(),
        })?;

        let hook_state = serde_json::to_string(&ctx.hook_state)
            .map_err(|e| HookError::failed(format!("Failed to encode hook state: {}", e)))?;
        let hook_state_file = self.payload_file(hook, &hook_state)?;
        let payload_file = match &payload {
            Some((key, contents)) => Some((*key, self.payload_file(hook, contents)?)),
            None => None,
        };

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(command_line)
            .current_dir(&self.dir)
            .env("STACKENV_HOOK", hook.as_str())
            .env("STACKENV_PLUGIN", &self.manifest.name)
            .env("STACKENV_ENV_NAME", &ctx.env_name)
            .env("STACKENV_PROJECT_PATH", &ctx.project_path)
            .env("STACKENV_HOOK_STATE_FILE", hook_state_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some((key, file)) = &payload_file {
            command.env(*key, file.path());
        }

        debug!("Executing: {}", command_line);
        let output = command
            .output()
            .await
            .map_err(|e| self.spawn_error(hook, e.to_string()))?;
        drop(payload_file);
        drop(hook_state_file);

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            match parse_state_line(line) {
                Some((key, value)) => {
                    debug!("Hook state '{}' set by plugin", key);
                    ctx.hook_state.insert(key, value);
                }
                None => info!("[{}] {}", self.manifest.name, line),
            }
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            warn!("[{}] {}", self.manifest.name, line);
        }

        if !output.status.success() {
            return Err(HookError::CommandFailed {
                plugin: self.manifest.name.clone(),
                hook: hook.to_string(),
                code: output.status.code(),
                detail: stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .map(|l| l.trim().to_string()),
            });
        }
        Ok(())
    }
}

/// Parse `::set-state key=<json>`; a value that is not JSON is kept as a string
pub fn parse_state_line(line: &str) -> Option<(String, Value)> {
    let rest = line.strip_prefix(SET_STATE_PREFIX)?;
    let (key, raw) = rest.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Some((key.to_string(), value))
}

#[async_trait]
impl LifecycleHooks for ManifestPlugin {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn provides(&self, hook: Hook) -> bool {
        self.command_for(hook).is_some()
    }

    async fn init_env(&self, ctx: &mut RunContext) -> Result<(), HookError> {
        self.run_hook(Hook::InitEnv, ctx, None).await
    }

    async fn init_provider_env(
        &self,
        ctx: &mut RunContext,
        provider_meta: &Value,
    ) -> Result<(), HookError> {
        let payload = ("STACKENV_PROVIDER_META_FILE", provider_meta.to_string());
        self.run_hook(Hook::InitEnv, ctx, Some(payload)).await
    }

    async fn push_resources(
        &self,
        ctx: &mut RunContext,
        definition: &ResourceDefinition,
    ) -> Result<(), HookError> {
        let encoded = serde_json::to_string(definition)
            .map_err(|e| HookError::failed(format!("Failed to encode resources: {}", e)))?;
        let payload = ("STACKENV_RESOURCE_DEFINITION_FILE", encoded);
        self.run_hook(Hook::PushResources, ctx, Some(payload)).await
    }
}

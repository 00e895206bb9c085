//! Error types and handling
//!
//! The error taxonomy mirrors the phases of an environment initialization run:
//! configuration and persisted-state errors, plugin load failures, hook failures,
//! phase failures and UI errors. Each domain has its own enum; `StackenvError`
//! wraps them for unified handling.

use thiserror::Error;

/// Errors reading or writing persisted project files
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File content could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parsing { path: String, message: String },

    /// File parsed but its shape is not what the project layout requires
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Required file is missing
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// File could not be written
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// Underlying I/O error
    #[error("Failed to access configuration file")]
    Io(#[from] std::io::Error),
}

/// Plugin load failures. Always fatal and always name the category or provider.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A category plugin module could not be loaded
    #[error("Could not load plugin for category '{category}' from {location}: {message}")]
    CategoryLoad {
        category: String,
        location: String,
        message: String,
    },

    /// A provider plugin module could not be loaded
    #[error("Could not load plugin for provider '{provider}' from {location}: {message}")]
    ProviderLoad {
        provider: String,
        location: String,
        message: String,
    },

    /// The project declares a provider that has no registered plugin location
    #[error("No plugin location registered for provider '{provider}'")]
    ProviderNotRegistered { provider: String },

    /// A loaded provider plugin lacks a hook the run requires
    #[error("Plugin for provider '{provider}' does not implement {hook}")]
    MissingProviderHook { provider: String, hook: String },
}

/// Failures raised by a plugin hook invocation
#[derive(Error, Debug)]
pub enum HookError {
    /// Hook reported a failure with a message
    #[error("{message}")]
    Failed { message: String },

    /// A command-backed hook exited unsuccessfully
    #[error("{hook} hook of plugin '{plugin}' exited with {}{}",
        .code.map(|c| format!("code {}", c)).unwrap_or_else(|| "a signal".to_string()),
        .detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
    CommandFailed {
        plugin: String,
        hook: String,
        code: Option<i32>,
        detail: Option<String>,
    },

    /// A command-backed hook could not be started
    #[error("Failed to start {hook} hook of plugin '{plugin}': {message}")]
    Spawn {
        plugin: String,
        hook: String,
        message: String,
    },

    /// The plugin does not provide the requested hook
    #[error("Plugin '{plugin}' does not provide the {hook} hook")]
    Unsupported { plugin: String, hook: String },

    /// Anything else a built-in hook propagates
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    /// Convenience constructor for hook failures with a plain message
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed {
            message: message.into(),
        }
    }
}

/// Phase failures of the provider and category initialization steps
#[derive(Error, Debug)]
pub enum InitError {
    /// Provider initialization failed
    #[error("Could not initialize platform for '{env_name}': {message}")]
    Platform {
        env_name: String,
        message: String,
        resolution: &'static str,
        #[source]
        source: HookError,
    },

    /// Category initialization failed
    #[error("Could not initialize categories for '{env_name}': {message}")]
    Categories {
        env_name: String,
        message: String,
        resolution: &'static str,
        #[source]
        source: HookError,
    },
}

impl InitError {
    /// Remediation hint for the failure
    pub fn resolution(&self) -> &'static str {
        match self {
            InitError::Platform { resolution, .. } | InitError::Categories { resolution, .. } => {
                resolution
            }
        }
    }
}

/// Interactive UI errors
#[derive(Error, Debug)]
pub enum UiError {
    /// A decision was required but no terminal is attached
    #[error("Cannot ask \"{question}\" without an interactive terminal")]
    NonInteractive { question: String },

    /// The prompt itself failed
    #[error("Prompt failed: {message}")]
    Prompt { message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum StackenvError {
    /// Configuration and persisted-state errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plugin load failures
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Provider or category initialization failures
    #[error(transparent)]
    Init(#[from] InitError),

    /// Push failures are surfaced as the hook reported them
    #[error(transparent)]
    Push(HookError),

    /// Collaborator hooks outside a phase (status, outputs) failed
    #[error(transparent)]
    Hook(#[from] HookError),

    /// UI errors
    #[error("UI error: {0}")]
    Ui(#[from] UiError),
}

/// Convenience type alias for Results with StackenvError
pub type Result<T> = std::result::Result<T, StackenvError>;

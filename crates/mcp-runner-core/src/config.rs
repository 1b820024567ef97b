use crate::engine::EngineKind;
use crate::error::RunnerError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fully-resolved description of the server process to run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionDescriptor {
    /// The executable to run to start the server
    pub command: String,
    /// Command line arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables overlaid on the default environment of the child
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ConnectionDescriptor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args<S: ToString, I: IntoIterator<Item = S>>(mut self, iter: I) -> Self {
        self.args = iter.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_env<T: ToString>(mut self, key: T, value: T) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Parse and validate a descriptor from its JSON form
    pub fn from_json(text: &str) -> Result<Self, RunnerError> {
        let descriptor: Self = serde_json::from_str(text).map_err(|e| {
            RunnerError::configuration(format!("invalid connection descriptor: {e}"))
        })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.command.trim().is_empty() {
            return Err(RunnerError::configuration(
                "connection command must not be empty",
            ));
        }
        Ok(())
    }

    /// The container engine this descriptor targets, if any
    pub fn engine(&self) -> Option<EngineKind> {
        EngineKind::from_command(&self.command)
    }
}

/// Configuration for retry logic used throughout the application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Delay before the first retry (in milliseconds)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound for exponential delays (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Whether to use exponential backoff (true) or fixed delay (false)
    #[serde(default = "default_use_exponential_backoff")]
    pub use_exponential_backoff: bool,

    /// Randomize exponential delays
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            use_exponential_backoff: default_use_exponential_backoff(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Five attempts, fixed two second delay
    pub fn vm_verification() -> Self {
        Self {
            min_delay_ms: 2_000,
            max_delay_ms: 2_000,
            max_attempts: 5,
            use_exponential_backoff: false,
            jitter: false,
        }
    }

    /// Create a RetryConfig with no retries (fail fast)
    pub fn no_retry() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            max_attempts: 1,
            use_exponential_backoff: false,
            jitter: false,
        }
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("max_attempts must be at least 1"));
        }

        if self.min_delay_ms > self.max_delay_ms {
            return Err(anyhow::anyhow!(
                "min_delay_ms cannot be greater than max_delay_ms"
            ));
        }

        if self.max_attempts > 10 {
            return Err(anyhow::anyhow!(
                "max_attempts should not exceed 10 to avoid excessive retries"
            ));
        }

        if self.max_delay_ms > 60_000 {
            return Err(anyhow::anyhow!("max_delay_ms should not exceed 60 seconds"));
        }

        Ok(())
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Check if retries are enabled (more than 1 attempt)
    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// When to run the VM bootstrapper before a container command
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VmPolicy {
    /// Only on platforms without a native container runtime
    #[default]
    Auto,
    Always,
    Never,
}

impl VmPolicy {
    pub fn requires_vm(&self) -> bool {
        match self {
            VmPolicy::Auto => !cfg!(target_os = "linux"),
            VmPolicy::Always => true,
            VmPolicy::Never => false,
        }
    }
}

/// Container-related settings of the runner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunnerSettings {
    /// Engine executable used for every container command
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Name of the virtual machine hosting the engine
    #[serde(default = "default_machine_name")]
    pub machine_name: String,

    /// Registry prepended to unqualified image references
    #[serde(default = "default_registry")]
    pub default_registry: String,

    #[serde(default)]
    pub vm_policy: VmPolicy,

    /// Connectivity verification of the virtual machine
    #[serde(default = "RetryConfig::vm_verification")]
    pub verification_retry: RetryConfig,

    /// Pre-pull the image before running the container command
    #[serde(default = "default_true")]
    pub pull_images: bool,

    /// Rewrite the image argument to its fully-qualified form
    #[serde(default = "default_true")]
    pub registry_override: bool,

    /// Overrides `<home>/.config/containers` for the anonymous auth file
    #[serde(default)]
    pub containers_config_dir: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            machine_name: default_machine_name(),
            default_registry: default_registry(),
            vm_policy: VmPolicy::default(),
            verification_retry: RetryConfig::vm_verification(),
            pull_images: true,
            registry_override: true,
            containers_config_dir: None,
        }
    }
}

impl RunnerSettings {
    pub fn from_json(text: &str) -> Result<Self, RunnerError> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| RunnerError::configuration(format!("invalid runner settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, RunnerError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::configuration(format!(
                "failed to read settings file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.engine.trim().is_empty() {
            return Err(RunnerError::configuration("engine must not be empty"));
        }
        if self.machine_name.trim().is_empty() {
            return Err(RunnerError::configuration("machineName must not be empty"));
        }
        if self.default_registry.trim().is_empty() {
            return Err(RunnerError::configuration(
                "defaultRegistry must not be empty",
            ));
        }
        self.verification_retry.validate().map_err(|e| {
            RunnerError::configuration(format!("invalid verification retry config: {e}"))
        })
    }
}

/// Main runner configuration
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RunnerConfig {
    #[builder(default = "String::from(\"mcp-runner\")")]
    pub name: String,
    pub connection: ConnectionDescriptor,
    #[builder(default)]
    pub settings: RunnerSettings,
    #[builder(default, setter(into, strip_option))]
    pub working_directory: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Runner configuration with default settings
    pub fn for_connection(connection: ConnectionDescriptor) -> Self {
        Self {
            name: String::from("mcp-runner"),
            connection,
            settings: RunnerSettings::default(),
            working_directory: None,
        }
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        self.connection.validate()?;
        self.settings.validate()
    }
}

impl RunnerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(connection) = &self.connection {
            connection.validate().map_err(|e| e.to_string())?;
        }
        if let Some(settings) = &self.settings {
            settings.validate().map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_min_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_use_exponential_backoff() -> bool {
    true
}
fn default_engine() -> String {
    String::from("podman")
}
fn default_machine_name() -> String {
    String::from("mcp-runner-vm")
}
fn default_registry() -> String {
    String::from("docker.io")
}
fn default_true() -> bool {
    true
}

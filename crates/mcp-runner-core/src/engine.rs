use crate::error::EngineError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Container engines recognised in a connection command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Docker,
    Podman,
}

impl EngineKind {
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "docker" => Some(EngineKind::Docker),
            "podman" => Some(EngineKind::Podman),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Captured output of a successful engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A container engine driven through its command-line interface.
///
/// Exit status and captured output are the whole contract; a non-zero exit
/// is reported as [`EngineError::Failed`].
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Executable name used for the engine
    fn program(&self) -> &str;

    async fn exec(&self, args: &[&str]) -> Result<EngineOutput, EngineError>;

    async fn pull(&self, image: &str) -> Result<EngineOutput, EngineError> {
        self.exec(&["pull", image]).await
    }

    async fn logout(&self, registry: &str) -> Result<EngineOutput, EngineError> {
        self.exec(&["logout", registry]).await
    }
}

/// Runs the engine executable as a subprocess
#[derive(Debug, Clone)]
pub struct CliEngine {
    program: String,
}

impl CliEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn program(&self) -> &str {
        &self.program
    }

    async fn exec(&self, args: &[&str]) -> Result<EngineOutput, EngineError> {
        debug!(program = %self.program, args = ?args, "Running container engine command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(EngineError::Failed {
                program: self.program.clone(),
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(EngineOutput { stdout, stderr })
    }
}

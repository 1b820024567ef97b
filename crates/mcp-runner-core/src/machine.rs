use crate::config::RetryConfig;
use crate::engine::ContainerEngine;
use crate::error::{EngineError, RunnerError};
use crate::retry::BoundedRetry;
use serde::Deserialize;
use tracing::{debug, info};

/// One entry of `machine list --format json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MachineDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Running", default)]
    pub running: bool,
}

impl MachineDescriptor {
    /// The default connection is listed with a trailing `*`
    pub fn matches(&self, machine_name: &str) -> bool {
        self.name.trim_end_matches('*') == machine_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Absent,
    Stopped,
    Running,
}

impl MachineState {
    pub fn from_list(machines: &[MachineDescriptor], machine_name: &str) -> Self {
        match machines.iter().find(|machine| machine.matches(machine_name)) {
            None => MachineState::Absent,
            Some(machine) if machine.running => MachineState::Running,
            Some(_) => MachineState::Stopped,
        }
    }
}

/// Brings the named engine virtual machine to a usable state
pub struct VmBootstrapper<'a> {
    engine: &'a dyn ContainerEngine,
    machine_name: &'a str,
    verification: BoundedRetry,
}

impl<'a> VmBootstrapper<'a> {
    pub fn new(
        engine: &'a dyn ContainerEngine,
        machine_name: &'a str,
        verification: &RetryConfig,
    ) -> Self {
        Self {
            engine,
            machine_name,
            verification: BoundedRetry::from_config(verification),
        }
    }

    pub async fn machine_state(&self) -> Result<MachineState, EngineError> {
        let args = ["machine", "list", "--format", "json"];
        let output = self.engine.exec(&args).await?;
        let stdout = output.stdout.trim();
        let machines: Vec<MachineDescriptor> = if stdout.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(stdout).map_err(|e| EngineError::InvalidOutput {
                program: self.engine.program().to_string(),
                args: args.join(" "),
                reason: e.to_string(),
            })?
        };
        Ok(MachineState::from_list(&machines, self.machine_name))
    }

    /// Create and start the machine as needed, make it the default
    /// connection, and verify that it answers.
    ///
    /// Any failure, including an exhausted verification budget, aborts startup.
    pub async fn ensure_running(&self) -> Result<(), RunnerError> {
        let name = self.machine_name;
        let state = self
            .machine_state()
            .await
            .map_err(|e| bootstrap_error(name, "listing machines", e))?;
        debug!(machine = name, ?state, "Current machine state");

        if state == MachineState::Absent {
            info!(machine = name, "Initializing machine");
            self.engine
                .exec(&["machine", "init", name])
                .await
                .map_err(|e| bootstrap_error(name, "initializing", e))?;
        }

        if state != MachineState::Running {
            info!(machine = name, "Starting machine");
            self.engine
                .exec(&["machine", "start", name])
                .await
                .map_err(|e| bootstrap_error(name, "starting", e))?;
        }

        self.engine
            .exec(&["system", "connection", "default", name])
            .await
            .map_err(|e| bootstrap_error(name, "selecting the default connection", e))?;

        self.verify().await
    }

    async fn verify(&self) -> Result<(), RunnerError> {
        let name = self.machine_name;
        info!(machine = name, "Verifying machine connection");

        let args = ["--connection", name, "info"];
        self.verification
            .run(|| self.engine.exec(&args))
            .await
            .map_err(|e| {
                RunnerError::bootstrap(format!(
                    "failed to connect to machine '{name}' after {} attempts: {e}",
                    self.verification.max_attempts()
                ))
            })?;

        info!(machine = name, "Machine connection verified");
        Ok(())
    }
}

fn bootstrap_error(machine: &str, step: &str, error: EngineError) -> RunnerError {
    RunnerError::bootstrap(format!("{step} failed for machine '{machine}': {error}"))
}

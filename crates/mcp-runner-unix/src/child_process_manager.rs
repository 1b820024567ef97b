use crate::unix_process_manager::UnixProcessManager;
use anyhow::Result;
use async_trait::async_trait;
use mcp_runner_core::command::ChildCommand;
use mcp_runner_core::config::RunnerConfig;
use mcp_runner_core::process::{ProcessId, ProcessTermination, TerminationResult};
use mcp_runner_core::process_manager_trait::{ChildProcessManager, ChildProcessManagerFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Child;
use tracing::{error, info, warn};

/// Unix implementation of [`ChildProcessManager`].
///
/// Every child is started as the leader of its own process group, so that
/// container engines and interpreter wrappers can be torn down together with
/// whatever they forked.
pub struct UnixChildProcessManager {
    platform_manager: Arc<UnixProcessManager>,
    /// Tracked pids and a label for logging
    active_processes: Arc<Mutex<HashMap<ProcessId, String>>>,
    runner_config: RunnerConfig,
}

impl UnixChildProcessManager {
    fn tracked(&self) -> Vec<ProcessId> {
        self.active_processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn runner_config(&self) -> &RunnerConfig {
        &self.runner_config
    }
}

#[async_trait]
impl ChildProcessManager for UnixChildProcessManager {
    fn new(runner_config: &RunnerConfig) -> Self {
        Self {
            platform_manager: Arc::new(UnixProcessManager::new()),
            active_processes: Arc::new(Mutex::new(HashMap::new())),
            runner_config: runner_config.clone(),
        }
    }

    async fn spawn_child(&self, command: &ChildCommand) -> std::io::Result<Child> {
        let mut tokio_command = command.to_tokio_command();
        tokio_command.process_group(0);

        let child = tokio_command.spawn()?;
        if let Some(pid) = child.id() {
            info!(pid, command = %command.display(), "Spawned child process group");
            self.active_processes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(pid, format!("{}:{}", self.runner_config.name, command.program));
        }
        Ok(child)
    }

    async fn cleanup(&self) -> Result<()> {
        for pid in self.tracked() {
            match self.platform_manager.terminate_completely(pid).await {
                TerminationResult::Success => info!(pid, "Terminated child process"),
                TerminationResult::ProcessNotFound => info!(pid, "Child process already exited"),
                other => warn!(pid, result = ?other, "Failed to terminate child process"),
            }
        }

        self.active_processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

impl Drop for UnixChildProcessManager {
    fn drop(&mut self) {
        let remaining = self.tracked();
        if remaining.is_empty() {
            return;
        }
        warn!(count = remaining.len(), "Emergency cleanup of child processes during drop");

        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid as NixPid;

        for pid in remaining {
            let group = NixPid::from_raw(pid as i32);
            if let Err(e) = signal::killpg(group, Signal::SIGTERM) {
                warn!(pid, error = %e, "Failed to send SIGTERM during drop");
                if let Err(e) = signal::kill(group, Signal::SIGKILL) {
                    error!(pid, error = %e, "Failed to send SIGKILL during drop");
                }
            }
        }
    }
}

pub struct UnixChildProcessManagerFactory;

impl ChildProcessManagerFactory for UnixChildProcessManagerFactory {
    type Manager = UnixChildProcessManager;

    fn create_process_manager(config: &RunnerConfig) -> Self::Manager {
        UnixChildProcessManager::new(config)
    }
}

use crate::windows_process_manager::WindowsProcessManager;
use anyhow::Result;
use async_trait::async_trait;
use mcp_runner_core::command::ChildCommand;
use mcp_runner_core::config::RunnerConfig;
use mcp_runner_core::process::{ProcessId, ProcessTermination, TerminationResult};
use mcp_runner_core::process_manager_trait::{ChildProcessManager, ChildProcessManagerFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Child;
use tracing::{info, warn};

/// CREATE_NO_WINDOW: no console window pops up for the server
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Windows implementation of [`ChildProcessManager`]
pub struct WindowsChildProcessManager {
    platform_manager: Arc<WindowsProcessManager>,
    active_processes: Arc<Mutex<HashMap<ProcessId, String>>>,
    runner_config: RunnerConfig,
}

impl WindowsChildProcessManager {
    fn tracked(&self) -> Vec<ProcessId> {
        self.active_processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

#[async_trait]
impl ChildProcessManager for WindowsChildProcessManager {
    fn new(runner_config: &RunnerConfig) -> Self {
        Self {
            platform_manager: Arc::new(WindowsProcessManager::new()),
            active_processes: Arc::new(Mutex::new(HashMap::new())),
            runner_config: runner_config.clone(),
        }
    }

    async fn spawn_child(&self, command: &ChildCommand) -> std::io::Result<Child> {
        let mut tokio_command = command.to_tokio_command();
        tokio_command.creation_flags(CREATE_NO_WINDOW);

        let child = tokio_command.spawn()?;
        if let Some(pid) = child.id() {
            info!(pid, command = %command.display(), "Spawned child process");
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

impl Drop for WindowsChildProcessManager {
    fn drop(&mut self) {
        let remaining = self.tracked();
        if remaining.is_empty() {
            return;
        }
        warn!(count = remaining.len(), "Emergency cleanup of child processes during drop");

        for pid in remaining {
            let result = std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .output();
            if let Err(e) = result {
                warn!(pid, error = %e, "Failed to run taskkill during drop");
            }
        }
    }
}

pub struct WindowsChildProcessManagerFactory;

impl ChildProcessManagerFactory for WindowsChildProcessManagerFactory {
    type Manager = WindowsChildProcessManager;

    fn create_process_manager(config: &RunnerConfig) -> Self::Manager {
        WindowsChildProcessManager::new(config)
    }
}

use anyhow::Result;
use async_trait::async_trait;
use mcp_runner_core::process::{
    ProcessId, ProcessTermination, TERMINATION_GRACE_PERIOD, TerminationResult,
};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, System};
use tokio::process::Command;
use tracing::{info, warn};

/// taskkill based termination of server children and their descendants
pub struct WindowsProcessManager {
    system: Mutex<System>,
}

impl Default for WindowsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowsProcessManager {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// `Ok(false)` when taskkill reports failure, usually because the pid is gone
    async fn taskkill(&self, pid: ProcessId, tree: bool, force: bool) -> Result<bool> {
        let pid = pid.to_string();
        let mut args = vec!["/PID", pid.as_str()];
        if tree {
            args.push("/T");
        }
        if force {
            args.push("/F");
        }

        let output = Command::new("taskkill").args(&args).output().await?;
        Ok(output.status.success())
    }

    fn exists(&self, pid: ProcessId) -> bool {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let pid = Pid::from_u32(pid);
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            true,
            sysinfo::ProcessRefreshKind::nothing(),
        );
        system.process(pid).is_some()
    }

    fn find_children_recursive(system: &System, parent_pid: ProcessId, result: &mut Vec<ProcessId>) {
        for (pid, process) in system.processes() {
            if process.parent().map(|ppid| ppid.as_u32()) == Some(parent_pid) {
                let child_pid = pid.as_u32();
                Self::find_children_recursive(system, child_pid, result);
                result.push(child_pid);
            }
        }
    }

    fn killed(&self, pid: ProcessId, outcome: Result<bool>, action: &str) -> TerminationResult {
        match outcome {
            Ok(true) => {
                info!(pid, action, "taskkill succeeded");
                TerminationResult::Success
            }
            Ok(false) => {
                info!(pid, action, "Process not found");
                TerminationResult::ProcessNotFound
            }
            Err(e) => {
                warn!(pid, action, error = %e, "taskkill failed");
                TerminationResult::Failed(format!("{action} failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl ProcessTermination for WindowsProcessManager {
    async fn is_running(&self, pid: ProcessId) -> bool {
        self.exists(pid)
    }

    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
        let outcome = self.taskkill(pid, false, false).await;
        self.killed(pid, outcome, "graceful termination")
    }

    async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
        let outcome = self.taskkill(pid, false, true).await;
        self.killed(pid, outcome, "force kill")
    }

    async fn find_child_processes(&self, pid: ProcessId) -> Result<Vec<ProcessId>> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::All,
            true,
            sysinfo::ProcessRefreshKind::nothing(),
        );

        let mut children = Vec::new();
        Self::find_children_recursive(&system, pid, &mut children);
        Ok(children)
    }

    async fn terminate_process_tree(&self, root_pid: ProcessId) -> TerminationResult {
        match self.taskkill(root_pid, true, true).await {
            Ok(true) => {
                info!(root_pid, "Terminated process tree");
                return TerminationResult::Success;
            }
            Ok(false) => return TerminationResult::ProcessNotFound,
            Err(e) => warn!(root_pid, error = %e, "taskkill /T failed, terminating tree manually"),
        }

        let children = match self.find_child_processes(root_pid).await {
            Ok(children) => children,
            Err(e) => {
                return TerminationResult::Failed(format!("Failed to enumerate children: {e}"));
            }
        };
        for child_pid in children {
            let result = self.force_kill(child_pid).await;
            if !result.is_terminated() {
                warn!(pid = child_pid, ?result, "Failed to terminate child process");
            }
        }

        match self.terminate_gracefully(root_pid).await {
            TerminationResult::Success => {
                tokio::time::sleep(TERMINATION_GRACE_PERIOD).await;
                if self.exists(root_pid) {
                    self.force_kill(root_pid).await
                } else {
                    TerminationResult::Success
                }
            }
            other => other,
        }
    }

    async fn terminate_process_group(&self, _pid: ProcessId) -> TerminationResult {
        // No Unix style process groups here
        TerminationResult::ProcessNotFound
    }
}

use anyhow::Result;
use async_trait::async_trait;
use mcp_runner_core::process::{
    ProcessId, ProcessTermination, TERMINATION_GRACE_PERIOD, TerminationResult,
};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use std::sync::{Mutex, PoisonError};
use sysinfo::System;
use tracing::{debug, info, warn};

/// Signal based termination of server children and their descendants
pub struct UnixProcessManager {
    system: Mutex<System>,
}

impl Default for UnixProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixProcessManager {
    pub fn new() -> Self {
        debug!("Initializing Unix process manager");
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn nix_pid(pid: ProcessId) -> NixPid {
        NixPid::from_raw(pid as i32)
    }

    fn send_signal(pid: ProcessId, signal: Signal) -> TerminationResult {
        match signal::kill(Self::nix_pid(pid), signal) {
            Ok(()) => {
                info!(pid, signal = %signal, "Signalled process");
                TerminationResult::Success
            }
            Err(Errno::ESRCH) => {
                debug!(pid, "Process not found (already terminated)");
                TerminationResult::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!(pid, signal = %signal, "Permission denied to signal process");
                TerminationResult::PermissionDenied
            }
            Err(e) => {
                warn!(pid, signal = %signal, error = %e, "Failed to signal process");
                TerminationResult::Failed(format!("{signal} failed: {e}"))
            }
        }
    }

    /// SIGTERM, a grace period, then SIGKILL if the process survived
    async fn terminate_single_process(&self, pid: ProcessId) -> TerminationResult {
        match Self::send_signal(pid, Signal::SIGTERM) {
            TerminationResult::Success => {
                tokio::time::sleep(TERMINATION_GRACE_PERIOD).await;
                match Self::send_signal(pid, Signal::SIGKILL) {
                    TerminationResult::ProcessNotFound => TerminationResult::Success,
                    other => other,
                }
            }
            TerminationResult::ProcessNotFound => TerminationResult::Success,
            other => other,
        }
    }

    /// Descendants of `parent_pid`, deepest first
    fn find_children_recursive(system: &System, parent_pid: ProcessId, result: &mut Vec<ProcessId>) {
        for (pid, process) in system.processes() {
            if process.parent().map(|ppid| ppid.as_u32()) == Some(parent_pid) {
                let child_pid = pid.as_u32();
                Self::find_children_recursive(system, child_pid, result);
                result.push(child_pid);
            }
        }
    }
}

#[async_trait]
impl ProcessTermination for UnixProcessManager {
    async fn is_running(&self, pid: ProcessId) -> bool {
        // Signal 0 only probes for existence
        signal::kill(Self::nix_pid(pid), None).is_ok()
    }

    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult {
        Self::send_signal(pid, Signal::SIGTERM)
    }

    async fn force_kill(&self, pid: ProcessId) -> TerminationResult {
        Self::send_signal(pid, Signal::SIGKILL)
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
        let children = match self.find_child_processes(root_pid).await {
            Ok(children) => children,
            Err(e) => {
                warn!(root_pid, error = %e, "Failed to enumerate child processes");
                return TerminationResult::Failed(format!("Failed to enumerate children: {e}"));
            }
        };

        if !children.is_empty() {
            info!(root_pid, count = children.len(), "Terminating child processes");
        }
        for child_pid in children {
            let result = self.terminate_single_process(child_pid).await;
            if !result.is_terminated() {
                warn!(pid = child_pid, ?result, "Failed to terminate child process");
            }
        }

        self.terminate_single_process(root_pid).await
    }

    async fn terminate_process_group(&self, pid: ProcessId) -> TerminationResult {
        let pgid = Self::nix_pid(pid);

        match signal::killpg(pgid, Signal::SIGTERM) {
            Ok(()) => {
                info!(pgid = pid, "Sent SIGTERM to process group");
                tokio::time::sleep(TERMINATION_GRACE_PERIOD).await;

                match signal::killpg(pgid, Signal::SIGKILL) {
                    Ok(()) => {
                        info!(pgid = pid, "Sent SIGKILL to process group");
                        TerminationResult::Success
                    }
                    Err(Errno::ESRCH) => TerminationResult::Success,
                    Err(e) => {
                        warn!(pgid = pid, error = %e, "Failed to send SIGKILL to process group");
                        TerminationResult::Failed(format!("SIGKILL to process group failed: {e}"))
                    }
                }
            }
            Err(Errno::ESRCH) => {
                debug!(pgid = pid, "Process group not found");
                TerminationResult::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!(pgid = pid, "Permission denied to terminate process group");
                TerminationResult::PermissionDenied
            }
            Err(e) => {
                warn!(pgid = pid, error = %e, "Failed to send SIGTERM to process group");
                TerminationResult::Failed(format!("SIGTERM to process group failed: {e}"))
            }
        }
    }
}

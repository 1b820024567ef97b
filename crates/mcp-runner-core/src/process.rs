use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Operating system identifier of a spawned child
pub type ProcessId = u32;

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Process was successfully terminated
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges to signal the process
    PermissionDenied,
    /// Process survived the grace period
    Timeout,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// A process that is already gone counts as terminated
    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// Grace period between a termination request and a forced kill
pub const TERMINATION_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Platform termination strategies for a child and its descendants
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Whether `pid` still refers to a live process
    async fn is_running(&self, pid: ProcessId) -> bool;

    /// Ask a single process to exit (SIGTERM on Unix)
    async fn terminate_gracefully(&self, pid: ProcessId) -> TerminationResult;

    /// Force kill a single process (SIGKILL on Unix)
    async fn force_kill(&self, pid: ProcessId) -> TerminationResult;

    /// Find all descendants of a given process
    async fn find_child_processes(&self, pid: ProcessId) -> Result<Vec<ProcessId>>;

    /// Terminate an entire process tree (parent and all descendants)
    async fn terminate_process_tree(&self, root_pid: ProcessId) -> TerminationResult;

    /// Terminate a process group (Unix only, returns ProcessNotFound on Windows)
    async fn terminate_process_group(&self, pid: ProcessId) -> TerminationResult;

    /// Complete termination strategy: process group -> process tree -> individual process
    async fn terminate_completely(&self, pid: ProcessId) -> TerminationResult {
        if self.terminate_process_group(pid).await == TerminationResult::Success {
            return TerminationResult::Success;
        }

        if self.terminate_process_tree(pid).await == TerminationResult::Success {
            return TerminationResult::Success;
        }

        match self.terminate_gracefully(pid).await {
            TerminationResult::Success => {
                tokio::time::sleep(TERMINATION_GRACE_PERIOD).await;
                if self.is_running(pid).await {
                    self.force_kill(pid).await
                } else {
                    TerminationResult::Success
                }
            }
            TerminationResult::ProcessNotFound => TerminationResult::Success,
            _ => self.force_kill(pid).await,
        }
    }
}

use crate::command::ChildCommand;
use crate::config::RunnerConfig;
use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Child;

/// Platform process manager owning the lifetime of the server child.
///
/// Implementations spawn the child in a way that lets them terminate its whole
/// process tree later, track every spawned process, and terminate whatever is
/// still tracked on `cleanup` or on drop.
#[async_trait]
pub trait ChildProcessManager: Send + Sync + 'static {
    /// Create a new process manager instance for the given configuration
    fn new(runner_config: &RunnerConfig) -> Self
    where
        Self: Sized;

    /// Spawn `command` with piped stdio and start tracking it.
    async fn spawn_child(&self, command: &ChildCommand) -> std::io::Result<Child>;

    /// Terminate all tracked processes and stop tracking them.
    ///
    /// Calling it again after everything has been cleaned up is a no-op.
    async fn cleanup(&self) -> Result<()>;
}

/// Factory trait for creating platform-specific [`ChildProcessManager`] implementations
pub trait ChildProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ChildProcessManager;

    fn create_process_manager(config: &RunnerConfig) -> Self::Manager;
}

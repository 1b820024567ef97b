use mcp_runner_core::config::RunnerConfig;
use mcp_runner_core::process_manager_trait::ChildProcessManagerFactory;

/// Selects the child process manager of the target platform at compile time
pub struct PlatformChildProcessManagerFactory;

impl ChildProcessManagerFactory for PlatformChildProcessManagerFactory {
    #[cfg(unix)]
    type Manager = mcp_runner_unix::UnixChildProcessManager;

    #[cfg(windows)]
    type Manager = mcp_runner_windows::WindowsChildProcessManager;

    fn create_process_manager(config: &RunnerConfig) -> Self::Manager {
        #[cfg(unix)]
        return mcp_runner_unix::UnixChildProcessManagerFactory::create_process_manager(config);

        #[cfg(windows)]
        return mcp_runner_windows::WindowsChildProcessManagerFactory::create_process_manager(
            config,
        );
    }
}

pub type PlatformManager = <PlatformChildProcessManagerFactory as ChildProcessManagerFactory>::Manager;

pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    return mcp_runner_unix::platform_name();

    #[cfg(windows)]
    return mcp_runner_windows::platform_name();
}

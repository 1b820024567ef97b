#[cfg(windows)]
mod child_process_manager;
#[cfg(windows)]
mod windows_process_manager;

#[cfg(windows)]
pub use child_process_manager::{WindowsChildProcessManager, WindowsChildProcessManagerFactory};
#[cfg(windows)]
pub use windows_process_manager::WindowsProcessManager;

pub fn platform_name() -> &'static str {
    "Windows"
}

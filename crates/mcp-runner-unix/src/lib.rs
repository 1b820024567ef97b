#[cfg(unix)]
mod child_process_manager;
#[cfg(unix)]
mod unix_process_manager;

#[cfg(unix)]
pub use child_process_manager::{UnixChildProcessManager, UnixChildProcessManagerFactory};
#[cfg(unix)]
pub use unix_process_manager::UnixProcessManager;

pub fn platform_name() -> &'static str {
    "Unix"
}

//! MCP Runner - start an MCP server as a child process and bridge its stdio.
//!
//! Container servers (`docker`/`podman` commands) get their engine VM
//! provisioned and their image pre-pulled before the child is spawned.

pub mod cli;
pub mod factory;
pub mod logging;
mod runner;

pub use factory::{PlatformChildProcessManagerFactory, PlatformManager, platform_name};
pub use runner::{McpRunner, create_runner, startup_failure_hint};

// Re-export core functionality
pub use mcp_runner_core::*;

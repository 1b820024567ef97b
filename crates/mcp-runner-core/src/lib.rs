//! MCP Runner Core - Platform-independent building blocks of the stdio runner
//!
//! This crate holds the configuration, the container command preparation, the
//! transport bridge between the parent's stdio and the child server, and the
//! traits the platform crates implement to manage the child process.

pub mod bridge;
pub mod channel;
pub mod command;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod environment;
pub mod error;
pub mod framing;
pub mod image;
pub mod lifecycle;
pub mod machine;
pub mod message;
pub mod process;
pub mod process_manager_trait;
pub mod pull;
pub mod retry;
pub mod runner;
pub mod stdio;

#[cfg(test)]
mod testing;

pub use bridge::{RuntimeState, TransportBridge};
pub use channel::{ChannelEvent, ChildChannel, StdioChannel};
pub use command::ChildCommand;
pub use config::*;
pub use engine::{CliEngine, ContainerEngine, EngineKind, EngineOutput};
pub use error::*;
pub use lifecycle::{ExitReason, LifecycleController};
pub use message::{Message, MessageKind};
pub use process::{ProcessId, ProcessTermination, TerminationResult};
pub use process_manager_trait::{ChildProcessManager, ChildProcessManagerFactory};
pub use runner::{Initialized, RunnerInner, Uninitialized};
pub use stdio::{CapturedOutput, OutputSink};

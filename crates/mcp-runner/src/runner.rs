use crate::factory::{PlatformChildProcessManagerFactory, PlatformManager};
use mcp_runner_core::config::{ConnectionDescriptor, RunnerConfig};
use mcp_runner_core::engine::ContainerEngine;
use mcp_runner_core::error::{BridgeError, RunnerError};
use mcp_runner_core::lifecycle::ExitReason;
use mcp_runner_core::message::Message;
use mcp_runner_core::process_manager_trait::ChildProcessManagerFactory;
use mcp_runner_core::runner::{Initialized, RunnerInner, Uninitialized};
use mcp_runner_core::stdio::OutputSink;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Platform-independent runner for one MCP server child
pub struct McpRunner<Status> {
    inner: RunnerInner<Status, PlatformManager>,
}

impl McpRunner<Uninitialized> {
    /// Runner bridging the process's own stdout and stderr
    pub fn new(config: RunnerConfig) -> Self {
        Self::new_with_output(config, OutputSink::stdout(), OutputSink::stderr())
    }

    pub fn new_with_output(config: RunnerConfig, out: OutputSink, err: OutputSink) -> Self {
        let manager = PlatformChildProcessManagerFactory::create_process_manager(&config);
        Self {
            inner: RunnerInner::new(config, manager, out, err),
        }
    }

    pub fn with_shutdown_token(self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.with_shutdown_token(token),
        }
    }

    /// Prepare the command (VM bootstrap, image pull) and spawn the child
    pub async fn connect(self) -> Result<McpRunner<Initialized>, RunnerError> {
        let inner = self.inner.connect().await?;
        Ok(McpRunner { inner })
    }

    /// [`McpRunner::connect`] against a specific engine implementation
    pub async fn connect_with_engine(
        self,
        engine: &dyn ContainerEngine,
    ) -> Result<McpRunner<Initialized>, RunnerError> {
        let inner = self.inner.connect_with_engine(engine).await?;
        Ok(McpRunner { inner })
    }
}

impl McpRunner<Initialized> {
    /// Build and connect a runner with default settings
    pub async fn create(connection: ConnectionDescriptor) -> Result<Self, RunnerError> {
        McpRunner::new(RunnerConfig::for_connection(connection))
            .connect()
            .await
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown_token()
    }

    /// Request a clean shutdown on SIGINT/SIGTERM (Ctrl-C on Windows)
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        self.inner.listen_for_signals()
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), BridgeError> {
        self.inner.send(message).await
    }

    /// Bridge `inbound` and the child until the runner has to exit
    pub async fn run<R: AsyncRead + Unpin>(&mut self, inbound: R) -> ExitReason {
        self.inner.run(inbound).await
    }

    pub async fn cleanup(&mut self) -> ExitReason {
        self.inner.cleanup().await
    }
}

/// Start the server described by `connection` with default settings.
///
/// The returned runner is connected; drive it with [`McpRunner::run`] and
/// exit with [`ExitReason::code`].
pub async fn create_runner(
    connection: ConnectionDescriptor,
) -> Result<McpRunner<Initialized>, RunnerError> {
    McpRunner::create(connection).await
}

/// Operator guidance for a runner that failed to connect
pub fn startup_failure_hint(error: &RunnerError) -> &'static str {
    if error.is_permanent() {
        "Fix the connection descriptor or runner settings before starting again"
    } else if error.is_retryable() {
        "The container engine or I/O failed, starting again may succeed"
    } else {
        "Unexpected failure while starting the server"
    }
}

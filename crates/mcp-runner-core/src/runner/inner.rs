use crate::bridge::TransportBridge;
use crate::channel::{ChannelEvent, StdioChannel};
use crate::command::ChildCommand;
use crate::config::RunnerConfig;
use crate::engine::{CliEngine, ContainerEngine};
use crate::error::{BridgeError, RunnerError};
use crate::lifecycle::{ExitReason, LifecycleController};
use crate::message::Message;
use crate::process_manager_trait::ChildProcessManager;
use crate::runner::container::prepare_container_command;
use crate::stdio::OutputSink;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Initialized;

pub struct Uninitialized;

pub struct RunnerInner<Status, M: ChildProcessManager> {
    runner_config: RunnerConfig,
    manager: Option<M>,
    bridge: TransportBridge<StdioChannel<M>>,
    events: Option<UnboundedReceiver<ChannelEvent>>,
    /// Exit already decided while connecting, e.g. the child failed to spawn
    pending_exit: Option<ExitReason>,
    lifecycle: LifecycleController,
    err: OutputSink,
    _status: std::marker::PhantomData<Status>,
}

impl<M: ChildProcessManager> RunnerInner<Uninitialized, M> {
    /// `out` receives messages for the parent, `err` the child's diagnostics
    pub fn new(runner_config: RunnerConfig, manager: M, out: OutputSink, err: OutputSink) -> Self {
        Self {
            runner_config,
            manager: Some(manager),
            bridge: TransportBridge::new(out),
            events: None,
            pending_exit: None,
            lifecycle: LifecycleController::new(),
            err,
            _status: Default::default(),
        }
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.lifecycle = LifecycleController::with_token(token);
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.lifecycle.shutdown_token()
    }

    /// Connect using the configured container engine executable
    pub async fn connect(self) -> Result<RunnerInner<Initialized, M>, RunnerError> {
        let engine = CliEngine::new(self.runner_config.settings.engine.clone());
        self.connect_with_engine(&engine).await
    }

    /// Prepare the command and start the child channel.
    ///
    /// Configuration and VM bootstrap failures are errors. A channel that
    /// fails to start is not: the failure is recorded and reported as the
    /// exit reason of [`RunnerInner::run`].
    pub async fn connect_with_engine(
        mut self,
        engine: &dyn ContainerEngine,
    ) -> Result<RunnerInner<Initialized, M>, RunnerError> {
        self.runner_config.validate()?;
        info!(name = %self.runner_config.name, "Starting child process");

        let manager = self
            .manager
            .take()
            .ok_or_else(|| RunnerError::configuration("runner was already connected"))?;

        let prepared = prepare_container_command(
            engine,
            &self.runner_config.connection,
            &self.runner_config.settings,
        )
        .await?;
        let command =
            ChildCommand::for_config(&self.runner_config, prepared.program, prepared.args);
        info!(command = %command.display(), "Executing");

        let channel = StdioChannel::new(command, manager, self.err.clone());
        match self.bridge.start(channel).await {
            Ok(events) => self.events = Some(events),
            Err(e) => self.pending_exit = Some(self.bridge.on_channel_error(&e)),
        }

        Ok(RunnerInner {
            runner_config: self.runner_config,
            manager: None,
            bridge: self.bridge,
            events: self.events,
            pending_exit: self.pending_exit,
            lifecycle: self.lifecycle,
            err: self.err,
            _status: Default::default(),
        })
    }
}

impl<M: ChildProcessManager> RunnerInner<Initialized, M> {
    pub fn is_ready(&self) -> bool {
        self.bridge.is_ready()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.lifecycle.shutdown_token()
    }

    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        self.lifecycle.listen_for_signals()
    }

    /// Forward one message to the child
    pub async fn send(&mut self, message: &Message) -> Result<(), BridgeError> {
        self.bridge.send(message).await
    }

    /// Relay between `inbound` and the child until the runner has to exit
    pub async fn run<R: AsyncRead + Unpin>(&mut self, inbound: R) -> ExitReason {
        if let Some(reason) = self.pending_exit.take() {
            self.bridge.release().await;
            return reason;
        }
        let Some(events) = self.events.take() else {
            return self.bridge.on_channel_closed();
        };
        let reason = self.lifecycle.drive(&mut self.bridge, events, inbound).await;
        info!(%reason, code = reason.code(), "Runner finished");
        reason
    }

    /// Release the child and report a clean exit. Safe to call repeatedly.
    pub async fn cleanup(&mut self) -> ExitReason {
        self.bridge.cleanup().await
    }
}

use crate::command::ChildCommand;
use crate::error::ChannelError;
use crate::framing::{MessageCodec, relay_text};
use crate::message::Message;
use crate::process_manager_trait::ChildProcessManager;
use crate::stdio::OutputSink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// Something that happened on the child side of the channel
#[derive(Debug)]
pub enum ChannelEvent {
    Message(Message),
    Error(ChannelError),
    /// The child's output ended and the process exited
    Closed,
}

/// Bidirectional message channel to a child server
#[async_trait]
pub trait ChildChannel: Send {
    /// Start the child. Events arrive on the returned receiver in the order
    /// the child produced them.
    async fn start(&mut self) -> Result<UnboundedReceiver<ChannelEvent>, ChannelError>;

    /// Write one message to the child's input
    async fn send(&mut self, message: &Message) -> Result<(), ChannelError>;

    /// Stop the child and release its resources. Repeated calls are no-ops.
    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// [`ChildChannel`] over the stdio pipes of a process spawned by a platform manager
pub struct StdioChannel<M: ChildProcessManager> {
    command: ChildCommand,
    manager: Arc<M>,
    diagnostics: OutputSink,
    stdin: Option<ChildStdin>,
    tasks: Vec<JoinHandle<()>>,
}

impl<M: ChildProcessManager> StdioChannel<M> {
    /// `diagnostics` receives whatever the child writes to its stderr
    pub fn new(command: ChildCommand, manager: M, diagnostics: OutputSink) -> Self {
        Self {
            command,
            manager: Arc::new(manager),
            diagnostics,
            stdin: None,
            tasks: Vec::new(),
        }
    }

    pub fn command(&self) -> &ChildCommand {
        &self.command
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl<M: ChildProcessManager> ChildChannel for StdioChannel<M> {
    async fn start(&mut self) -> Result<UnboundedReceiver<ChannelEvent>, ChannelError> {
        let mut child = self
            .manager
            .spawn_child(&self.command)
            .await
            .map_err(|source| ChannelError::Spawn {
                command: self.command.display(),
                source,
            })?;
        info!(command = %self.command.display(), pid = ?child.id(), "Child process started");

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ChannelError::Io(std::io::Error::other(
                "child stdio was not piped",
            )));
        };
        self.stdin = Some(stdin);

        if let Some(stderr) = child.stderr.take() {
            let diagnostics = self.diagnostics.clone();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = relay_text(stderr, diagnostics).await {
                    debug!(error = %e, "Stopped relaying child stderr");
                }
            }));
        }

        let (tx, rx) = unbounded_channel();
        self.tasks.push(tokio::spawn(async move {
            let mut frames = FramedRead::new(stdout, MessageCodec);
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(message) => {
                        if tx.send(ChannelEvent::Message(message)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(ChannelEvent::Error(e));
                        return;
                    }
                }
            }
            report_exit(child, &tx).await;
        }));

        Ok(rx)
    }

    async fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        let stdin = self.stdin.as_mut().ok_or(ChannelError::Closed)?;
        stdin.write_all(message.to_line().as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.stdin.take().is_none() && self.tasks.is_empty() {
            return Ok(());
        }
        debug!(command = %self.command.display(), "Closing child channel");

        let result = self.manager.cleanup().await;
        self.abort_tasks();
        result.map_err(|e| ChannelError::Io(std::io::Error::other(e.to_string())))
    }
}

impl<M: ChildProcessManager> Drop for StdioChannel<M> {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

async fn report_exit(mut child: tokio::process::Child, tx: &UnboundedSender<ChannelEvent>) {
    match child.wait().await {
        Ok(status) => info!(%status, "Child process exited"),
        Err(e) => warn!(error = %e, "Failed to wait for child process"),
    }
    let _ = tx.send(ChannelEvent::Closed);
}

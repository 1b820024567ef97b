use crate::bridge::TransportBridge;
use crate::channel::{ChannelEvent, ChildChannel};
use crate::error::ChannelFailureKind;
use crate::framing::Utf8ChunkCodec;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the runner stopped, and with which process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Termination was requested and cleanup ran
    Cleanup,
    /// The child went away before the channel became ready
    ClosedBeforeReady,
    /// The child went away mid-session
    UnexpectedTermination,
    ChannelFailure(ChannelFailureKind),
}

impl ExitReason {
    pub fn code(&self) -> i32 {
        if self.is_clean() { 0 } else { 1 }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, ExitReason::Cleanup | ExitReason::ClosedBeforeReady)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Cleanup => write!(f, "cleanup"),
            ExitReason::ClosedBeforeReady => write!(f, "child closed before ready"),
            ExitReason::UnexpectedTermination => write!(f, "child terminated unexpectedly"),
            ExitReason::ChannelFailure(kind) => write!(f, "channel failure ({kind:?})"),
        }
    }
}

/// Serializes parent input, child events and termination requests onto one
/// loop, and decides how the runner exits.
#[derive(Debug, Clone, Default)]
pub struct LifecycleController {
    shutdown: CancellationToken,
}

impl LifecycleController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Cancelling this token requests a clean shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the shutdown token on SIGINT or SIGTERM (Ctrl-C or Ctrl-Break on Windows)
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(signal) => info!(signal, "Received termination signal"),
                Err(e) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            }
            shutdown.cancel();
        })
    }

    /// Run until the child goes away or shutdown is requested.
    ///
    /// The channel is released on every path; only a shutdown request runs
    /// the clean exit path.
    pub async fn drive<C, R>(
        &self,
        bridge: &mut TransportBridge<C>,
        mut events: UnboundedReceiver<ChannelEvent>,
        inbound: R,
    ) -> ExitReason
    where
        C: ChildChannel,
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(inbound, Utf8ChunkCodec);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    return bridge.cleanup().await;
                }

                event = events.recv() => {
                    let reason = match event {
                        Some(ChannelEvent::Message(message)) => {
                            if let Err(e) = bridge.handle_outbound(&message).await {
                                warn!(error = %e, "Failed to write message to parent");
                            }
                            continue;
                        }
                        Some(ChannelEvent::Error(e)) => bridge.on_channel_error(&e),
                        Some(ChannelEvent::Closed) | None => bridge.on_channel_closed(),
                    };
                    bridge.release().await;
                    return reason;
                }

                chunk = frames.next(), if inbound_open => match chunk {
                    Some(Ok(text)) => {
                        bridge.handle_inbound(&text).await;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Stopped reading parent input");
                        inbound_open = false;
                    }
                    None => {
                        debug!("Parent input closed");
                        inbound_open = false;
                    }
                },
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(windows)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::windows::{ctrl_break, ctrl_c};

    let mut interrupt = ctrl_c()?;
    let mut brk = ctrl_break()?;
    tokio::select! {
        _ = interrupt.recv() => Ok("Ctrl-C"),
        _ = brk.recv() => Ok("Ctrl-Break"),
    }
}

#[cfg(not(any(unix, windows)))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}

use crate::channel::{ChannelEvent, ChildChannel};
use crate::error::{BridgeError, ChannelError};
use crate::framing::drain_complete_lines;
use crate::lifecycle::ExitReason;
use crate::message::Message;
use crate::stdio::OutputSink;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Mutable state shared by the bridge and the lifecycle controller
#[derive(Debug)]
pub struct RuntimeState<C> {
    /// Live channel to the child; `None` before start and after cleanup
    pub transport: Option<C>,
    /// Set once the channel acknowledged startup, cleared on teardown
    pub ready: bool,
    /// Parent input not yet terminated by a line break
    pub inbound_buffer: String,
}

impl<C> Default for RuntimeState<C> {
    fn default() -> Self {
        Self {
            transport: None,
            ready: false,
            inbound_buffer: String::new(),
        }
    }
}

/// Relays newline-delimited JSON-RPC between the parent's stdio and a child channel
pub struct TransportBridge<C: ChildChannel> {
    state: RuntimeState<C>,
    out: OutputSink,
}

impl<C: ChildChannel> TransportBridge<C> {
    /// `out` is the parent's outbound stream
    pub fn new(out: OutputSink) -> Self {
        Self {
            state: RuntimeState::default(),
            out,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.ready
    }

    /// Parent input held back until it is complete or the bridge is ready
    pub fn buffered(&self) -> &str {
        &self.state.inbound_buffer
    }

    /// Start `channel` and become ready once it is up
    pub async fn start(
        &mut self,
        mut channel: C,
    ) -> Result<UnboundedReceiver<ChannelEvent>, ChannelError> {
        let events = channel.start().await?;
        self.state.transport = Some(channel);
        self.state.ready = true;
        info!("Transport ready");
        Ok(events)
    }

    /// Buffer a chunk of parent input and forward every complete line.
    ///
    /// Returns the number of messages forwarded. Lines that are not valid
    /// messages, or that the child does not accept, are logged and dropped.
    pub async fn handle_inbound(&mut self, chunk: &str) -> usize {
        self.state.inbound_buffer.push_str(chunk);
        if !self.state.ready {
            return 0;
        }

        let mut forwarded = 0;
        for line in drain_complete_lines(&mut self.state.inbound_buffer) {
            let message = match Message::parse(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Dropping unparsable input line");
                    continue;
                }
            };
            match self.send(&message).await {
                Ok(()) => forwarded += 1,
                Err(e) => error!(error = %e, "Failed to send message to child process"),
            }
        }
        forwarded
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), BridgeError> {
        if !self.state.ready {
            return Err(BridgeError::NotReady);
        }
        let transport = self.state.transport.as_mut().ok_or(BridgeError::NotReady)?;
        transport.send(message).await?;
        Ok(())
    }

    /// Write a child message to the parent. Error responses are logged unless
    /// they only report an unknown method; forwarding never depends on content.
    pub async fn handle_outbound(&self, message: &Message) -> std::io::Result<()> {
        if let Some(envelope) = message.error_envelope() {
            if !envelope.is_method_not_found() {
                warn!(
                    code = ?envelope.code,
                    error_message = envelope.message.as_deref().unwrap_or_default(),
                    "Child process returned an error"
                );
            }
        }
        self.out.write_text(&message.to_line()).await
    }

    /// Exit decision for the channel closing on its own
    pub fn on_channel_closed(&self) -> ExitReason {
        if self.state.ready {
            error!("Child process terminated unexpectedly while running");
            ExitReason::UnexpectedTermination
        } else {
            info!("Child process terminated");
            ExitReason::ClosedBeforeReady
        }
    }

    /// Exit decision for a channel failure; always abnormal
    pub fn on_channel_error(&self, error: &ChannelError) -> ExitReason {
        let kind = error.classify();
        error!(error = %error, "Child process error");
        if let Some(hint) = kind.hint() {
            error!("{hint}");
        }
        ExitReason::ChannelFailure(kind)
    }

    /// Close the channel if one is held. A no-op once the handle is cleared.
    pub async fn release(&mut self) {
        self.state.ready = false;
        if let Some(mut transport) = self.state.transport.take() {
            if let Err(e) = transport.close().await {
                warn!(error = %e, "Error while closing child channel");
            }
        }
    }

    /// The clean shutdown path: release the channel and exit with status zero
    pub async fn cleanup(&mut self) -> ExitReason {
        info!("Starting cleanup");
        self.release().await;
        debug!("Cleanup completed");
        ExitReason::Cleanup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelFailureKind;
    use crate::stdio::CapturedOutput;
    use crate::testing::RecordingChannel;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn started() -> (
        TransportBridge<RecordingChannel>,
        Arc<Mutex<Vec<Message>>>,
        CapturedOutput,
    ) {
        let (out, captured) = OutputSink::capture();
        let mut bridge = TransportBridge::new(out);
        let channel = RecordingChannel::new();
        let sent = channel.sent.clone();
        bridge.start(channel).await.unwrap();
        (bridge, sent, captured)
    }

    fn stream_of(count: usize) -> String {
        (0..count)
            .map(|id| format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"method\":\"ping\"}}\n"))
            .collect()
    }

    #[tokio::test]
    async fn test_messages_survive_arbitrary_chunking() {
        let stream = stream_of(3);
        for split in 0..=stream.len() {
            let (mut bridge, sent, _) = started().await;
            let (a, b) = stream.split_at(split);

            let forwarded = bridge.handle_inbound(a).await + bridge.handle_inbound(b).await;

            assert_eq!(forwarded, 3, "split at {split}");
            let ids: Vec<_> = RecordingChannel::sent_values(&sent)
                .into_iter()
                .map(|value| value["id"].clone())
                .collect();
            assert_eq!(ids, vec![json!(0), json!(1), json!(2)]);
            assert!(bridge.buffered().is_empty());
        }
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let (mut bridge, sent, _) = started().await;
        let stream = stream_of(2).replace('\n', "\r\n");
        for ch in stream.chars() {
            bridge.handle_inbound(&ch.to_string()).await;
        }
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_line_is_dropped() {
        let (mut bridge, sent, _) = started().await;
        let input = "{\"id\":1,\"method\":\"a\"}\nnot json\n\n{\"id\":2,\"method\":\"b\"}\n";

        assert_eq!(bridge.handle_inbound(input).await, 2);

        let values = RecordingChannel::sent_values(&sent);
        assert_eq!(values[0]["method"], "a");
        assert_eq!(values[1]["method"], "b");
    }

    #[tokio::test]
    async fn test_partial_line_is_retained() {
        let (mut bridge, sent, _) = started().await;
        assert_eq!(bridge.handle_inbound("{\"id\":1,").await, 0);
        assert_eq!(bridge.buffered(), "{\"id\":1,");
        assert_eq!(bridge.handle_inbound("\"method\":\"x\"}\n").await, 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_input_before_ready_is_buffered() {
        let (out, _) = OutputSink::capture();
        let mut bridge = TransportBridge::new(out);
        assert_eq!(bridge.handle_inbound(&stream_of(1)).await, 0);
        assert!(!bridge.buffered().is_empty());

        let channel = RecordingChannel::new();
        let sent = channel.sent.clone();
        bridge.start(channel).await.unwrap();
        assert_eq!(bridge.handle_inbound("").await, 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_not_ready() {
        let (out, _) = OutputSink::capture();
        let mut bridge: TransportBridge<RecordingChannel> = TransportBridge::new(out);
        let message = Message::from_value(json!({"id": 1, "method": "ping"})).unwrap();

        assert!(matches!(bridge.send(&message).await, Err(BridgeError::NotReady)));

        let (mut bridge, _, _) = started().await;
        assert_eq!(bridge.cleanup().await, ExitReason::Cleanup);
        assert!(matches!(bridge.send(&message).await, Err(BridgeError::NotReady)));
    }

    #[tokio::test]
    async fn test_outbound_forwards_everything() {
        let (bridge, _, captured) = started().await;
        let messages = [
            json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}),
            json!({"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "Method not found"}}),
            json!({"jsonrpc": "2.0", "id": 3, "error": {"code": -32603, "message": "boom"}}),
        ];
        for value in &messages {
            let message = Message::from_value(value.clone()).unwrap();
            bridge.handle_outbound(&message).await.unwrap();
        }

        let lines = captured.lines();
        assert_eq!(lines.len(), 3);
        for (line, value) in lines.iter().zip(&messages) {
            assert_eq!(&serde_json::from_str::<serde_json::Value>(line).unwrap(), value);
        }
    }

    #[tokio::test]
    async fn test_close_before_ready_is_clean() {
        let (out, _) = OutputSink::capture();
        let bridge: TransportBridge<RecordingChannel> = TransportBridge::new(out);
        let reason = bridge.on_channel_closed();
        assert_eq!(reason, ExitReason::ClosedBeforeReady);
        assert_eq!(reason.code(), 0);
    }

    #[tokio::test]
    async fn test_close_after_ready_is_abnormal() {
        let (bridge, _, _) = started().await;
        let reason = bridge.on_channel_closed();
        assert_eq!(reason, ExitReason::UnexpectedTermination);
        assert_eq!(reason.code(), 1);
    }

    #[tokio::test]
    async fn test_channel_error_is_abnormal() {
        let (bridge, _, _) = started().await;
        let error = ChannelError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "permission denied",
        ));
        let reason = bridge.on_channel_error(&error);
        assert_eq!(
            reason,
            ExitReason::ChannelFailure(ChannelFailureKind::PermissionDenied)
        );
        assert_eq!(reason.code(), 1);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_bridge_not_ready() {
        let (out, _) = OutputSink::capture();
        let mut bridge = TransportBridge::new(out);
        let error = bridge.start(RecordingChannel::failing()).await.unwrap_err();
        assert_eq!(error.classify(), ChannelFailureKind::SpawnFailure);
        assert!(!bridge.is_ready());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let (out, _) = OutputSink::capture();
        let mut bridge = TransportBridge::new(out);
        let channel = RecordingChannel::new();
        let closes = channel.closes.clone();
        bridge.start(channel).await.unwrap();

        assert_eq!(bridge.cleanup().await, ExitReason::Cleanup);
        assert_eq!(bridge.cleanup().await, ExitReason::Cleanup);
        assert_eq!(*closes.lock().unwrap(), 1);
        assert!(!bridge.is_ready());
    }
}

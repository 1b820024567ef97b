//! Test doubles shared by the unit tests.

use crate::channel::{ChannelEvent, ChildChannel};
use crate::command::ChildCommand;
use crate::config::RunnerConfig;
use crate::engine::{ContainerEngine, EngineOutput};
use crate::error::{ChannelError, EngineError};
use crate::message::Message;
use crate::process_manager_trait::ChildProcessManager;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::process::Child;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Answers engine invocations from per-command queues and records every call.
///
/// Keys are the space-joined arguments. The last queued answer of a key is
/// repeated once the queue runs dry; unknown commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedEngine {
    responses: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, command: &str, stdout: &str) -> Self {
        self.push(command, Ok(stdout.to_string()))
    }

    pub fn fail(self, command: &str, stderr: &str) -> Self {
        self.push(command, Err(stderr.to_string()))
    }

    fn push(self, command: &str, response: Result<String, String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|call| *call == command).count()
    }
}

#[async_trait]
impl ContainerEngine for ScriptedEngine {
    fn program(&self) -> &str {
        "podman"
    }

    async fn exec(&self, args: &[&str]) -> Result<EngineOutput, EngineError> {
        let key = args.join(" ");
        self.calls.lock().unwrap().push(key.clone());

        let response = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match response.unwrap_or_else(|| Ok(String::new())) {
            Ok(stdout) => Ok(EngineOutput {
                stdout,
                stderr: String::new(),
            }),
            Err(stderr) => Err(EngineError::Failed {
                program: "podman".to_string(),
                args: key,
                status: "exit status: 125".to_string(),
                stderr,
            }),
        }
    }
}

/// Spawns directly and relies on `kill_on_drop` for termination
#[derive(Default)]
pub struct PlainProcessManager {
    pub cleanups: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl ChildProcessManager for PlainProcessManager {
    fn new(_runner_config: &RunnerConfig) -> Self {
        Self::default()
    }

    async fn spawn_child(&self, command: &ChildCommand) -> std::io::Result<Child> {
        command.to_tokio_command().spawn()
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.cleanups
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory channel: records sent messages and lets the test inject events
pub struct RecordingChannel {
    pub sent: Arc<Mutex<Vec<Message>>>,
    pub closes: Arc<Mutex<usize>>,
    events: Option<UnboundedSender<ChannelEvent>>,
    receiver: Option<UnboundedReceiver<ChannelEvent>>,
    fail_start: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            sent: Arc::default(),
            closes: Arc::default(),
            events: Some(tx),
            receiver: Some(rx),
            fail_start: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Sender used to play the child's side of the channel
    pub fn events(&self) -> UnboundedSender<ChannelEvent> {
        self.events.clone().unwrap()
    }

    pub fn sent_values(sent: &Arc<Mutex<Vec<Message>>>) -> Vec<serde_json::Value> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|message| message.as_value().clone())
            .collect()
    }
}

#[async_trait]
impl ChildChannel for RecordingChannel {
    async fn start(&mut self) -> Result<UnboundedReceiver<ChannelEvent>, ChannelError> {
        if self.fail_start {
            return Err(ChannelError::Spawn {
                command: "missing-server".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        self.receiver.take().ok_or(ChannelError::Closed)
    }

    async fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        *self.closes.lock().unwrap() += 1;
        self.events = None;
        Ok(())
    }
}

use thiserror::Error;

/// Core error types for runner operations
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("VM bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Container engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RunnerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        RunnerError::Configuration(message.into())
    }

    pub fn bootstrap(message: impl Into<String>) -> Self {
        RunnerError::Bootstrap(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, RunnerError::Engine(_) | RunnerError::Io(_))
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RunnerError::Configuration(_) | RunnerError::Bootstrap(_)
        )
    }
}

/// Failures of a container engine CLI invocation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program} {args}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        args: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from `{program} {args}`: {reason}")]
    InvalidOutput {
        program: String,
        args: String,
        reason: String,
    },
}

/// Errors raised by the child process channel
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on child channel: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid message from child: {0}")]
    InvalidMessage(String),

    #[error("child channel is closed")]
    Closed,
}

impl ChannelError {
    pub fn classify(&self) -> ChannelFailureKind {
        ChannelFailureKind::classify(&self.to_string())
    }
}

/// Diagnostic category of a channel failure, derived from the error text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFailureKind {
    SpawnFailure,
    PermissionDenied,
    Other,
}

impl ChannelFailureKind {
    /// `spawn` wins over `permission` when both appear.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("spawn") {
            ChannelFailureKind::SpawnFailure
        } else if text.contains("permission") {
            ChannelFailureKind::PermissionDenied
        } else {
            ChannelFailureKind::Other
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ChannelFailureKind::SpawnFailure => Some(
                "Failed to spawn child process - check if the command exists and is executable",
            ),
            ChannelFailureKind::PermissionDenied => {
                Some("Permission error when running child process")
            }
            ChannelFailureKind::Other => None,
        }
    }
}

/// Errors returned by the transport bridge's `send`
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Transport not ready")]
    NotReady,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

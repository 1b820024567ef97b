//! JSON-RPC messages as relayed between the parent and the child.
//!
//! The runner never interprets requests or results; it only needs to tell
//! the message kinds apart and to look into error envelopes for logging.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error code for an unknown method
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notification,
    Response,
    Error,
}

/// The `error` member of a JSON-RPC error response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    pub fn is_method_not_found(&self) -> bool {
        self.code == Some(METHOD_NOT_FOUND)
    }
}

/// A single JSON-RPC message, kept as the JSON object it was received as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Value);

impl Message {
    /// Parse one line of input. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(line.trim())?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        if value.is_object() {
            Ok(Message(value))
        } else {
            Err(MessageError::NotAnObject)
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn kind(&self) -> MessageKind {
        match (self.method(), self.id()) {
            (Some(_), Some(_)) => MessageKind::Request,
            (Some(_), None) => MessageKind::Notification,
            (None, _) if self.0.get("error").is_some() => MessageKind::Error,
            (None, _) => MessageKind::Response,
        }
    }

    pub fn error_envelope(&self) -> Option<ErrorEnvelope> {
        let error = self.0.get("error")?;
        serde_json::from_value(error.clone()).ok()
    }

    /// Serialize to a single newline-terminated line.
    pub fn to_line(&self) -> String {
        let mut line = self.0.to_string();
        line.push('\n');
        line
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

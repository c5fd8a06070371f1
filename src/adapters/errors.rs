use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised by a remote operation adapter
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AdapterError {
    /// The network has not caught up yet (pool not spawned, transfer unsettled)
    #[error("Not ready: {0}")]
    NotReady(String),
    /// The message-passing client could not reach the network
    #[error("Transport error: {0}")]
    Transport(String),
    /// The network processed the request and refused it
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl AdapterError {
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::NotReady(_) => "not_ready",
            AdapterError::Transport(_) => "transport",
            AdapterError::Rejected(_) => "rejected",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AdapterError::NotReady(msg)
            | AdapterError::Transport(msg)
            | AdapterError::Rejected(msg) => msg,
        }
    }
}

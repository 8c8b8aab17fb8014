//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::providers::ProviderStatus;
use crate::state::State;

/// Requests from clients to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Wake the assistant as if the wake phrase had been spoken
    Wake,
}

/// Responses from the daemon to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Wake trigger accepted; handled on the next idle iteration
    WakeQueued,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current state machine state
    pub state: State,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Commands dispatched since startup
    pub commands_handled: u64,

    /// Providers with recorded failures
    pub providers: Vec<ProviderStatus>,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: State::default(),
            uptime_secs: 0,
            commands_handled: 0,
            providers: Vec::new(),
        }
    }
}

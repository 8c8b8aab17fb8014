//! Events module for assistant activity
//!
//! Structured events broadcast by the state machine on every transition,
//! wake detection, command and response. Consumed by the IPC server and logs.

use serde::{Deserialize, Serialize};

use crate::providers::ProviderStatus;
use crate::state::State;

/// Events emitted by the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Machine state changed
    StateChanged { from: State, to: State },

    /// A wake phrase was heard, or an external trigger arrived
    WakeDetected {
        /// `None` for external triggers
        phrase: Option<String>,
    },

    /// A command was transcribed and classified
    CommandRecognized { text: String, intent: String },

    /// No usable command after the retry
    CommandNotUnderstood,

    /// Dispatch finished and the response was spoken
    ResponseDelivered {
        /// Milliseconds spent executing
        duration_ms: u64,
        terminate: bool,
    },

    /// Provider health after a dispatch
    ProvidersUpdated { providers: Vec<ProviderStatus> },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::StateChanged { from, to } => write!(f, "STATE_CHANGED ({from} -> {to})"),
            StateEvent::WakeDetected { phrase: Some(phrase) } => {
                write!(f, "WAKE_DETECTED ({phrase})")
            }
            StateEvent::WakeDetected { phrase: None } => write!(f, "WAKE_DETECTED (external)"),
            StateEvent::CommandRecognized { intent, .. } => {
                write!(f, "COMMAND_RECOGNIZED ({intent})")
            }
            StateEvent::CommandNotUnderstood => write!(f, "COMMAND_NOT_UNDERSTOOD"),
            StateEvent::ResponseDelivered { duration_ms, .. } => {
                write!(f, "RESPONSE_DELIVERED ({}ms)", duration_ms)
            }
            StateEvent::ProvidersUpdated { providers } => {
                let open = providers.iter().filter(|p| p.open).count();
                write!(f, "PROVIDERS_UPDATED ({open} open)")
            }
        }
    }
}

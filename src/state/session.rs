//! Session state owned by the state machine

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::Conversation;
use crate::config::BreakerConfig;
use crate::providers::ProviderHealth;

/// The three possible states of the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Listening in short windows for a wake phrase
    #[default]
    Idle,
    /// Woken; capturing one command
    AwaitingCommand,
    /// Classifying and dispatching a command
    Executing,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::AwaitingCommand => write!(f, "AwaitingCommand"),
            State::Executing => write!(f, "Executing"),
        }
    }
}

/// Everything the machine mutates between commands
///
/// Single writer: only [`super::StateMachine`] holds it. Provider health is
/// lent out as `&mut` for the duration of a transcription or dispatch call.
#[derive(Debug)]
pub struct SessionState {
    pub state: State,
    /// When the current state was entered
    pub last_activity: Instant,
    pub health: ProviderHealth,
    /// Recent research exchanges for follow-up questions
    pub conversation: Conversation,
}

impl SessionState {
    pub fn new(breaker: BreakerConfig, history_len: usize) -> Self {
        Self {
            state: State::Idle,
            last_activity: Instant::now(),
            health: ProviderHealth::new(breaker),
            conversation: Conversation::new(history_len),
        }
    }
}

//! State machine module for the wake/listen loop
//!
//! Provides an explicit state machine with three states:
//! - Idle: listening in short windows for a wake phrase
//! - AwaitingCommand: woken, capturing one command (one retry)
//! - Executing: dispatching the command; no wake phrases accepted

mod conversation;
mod machine;
mod session;

pub use conversation::{Conversation, Message, Role};
pub use machine::StateMachine;
pub use session::State;

//! Audio capture boundary
//!
//! Device capture is outside the daemon; it only sees an [`AudioSource`]
//! that yields one utterance per window. The console source stands in for a
//! microphone by treating each input line as an utterance.

mod console;
mod listener;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CaptureError;

pub use console::{ConsoleSource, ConsoleTranscriber};
pub use listener::{ListenError, Listener};

/// A captured audio segment awaiting transcription
#[derive(Debug)]
pub struct Utterance {
    /// Monotonically increasing per session
    pub sequence: u64,
    pub audio: Vec<u8>,
}

/// Produces audio windows for the state machine
#[async_trait]
pub trait AudioSource: Send {
    /// Capture at most `max` worth of audio
    ///
    /// An empty buffer means the window passed in silence.
    async fn capture(&mut self, max: Duration) -> Result<Vec<u8>, CaptureError>;
}

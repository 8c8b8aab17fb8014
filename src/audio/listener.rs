//! Capture one utterance and transcribe it

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CaptureError, TranscriptionError};
use crate::providers::{ProviderHealth, TranscriptionAdapter, TranscriptionResult};

use super::{AudioSource, Utterance};

/// Extra time a source may take past its window before it is abandoned
const CAPTURE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenError {
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    /// Audio input ended for good
    #[error("audio input closed")]
    Closed,

    #[error("audio device error: {0}")]
    Device(String),
}

/// Pairs the audio source with the transcription adapter
///
/// Owned by the state machine; utterances never outlive a single
/// `listen` call.
pub struct Listener {
    source: Box<dyn AudioSource>,
    adapter: TranscriptionAdapter,
    next_sequence: u64,
}

impl Listener {
    pub fn new(source: Box<dyn AudioSource>, adapter: TranscriptionAdapter) -> Self {
        Self {
            source,
            adapter,
            next_sequence: 0,
        }
    }

    /// Capture a window of at most `window` and transcribe it
    pub async fn listen(
        &mut self,
        window: Duration,
        health: &mut ProviderHealth,
    ) -> Result<TranscriptionResult, ListenError> {
        let audio = match tokio::time::timeout(window + CAPTURE_GRACE, self.source.capture(window))
            .await
        {
            Ok(Ok(audio)) => audio,
            Ok(Err(CaptureError::Closed)) => return Err(ListenError::Closed),
            Ok(Err(CaptureError::Device(e))) => {
                warn!(error = %e, "audio capture failed");
                return Err(ListenError::Device(e));
            }
            Err(_) => {
                warn!(window_ms = window.as_millis() as u64, "audio capture overran its window");
                return Err(TranscriptionError::NoSpeech.into());
            }
        };

        if audio.is_empty() {
            return Err(TranscriptionError::NoSpeech.into());
        }

        let utterance = Utterance {
            sequence: self.next_sequence,
            audio,
        };
        self.next_sequence += 1;
        debug!(
            sequence = utterance.sequence,
            bytes = utterance.audio.len(),
            "utterance captured"
        );

        Ok(self.adapter.transcribe(utterance, health).await?)
    }
}

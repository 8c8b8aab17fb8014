//! Line-oriented stand-in for a microphone
//!
//! Each line read from stdin (or a configured file/pipe) is one utterance;
//! its UTF-8 bytes pass through `ConsoleTranscriber` unchanged.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, TranscriptionError};
use crate::providers::{ProviderId, Transcriber, Transcript};

use super::AudioSource;

/// Reads utterances line by line on a background task
pub struct ConsoleSource {
    lines_rx: mpsc::Receiver<String>,
}

impl ConsoleSource {
    /// Open the configured input, or stdin when none is set
    pub async fn open(input: Option<&Path>) -> Result<Self, CaptureError> {
        match input {
            Some(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    CaptureError::Device(format!("cannot open {}: {e}", path.display()))
                })?;
                info!(?path, "reading utterances from file");
                Ok(Self::from_reader(file))
            }
            None => {
                info!("reading utterances from stdin");
                Ok(Self::from_reader(tokio::io::stdin()))
            }
        }
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (lines_tx, lines_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if lines_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("console input reached end of stream");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "console input error");
                        break;
                    }
                }
            }
        });

        Self { lines_rx }
    }
}

#[async_trait]
impl AudioSource for ConsoleSource {
    async fn capture(&mut self, max: Duration) -> Result<Vec<u8>, CaptureError> {
        match tokio::time::timeout(max, self.lines_rx.recv()).await {
            Ok(Some(line)) => Ok(line.into_bytes()),
            Ok(None) => Err(CaptureError::Closed),
            Err(_) => Ok(Vec::new()),
        }
    }
}

/// Decodes console "audio" as UTF-8 text
pub struct ConsoleTranscriber;

#[async_trait]
impl Transcriber for ConsoleTranscriber {
    fn id(&self) -> ProviderId {
        ProviderId::Console
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        _timeout: Duration,
    ) -> Result<Transcript, TranscriptionError> {
        let text = std::str::from_utf8(audio).map_err(|_| TranscriptionError::Unintelligible)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::NoSpeech);
        }
        Ok(Transcript {
            text: text.to_string(),
            confidence: Some(1.0),
        })
    }
}

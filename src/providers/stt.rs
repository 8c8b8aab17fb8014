//! Whisper-compatible speech-to-text over HTTP
//!
//! Any `audio/transcriptions` endpoint works: Groq or OpenAI for `cloud_stt`,
//! a whisper.cpp or faster-whisper server on this machine for `local_stt`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::WhisperConfig;
use crate::error::TranscriptionError;

use super::{ProviderId, Transcriber, Transcript};

#[derive(Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
}

fn map_request_error(err: reqwest::Error) -> TranscriptionError {
    if err.is_timeout() {
        debug!("transcription request timed out");
    } else {
        warn!(error = %err, "transcription request failed");
    }
    TranscriptionError::ProviderUnavailable
}

fn check_status(status: StatusCode) -> Result<(), TranscriptionError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
        warn!(%status, "transcription provider rate limited");
        Err(TranscriptionError::ProviderUnavailable)
    } else if !status.is_success() {
        warn!(%status, "transcription provider error");
        Err(TranscriptionError::ProviderUnavailable)
    } else {
        Ok(())
    }
}

fn transcript(response: WhisperResponse) -> Result<Transcript, TranscriptionError> {
    let text = response.text.trim();
    if text.is_empty() {
        Err(TranscriptionError::NoSpeech)
    } else {
        Ok(Transcript::new(text))
    }
}

pub struct WhisperTranscriber {
    id: ProviderId,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl WhisperTranscriber {
    fn with_id(id: ProviderId, config: &WhisperConfig) -> Self {
        Self {
            id,
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/audio/transcriptions",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
        }
    }

    /// Hosted API; `None` when no API key is configured
    pub fn cloud(config: &WhisperConfig) -> Option<Self> {
        let transcriber = Self::with_id(ProviderId::CloudStt, config);
        transcriber.api_key.is_some().then_some(transcriber)
    }

    /// Server on this machine; a key is sent only if configured
    pub fn local(config: &WhisperConfig) -> Self {
        Self::with_id(ProviderId::LocalStt, config)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        timeout: Duration,
    ) -> Result<Transcript, TranscriptionError> {
        debug!(provider = %self.id, audio_bytes = audio.len(), "starting transcription");

        let file = Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(map_request_error)?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let mut request = self.client.post(&self.endpoint).timeout(timeout);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .multipart(form)
            .send()
            .await
            .map_err(map_request_error)?;
        check_status(response.status())?;

        let parsed: WhisperResponse = response.json().await.map_err(map_request_error)?;
        transcript(parsed)
    }
}

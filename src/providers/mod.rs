//! Speech-to-text and answer providers
//!
//! Providers are external services consulted as black boxes. Each one is
//! identified by a [`ProviderId`] so the circuit breaker in [`health`] can
//! track consecutive failures across calls.

mod chain;
mod health;
mod llm;
mod search;
mod stt;
mod transcription;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, TranscriptionError};

pub use chain::{AnswerChain, AnswerRequest, AnswerResponse, AnswerSource, APOLOGY};
pub use health::{ProviderHealth, ProviderStatus};
pub use llm::{OllamaLlm, RemoteLlm};
pub use search::DuckDuckGoSearch;
pub use stt::WhisperTranscriber;
pub use transcription::{TranscriptionAdapter, TranscriptionResult};

/// Identifies a speech-to-text or answer provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Hosted OpenAI-compatible chat completion API
    RemoteLlm,
    /// Ollama running on this machine
    LocalLlm,
    /// Keyword search summary, no API key
    KeywordSearch,
    /// Hosted Whisper-compatible speech-to-text API
    CloudStt,
    /// Whisper-compatible server on this machine
    LocalStt,
    /// Typed console input standing in for audio
    Console,
    /// Fixed apology text when every provider failed
    Canned,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderId::RemoteLlm => "remote_llm",
            ProviderId::LocalLlm => "local_llm",
            ProviderId::KeywordSearch => "keyword_search",
            ProviderId::CloudStt => "cloud_stt",
            ProviderId::LocalStt => "local_stt",
            ProviderId::Console => "console",
            ProviderId::Canned => "canned",
        };
        f.write_str(name)
    }
}

/// Raw output of a single speech-to-text backend
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub confidence: Option<f32>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// A speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn transcribe(
        &self,
        audio: &[u8],
        timeout: Duration,
    ) -> Result<Transcript, TranscriptionError>;
}

/// A remote or local language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

/// One keyword search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
}

/// Synchronous keyword search, usable without credentials
pub trait KeywordSearch: Send + Sync {
    fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit>;
}

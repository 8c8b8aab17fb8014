//! HTTP language model clients
//!
//! `RemoteLlm` speaks the OpenAI-compatible chat completion protocol (Groq by
//! default); `OllamaLlm` talks to a local Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LocalLlmConfig, RemoteLlmConfig};
use crate::error::ProviderError;

use super::LanguageModel;

const SYSTEM_PROMPT: &str =
    "You are ZEE, a helpful voice assistant that provides clear, concise answers.";

const MAX_TOKENS: u32 = 500;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn messages(prompt: &str) -> [ChatMessage<'_>; 2] {
    [
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        },
        ChatMessage {
            role: "user",
            content: prompt,
        },
    ]
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ReplyMessage,
}

fn map_request_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unreachable(err.to_string())
    }
}

fn check_status(status: StatusCode) -> Result<(), ProviderError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED {
        Err(ProviderError::RateLimited)
    } else if !status.is_success() {
        Err(ProviderError::Unreachable(format!("HTTP {status}")))
    } else {
        Ok(())
    }
}

fn non_empty(content: Option<String>) -> Result<String, ProviderError> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or(ProviderError::EmptyResponse)
}

/// Hosted chat completion API
pub struct RemoteLlm {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl RemoteLlm {
    /// Returns `None` when no API key is configured
    pub fn new(config: &RemoteLlmConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty())?;
        Some(Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for RemoteLlm {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        debug!(model = %self.model, "remote completion request");

        let body = CompletionRequest {
            model: &self.model,
            messages: messages(prompt),
            max_tokens: MAX_TOKENS,
            temperature: 0.7,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;
        check_status(response.status())?;

        let parsed: CompletionResponse = response.json().await.map_err(map_request_error)?;
        non_empty(
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content),
        )
    }
}

/// Local Ollama server
pub struct OllamaLlm {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaLlm {
    pub fn new(config: &LocalLlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaLlm {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        debug!(model = %self.model, "local completion request");

        let body = OllamaRequest {
            model: &self.model,
            messages: messages(prompt),
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;
        check_status(response.status())?;

        let parsed: OllamaResponse = response.json().await.map_err(map_request_error)?;
        non_empty(parsed.message.content)
    }
}

//! Configuration loading and management
//!
//! Layering: built-in defaults, then an optional JSON file, then
//! environment overrides for secrets and endpoints.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::providers::ProviderId;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    pub audio: AudioConfig,
    pub wake: WakeConfig,
    pub transcription: TranscriptionConfig,
    pub answer: AnswerConfig,
    pub breaker: BreakerConfig,
    pub dictation: DictationConfig,
}

/// Audio input selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Utterance stream to read instead of stdin (a file or named pipe)
    pub input: Option<PathBuf>,
}

/// Wake phrase detection and command capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Equivalent wake phrases, matched case-insensitively on word boundaries.
    /// Joined ("heyzee") and possessive ("zee's") forms also match.
    pub phrases: Vec<String>,
    /// Common mis-hearings of the phrases that count as a wake
    pub variants: Vec<String>,
    /// Spoken when the wake phrase is heard on its own
    pub acknowledgement: String,
    /// Length of each audio window sampled while idle
    pub idle_window_ms: u64,
    /// Deadline for the whole command capture after wake, retry included
    pub command_timeout_ms: u64,
    /// Minimum remainder length for a command spoken with the wake phrase
    pub immediate_command_min_chars: usize,
}

/// Speech-to-text provider order and timeout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub providers: Vec<ProviderId>,
    pub timeout_ms: u64,
    /// Endpoint for `cloud_stt`
    pub cloud: WhisperConfig,
    /// Endpoint for `local_stt`
    pub local: WhisperConfig,
}

/// Whisper-compatible `audio/transcriptions` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

/// Research answer providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Priority order; the first entry is the primary provider
    pub providers: Vec<ProviderId>,
    /// Aggregate budget for one research answer
    pub deadline_ms: u64,
    /// Share of the remaining budget granted to a non-final attempt
    pub attempt_share: f64,
    /// Run keyword search first and give its top hits to the models
    pub search_context: bool,
    /// Exchanges kept in memory for follow-up questions
    pub history_len: usize,
    /// Most recent messages included in a prompt
    pub prompt_history: usize,
    pub remote: RemoteLlmConfig,
    pub local: LocalLlmConfig,
    pub search: SearchConfig,
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLlmConfig {
    pub base_url: String,
    pub model: String,
    /// Taken from `GROQ_API_KEY`; never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

/// Ollama endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
}

/// Keyword search fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub timeout_ms: u64,
}

/// Per-provider circuit breaker
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

/// Dictation session bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    pub stop_phrases: Vec<String>,
    pub window_ms: u64,
    pub max_duration_ms: u64,
    pub max_silent_windows: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            audio: AudioConfig::default(),
            wake: WakeConfig::default(),
            transcription: TranscriptionConfig::default(),
            answer: AnswerConfig::default(),
            breaker: BreakerConfig::default(),
            dictation: DictationConfig::default(),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: ["hey zee", "ok zee", "zee", "hey z"]
                .into_iter()
                .map(String::from)
                .collect(),
            variants: ["hazy", "hey easy", "the z"]
                .into_iter()
                .map(String::from)
                .collect(),
            acknowledgement: "Yes, I'm listening.".to_string(),
            idle_window_ms: 5_000,
            command_timeout_ms: 15_000,
            immediate_command_min_chars: 4,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderId::Console],
            timeout_ms: 10_000,
            cloud: WhisperConfig {
                base_url: "https://api.groq.com/openai/v1".to_string(),
                model: "whisper-large-v3".to_string(),
                api_key: None,
            },
            local: WhisperConfig::default(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "whisper-1".to_string(),
            api_key: None,
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderId::RemoteLlm,
                ProviderId::LocalLlm,
                ProviderId::KeywordSearch,
            ],
            deadline_ms: 20_000,
            attempt_share: 0.6,
            search_context: true,
            history_len: 10,
            prompt_history: 5,
            remote: RemoteLlmConfig::default(),
            local: LocalLlmConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for RemoteLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key: None,
            timeout_ms: 8_000,
        }
    }
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_ms: 15_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout_ms: 5_000,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 60_000,
        }
    }
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            stop_phrases: ["stop dictation", "stop typing", "end dictation", "that's all"]
                .into_iter()
                .map(String::from)
                .collect(),
            window_ms: 10_000,
            max_duration_ms: 60_000,
            max_silent_windows: 3,
        }
    }
}

impl WakeConfig {
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl TranscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AnswerConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl RemoteLlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LocalLlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl DictationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

/// `~/.local/share/zee`, or a temp directory when HOME is unset
fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".local")
        .join("share")
        .join("zee")
}

impl Config {
    /// Load configuration from defaults, the config file and environment
    ///
    /// An explicit `path` must exist. Without one, `$ZEE_CONFIG` and then
    /// `<data_dir>/config.json` are consulted if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os("ZEE_CONFIG")
                .map(PathBuf::from)
                .or_else(|| {
                    let candidate = default_data_dir().join("config.json");
                    candidate.exists().then_some(candidate)
                }),
        };

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "parsing config file");
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GROQ_API_KEY") {
            self.transcription.cloud.api_key = Some(key.clone());
            self.answer.remote.api_key = Some(key);
        }
        if let Some(url) = non_empty("ZEE_WHISPER_URL") {
            self.transcription.local.base_url = url;
        }
        if let Some(model) = non_empty("ZEE_REMOTE_MODEL") {
            self.answer.remote.model = model;
        }
        if let Some(url) = non_empty("OLLAMA_BASE_URL") {
            self.answer.local.base_url = url;
        }
        if let Some(model) = non_empty("ZEE_LOCAL_MODEL") {
            self.answer.local.model = model;
        }
        if let Some(socket) = non_empty("ZEE_SOCKET") {
            self.socket_path = PathBuf::from(socket);
        }
    }

    /// Reject configurations the state machine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return invalid("wake.phrases must contain at least one phrase");
        }
        if self.transcription.providers.is_empty() {
            return invalid("transcription.providers is empty");
        }
        if self.answer.providers.is_empty() {
            return invalid("answer.providers is empty");
        }
        if !(self.answer.attempt_share > 0.0 && self.answer.attempt_share <= 1.0) {
            return invalid("answer.attempt_share must be in (0, 1]");
        }
        if self.answer.prompt_history > self.answer.history_len {
            return invalid("answer.prompt_history exceeds answer.history_len");
        }
        if self.breaker.failure_threshold == 0 {
            return invalid("breaker.failure_threshold must be at least 1");
        }
        if self.wake.idle_window_ms == 0 || self.wake.command_timeout_ms == 0 {
            return invalid("wake timeouts must be non-zero");
        }
        if self.answer.deadline_ms == 0 {
            return invalid("answer.deadline_ms must be non-zero");
        }
        if self.dictation.window_ms == 0 || self.dictation.max_duration_ms == 0 {
            return invalid("dictation timeouts must be non-zero");
        }
        Ok(())
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

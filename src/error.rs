//! Error taxonomy shared by the assistant components
//!
//! Component boundaries return these typed errors; the binary edge
//! (`main`, config loading, IPC) wraps them in `anyhow` with context.

use std::path::PathBuf;

/// Speech-to-text failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptionError {
    #[error("no speech detected")]
    NoSpeech,

    #[error("speech could not be understood")]
    Unintelligible,

    #[error("no transcription provider available")]
    ProviderUnavailable,
}

/// Language-model and search provider failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out")]
    Timeout,

    #[error("provider rate limit or quota exhausted")]
    RateLimited,

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

/// System-settings collaborator failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("not supported on this system")]
    Unsupported,

    #[error("value out of range")]
    OutOfRange,

    #[error("control command failed: {0}")]
    Failed(String),
}

/// Application-launch collaborator failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("application not found: {0}")]
    NotFound(String),

    #[error("permission denied launching {0}")]
    PermissionDenied(String),
}

/// Typing-automation collaborator failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypingError {
    #[error("typing automation unavailable")]
    Unavailable,

    #[error("typing failed: {0}")]
    Failed(String),
}

/// Audio capture failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The input stream ended; no further audio will arrive
    #[error("audio input closed")]
    Closed,

    #[error("audio device error: {0}")]
    Device(String),
}

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

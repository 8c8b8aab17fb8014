//! Text typing for dictation

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TypingError;

use super::{Platform, Typist};

const TYPING_TIMEOUT: Duration = Duration::from_secs(10);

fn applescript_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Types into the focused window with xdotool (Linux) or System Events (macOS)
pub struct CommandTypist {
    program: PathBuf,
    platform: Platform,
}

impl CommandTypist {
    /// `None` when the platform's typing tool is not installed
    pub fn detect(platform: Platform) -> Option<Self> {
        let program = match platform {
            Platform::Linux => "xdotool",
            Platform::MacOs => "osascript",
            Platform::Other => return None,
        };
        let program = which::which(program).ok()?;
        debug!(program = %program.display(), "typing tool found");
        Some(Self { program, platform })
    }

    fn args(&self, text: &str) -> Vec<String> {
        match self.platform {
            Platform::MacOs => vec![
                "-e".to_string(),
                format!(
                    "tell application \"System Events\" to keystroke \"{}\"",
                    applescript_string(text)
                ),
            ],
            _ => vec![
                "type".to_string(),
                "--delay".to_string(),
                "12".to_string(),
                "--".to_string(),
                text.to_string(),
            ],
        }
    }
}

#[async_trait]
impl Typist for CommandTypist {
    async fn type_text(&self, text: &str) -> Result<(), TypingError> {
        let output = tokio::time::timeout(
            TYPING_TIMEOUT,
            tokio::process::Command::new(&self.program)
                .args(self.args(text))
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| TypingError::Failed("typing timed out".to_string()))?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TypingError::Unavailable,
            _ => TypingError::Failed(e.to_string()),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(%stderr, "typing command failed");
            Err(TypingError::Failed(stderr))
        }
    }
}

/// Writes dictated text to stdout
pub struct ConsoleTypist;

#[async_trait]
impl Typist for ConsoleTypist {
    async fn type_text(&self, text: &str) -> Result<(), TypingError> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{text}")
            .and_then(|_| stdout.flush())
            .map_err(|e| TypingError::Failed(e.to_string()))
    }
}

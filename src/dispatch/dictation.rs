//! Dictation session: transcribe speech and type it until told to stop

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::{ListenError, Listener};
use crate::config::DictationConfig;
use crate::error::TypingError;
use crate::intent::normalize;
use crate::providers::ProviderHealth;
use crate::system::Typist;

use super::ACTION_TIMEOUT;

/// Why a dictation session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictationEnd {
    StopPhrase,
    MaxDuration,
    /// Too many consecutive windows without usable speech
    Silence,
    TypingFailed(TypingError),
    InputClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictationReport {
    /// Segments successfully typed
    pub segments: usize,
    pub end: DictationEnd,
}

pub struct DictationSession<'a> {
    config: &'a DictationConfig,
    typist: &'a dyn Typist,
    /// Normalised stop phrases, split into words
    stop_phrases: Vec<Vec<String>>,
}

impl<'a> DictationSession<'a> {
    pub fn new(config: &'a DictationConfig, typist: &'a dyn Typist) -> Self {
        let stop_phrases = config
            .stop_phrases
            .iter()
            .map(|p| normalize(p).split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|words| !words.is_empty())
            .collect();
        Self {
            config,
            typist,
            stop_phrases,
        }
    }

    pub async fn run(&self, listener: &mut Listener, health: &mut ProviderHealth) -> DictationReport {
        let deadline = Instant::now() + self.config.max_duration();
        let mut segments = 0;
        let mut missed = 0;

        info!(
            max_duration_ms = self.config.max_duration_ms,
            "dictation started"
        );

        let end = tokio::time::timeout_at(deadline, async {
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return DictationEnd::MaxDuration;
                }

                let heard = match listener.listen(self.config.window().min(remaining), health).await {
                    Ok(result) => result.text,
                    Err(ListenError::Closed) => return DictationEnd::InputClosed,
                    Err(e) => {
                        missed += 1;
                        debug!(error = %e, missed, "no dictation in window");
                        if missed >= self.config.max_silent_windows {
                            return DictationEnd::Silence;
                        }
                        continue;
                    }
                };
                missed = 0;

                let (content, stop) = self.split_at_stop_phrase(&heard);
                if !content.is_empty() {
                    let typed = tokio::time::timeout(
                        ACTION_TIMEOUT,
                        self.typist.type_text(&format!("{content} ")),
                    )
                    .await
                    .unwrap_or_else(|_| Err(TypingError::Failed("typing timed out".to_string())));
                    if let Err(e) = typed {
                        warn!(error = %e, "dictation typing failed");
                        return DictationEnd::TypingFailed(e);
                    }
                    segments += 1;
                }
                if stop {
                    return DictationEnd::StopPhrase;
                }
            }
        })
        .await
        .unwrap_or(DictationEnd::MaxDuration);

        info!(segments, end = ?end, "dictation finished");
        DictationReport { segments, end }
    }

    /// Text preceding the first stop phrase, and whether one was found
    fn split_at_stop_phrase(&self, text: &str) -> (String, bool) {
        let words: Vec<&str> = text.split_whitespace().collect();
        let normalized: Vec<String> = words.iter().map(|w| normalize(w)).collect();

        for start in 0..normalized.len() {
            if self
                .stop_phrases
                .iter()
                .any(|phrase| normalized[start..].starts_with(phrase))
            {
                return (words[..start].join(" "), true);
            }
        }
        (words.join(" "), false)
    }
}

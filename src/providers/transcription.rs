//! Speech-to-text fallback across configured backends

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audio::Utterance;
use crate::error::TranscriptionError;

use super::{ProviderHealth, ProviderId, Transcriber};

/// Text recognised from one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub confidence: Option<f32>,
    pub source: ProviderId,
}

/// Tries transcription backends in order until one recognises the utterance
///
/// `NoSpeech` ends the attempt immediately since no other backend will hear
/// anything either. `Unintelligible` moves on to the next backend without
/// counting against the provider; unavailability and timeouts do.
pub struct TranscriptionAdapter {
    providers: Vec<Arc<dyn Transcriber>>,
    timeout: Duration,
}

impl TranscriptionAdapter {
    pub fn new(providers: Vec<Arc<dyn Transcriber>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Transcribe and discard the utterance
    pub async fn transcribe(
        &self,
        utterance: Utterance,
        health: &mut ProviderHealth,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let mut unintelligible = false;

        for provider in &self.providers {
            let id = provider.id();
            if !health.is_available(id, Instant::now()) {
                debug!(%id, "skipping circuit-broken transcriber");
                continue;
            }

            let attempt =
                tokio::time::timeout(self.timeout, provider.transcribe(&utterance.audio, self.timeout))
                    .await
                    .unwrap_or(Err(TranscriptionError::ProviderUnavailable));

            match attempt {
                Ok(transcript) => {
                    health.record_success(id);
                    let text = transcript.text.trim();
                    if text.is_empty() {
                        return Err(TranscriptionError::NoSpeech);
                    }
                    debug!(
                        sequence = utterance.sequence,
                        %id,
                        text,
                        "utterance transcribed"
                    );
                    return Ok(TranscriptionResult {
                        text: text.to_string(),
                        confidence: transcript.confidence,
                        source: id,
                    });
                }
                Err(TranscriptionError::NoSpeech) => {
                    health.record_success(id);
                    return Err(TranscriptionError::NoSpeech);
                }
                Err(TranscriptionError::Unintelligible) => {
                    health.record_success(id);
                    unintelligible = true;
                }
                Err(TranscriptionError::ProviderUnavailable) => {
                    warn!(%id, sequence = utterance.sequence, "transcriber unavailable");
                    health.record_failure(id, Instant::now());
                }
            }
        }

        Err(if unintelligible {
            TranscriptionError::Unintelligible
        } else {
            TranscriptionError::ProviderUnavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::testing::ScriptedTranscriber;

    fn utterance() -> Utterance {
        Utterance {
            sequence: 7,
            audio: b"hello".to_vec(),
        }
    }

    fn health() -> ProviderHealth {
        ProviderHealth::new(BreakerConfig {
            failure_threshold: 2,
            cooldown_ms: 10_000,
        })
    }

    #[tokio::test]
    async fn test_falls_back_when_cloud_unavailable() {
        let cloud = ScriptedTranscriber::new(
            ProviderId::CloudStt,
            vec![Err(TranscriptionError::ProviderUnavailable)],
        );
        let local = ScriptedTranscriber::new(ProviderId::LocalStt, vec![Ok("open firefox")]);
        let adapter =
            TranscriptionAdapter::new(vec![cloud.clone(), local.clone()], Duration::from_secs(1));
        let mut h = health();

        let result = adapter.transcribe(utterance(), &mut h).await.unwrap();
        assert_eq!(result.text, "open firefox");
        assert_eq!(result.source, ProviderId::LocalStt);
        assert_eq!(h.consecutive_failures(ProviderId::CloudStt), 1);
    }

    #[tokio::test]
    async fn test_no_speech_short_circuits() {
        let cloud = ScriptedTranscriber::new(
            ProviderId::CloudStt,
            vec![Err(TranscriptionError::NoSpeech)],
        );
        let local = ScriptedTranscriber::new(ProviderId::LocalStt, vec![Ok("unused")]);
        let adapter =
            TranscriptionAdapter::new(vec![cloud, local.clone()], Duration::from_secs(1));

        let err = adapter.transcribe(utterance(), &mut health()).await.unwrap_err();
        assert_eq!(err, TranscriptionError::NoSpeech);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_unintelligible_everywhere() {
        let cloud = ScriptedTranscriber::new(
            ProviderId::CloudStt,
            vec![Err(TranscriptionError::Unintelligible)],
        );
        let local = ScriptedTranscriber::new(
            ProviderId::LocalStt,
            vec![Err(TranscriptionError::ProviderUnavailable)],
        );
        let adapter = TranscriptionAdapter::new(vec![cloud, local], Duration::from_secs(1));

        let err = adapter.transcribe(utterance(), &mut health()).await.unwrap_err();
        assert_eq!(err, TranscriptionError::Unintelligible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_transcriber_times_out() {
        let slow = ScriptedTranscriber::hanging(ProviderId::CloudStt);
        let adapter = TranscriptionAdapter::new(vec![slow], Duration::from_millis(200));
        let mut h = health();

        let started = Instant::now();
        let err = adapter.transcribe(utterance(), &mut h).await.unwrap_err();
        assert_eq!(err, TranscriptionError::ProviderUnavailable);
        assert!(started.elapsed() <= Duration::from_millis(250));
        assert_eq!(h.consecutive_failures(ProviderId::CloudStt), 1);
    }

    #[tokio::test]
    async fn test_skips_open_circuit() {
        let cloud = ScriptedTranscriber::new(
            ProviderId::CloudStt,
            vec![Err(TranscriptionError::ProviderUnavailable)],
        );
        let local = ScriptedTranscriber::new(ProviderId::LocalStt, vec![Ok("a"), Ok("b"), Ok("c")]);
        let adapter =
            TranscriptionAdapter::new(vec![cloud.clone(), local], Duration::from_secs(1));
        let mut h = health();

        for _ in 0..3 {
            adapter.transcribe(utterance(), &mut h).await.unwrap();
        }
        // Threshold is two; the third call never reaches the cloud backend
        assert_eq!(cloud.calls(), 2);
    }
}

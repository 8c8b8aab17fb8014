//! Scripted collaborators shared by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::AudioSource;
use crate::error::{CaptureError, LaunchError, ProviderError, SystemError, TranscriptionError, TypingError};
use crate::intent::{ControlAction, ControlValue};
use crate::providers::{KeywordSearch, LanguageModel, ProviderId, SearchHit, Transcriber, Transcript};
use crate::system::{AppLauncher, Speaker, SystemSettings, Typist};

/// Pops the next scripted item, repeating the last one once exhausted
fn next_scripted<T: Clone>(script: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

pub struct ScriptedTranscriber {
    id: ProviderId,
    script: Mutex<VecDeque<Result<String, TranscriptionError>>>,
    hang: bool,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(id: ProviderId, script: Vec<Result<&str, TranscriptionError>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(script.into_iter().map(|r| r.map(str::to_string)).collect()),
            hang: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hanging(id: ProviderId) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(VecDeque::new()),
            hang: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn transcribe(
        &self,
        _audio: &[u8],
        _timeout: Duration,
    ) -> Result<Transcript, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        next_scripted(&self.script)
            .unwrap_or(Err(TranscriptionError::ProviderUnavailable))
            .map(Transcript::new)
    }
}

pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    hang: bool,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().map(|r| r.map(str::to_string)).collect()),
            hang: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            hang: true,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        next_scripted(&self.script).unwrap_or(Err(ProviderError::EmptyResponse))
    }
}

pub struct FixedSearch {
    hits: Vec<SearchHit>,
    calls: AtomicUsize,
}

impl FixedSearch {
    pub fn new(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeywordSearch for FixedSearch {
    fn search(&self, _query: &str, max_results: usize) -> Vec<SearchHit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hits.iter().take(max_results).cloned().collect()
    }
}

enum AfterScript {
    Close,
    Hang,
    Repeat(String),
}

/// Audio source yielding scripted lines; `""` is a silent window
pub struct ScriptedSource {
    items: VecDeque<String>,
    after: AfterScript,
    latency: Duration,
    captures: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// Closes once the script runs out
    pub fn new<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            items: items.into_iter().map(str::to_string).collect(),
            after: AfterScript::Close,
            latency: Duration::ZERO,
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Never yields anything
    pub fn hanging() -> Self {
        Self::new([]).then_hang()
    }

    pub fn then_hang(mut self) -> Self {
        self.after = AfterScript::Hang;
        self
    }

    pub fn then_repeat(mut self, item: &str) -> Self {
        self.after = AfterScript::Repeat(item.to_string());
        self
    }

    /// Each spoken item takes this long to capture
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn capture_count(&self) -> Arc<AtomicUsize> {
        self.captures.clone()
    }
}

#[async_trait]
impl AudioSource for ScriptedSource {
    async fn capture(&mut self, max: Duration) -> Result<Vec<u8>, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let item = match self.items.pop_front() {
            Some(item) => item,
            None => match &self.after {
                AfterScript::Close => return Err(CaptureError::Closed),
                AfterScript::Hang => std::future::pending().await,
                AfterScript::Repeat(item) => item.clone(),
            },
        };

        if item.is_empty() {
            tokio::time::sleep(max).await;
            return Ok(Vec::new());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency.min(max)).await;
        }
        Ok(item.into_bytes())
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub launched: Mutex<Vec<String>>,
    pub result: Option<LaunchError>,
}

#[async_trait]
impl AppLauncher for RecordingLauncher {
    async fn launch(&self, app_name: &str) -> Result<(), LaunchError> {
        self.launched.lock().unwrap().push(app_name.to_string());
        match &self.result {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSettings {
    pub applied: Mutex<Vec<(ControlAction, Option<ControlValue>)>>,
    pub result: Option<SystemError>,
}

#[async_trait]
impl SystemSettings for RecordingSettings {
    async fn apply_control(
        &self,
        action: ControlAction,
        value: Option<ControlValue>,
    ) -> Result<(), SystemError> {
        self.applied.lock().unwrap().push((action, value));
        match &self.result {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingTypist {
    pub typed: Mutex<Vec<String>>,
    pub result: Option<TypingError>,
}

#[async_trait]
impl Typist for RecordingTypist {
    async fn type_text(&self, text: &str) -> Result<(), TypingError> {
        if let Some(e) = &self.result {
            return Err(e.clone());
        }
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeaker {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl Speaker for RecordingSpeaker {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

//! zee-daemon: wake-word voice assistant
//!
//! Listens for a wake phrase, transcribes the command that follows,
//! classifies it and dispatches it:
//! - Application launch and system settings (volume, mute, WiFi, brightness)
//! - Research answers from a remote LLM, a local LLM or keyword search,
//!   with per-provider circuit breaking
//! - Dictation and one-shot typing into the focused window
//!
//! A Unix socket serves status queries and external wake triggers.

mod audio;
mod config;
mod dispatch;
mod error;
mod events;
mod intent;
mod ipc;
mod lifecycle;
mod providers;
mod state;
mod system;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::{ConsoleSource, ConsoleTranscriber, Listener};
use crate::config::{AnswerConfig, Config};
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::events::StateEvent;
use crate::intent::IntentClassifier;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::providers::{
    AnswerChain, AnswerSource, DuckDuckGoSearch, OllamaLlm, ProviderHealth, ProviderId, RemoteLlm,
    Transcriber, TranscriptionAdapter, WhisperTranscriber,
};
use crate::state::{Conversation, StateMachine};
use crate::system::{
    CommandTypist, ConsoleSpeaker, ConsoleTypist, Platform, ProcessLauncher, ProcessSpeaker,
    ShellSettings, Speaker, Typist,
};

#[derive(Debug, Parser)]
#[command(name = "zee", version, about = "Wake-word voice assistant daemon")]
struct Cli {
    /// JSON configuration file (defaults to $ZEE_CONFIG, then the data directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run a single typed command and exit
    #[arg(long, value_name = "COMMAND")]
    once: Option<String>,

    /// Where spoken responses go
    #[arg(long, value_enum, env = "ZEE_SPEECH", default_value_t = SpeechOutput::Console)]
    speech: SpeechOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SpeechOutput {
    /// Print responses
    Console,
    /// Speak through the platform text-to-speech program
    System,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "zee-daemon starting");

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    info!(?config.socket_path, "configuration loaded");

    let platform = Platform::current();
    let speaker = build_speaker(cli.speech, platform);
    let dispatcher = Dispatcher::new(
        Arc::new(ProcessLauncher::new(platform)),
        Arc::new(ShellSettings::new(platform)),
        build_typist(platform),
        speaker.clone(),
        build_answer_chain(&config.answer),
        config.answer.deadline(),
        config.dictation.clone(),
    )
    .with_prompt_history(config.answer.prompt_history);

    if let Some(command) = cli.once.as_deref() {
        run_once(&config, &dispatcher, speaker.as_ref(), command).await;
        return Ok(());
    }

    config
        .ensure_dirs()
        .context("failed to create data directory")?;

    let transcribers = build_transcribers(&config);
    anyhow::ensure!(
        !transcribers.is_empty(),
        "no usable transcription provider in {:?}",
        config.transcription.providers
    );

    // Audio input must be available before anything else starts
    let source = ConsoleSource::open(config.audio.input.as_deref())
        .await
        .context("failed to initialise audio capture")?;
    let listener = Listener::new(
        Box::new(source),
        TranscriptionAdapter::new(transcribers, config.transcription.timeout()),
    );

    let mut shutdown = ShutdownSignal::new()?;

    // Create channels for inter-component communication
    // IPC server -> State machine (external wake triggers, one deep)
    let (wake_tx, wake_rx) = mpsc::channel(1);
    // State machine -> IPC server and logs
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);
    let mut ipc_event_rx = event_tx.subscribe();

    let server = Server::new(&config.socket_path, wake_tx)?;
    let mut state_machine = StateMachine::new(&config, listener, dispatcher, speaker, event_tx);

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        reason = state_machine.run(wake_rx) => {
            info!(?reason, "state machine exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status snapshot in step with the machine
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "state event received");
                        server.observe(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("state event handler exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");
    server.shutdown().await;
    info!("zee-daemon stopped");

    Ok(())
}

/// Classify and dispatch one typed command without audio
async fn run_once(config: &Config, dispatcher: &Dispatcher, speaker: &dyn Speaker, command: &str) {
    let classifier = IntentClassifier::from_config(&config.wake);
    let command = classifier
        .detect_wake(command)
        .map(|found| found.remainder)
        .filter(|remainder| !remainder.is_empty())
        .unwrap_or_else(|| command.to_string());

    let intent = classifier.classify(&command);
    info!(%command, %intent, "one-shot command");

    let mut health = ProviderHealth::new(config.breaker);
    let mut conversation = Conversation::new(config.answer.history_len);
    let ctx = DispatchContext {
        listener: None,
        health: &mut health,
        conversation: &mut conversation,
    };
    let outcome = dispatcher.dispatch(intent, ctx).await;
    if let Some(text) = &outcome.spoken_text {
        speaker.speak(text);
    }
}

fn build_speaker(output: SpeechOutput, platform: Platform) -> Arc<dyn Speaker> {
    match output {
        SpeechOutput::Console => Arc::new(ConsoleSpeaker),
        SpeechOutput::System => match ProcessSpeaker::detect(platform) {
            Some(speaker) => Arc::new(speaker),
            None => {
                warn!("no text-to-speech program found, printing responses instead");
                Arc::new(ConsoleSpeaker)
            }
        },
    }
}

fn build_typist(platform: Platform) -> Arc<dyn Typist> {
    match CommandTypist::detect(platform) {
        Some(typist) => Arc::new(typist),
        None => {
            warn!("no typing tool found, dictation will be printed");
            Arc::new(ConsoleTypist)
        }
    }
}

fn build_transcribers(config: &Config) -> Vec<Arc<dyn Transcriber>> {
    config
        .transcription
        .providers
        .iter()
        .filter_map(|id| match id {
            ProviderId::Console => Some(Arc::new(ConsoleTranscriber) as Arc<dyn Transcriber>),
            ProviderId::CloudStt => match WhisperTranscriber::cloud(&config.transcription.cloud) {
                Some(stt) => Some(Arc::new(stt) as Arc<dyn Transcriber>),
                None => {
                    info!("no cloud speech-to-text API key configured, skipping");
                    None
                }
            },
            ProviderId::LocalStt => Some(Arc::new(WhisperTranscriber::local(
                &config.transcription.local,
            )) as Arc<dyn Transcriber>),
            other => {
                warn!(provider = %other, "no speech-to-text backend for provider, skipping");
                None
            }
        })
        .collect()
}

fn build_answer_chain(config: &AnswerConfig) -> AnswerChain {
    let sources: Vec<AnswerSource> = config
        .providers
        .iter()
        .filter_map(|&id| match id {
            ProviderId::RemoteLlm => match RemoteLlm::new(&config.remote) {
                Some(model) => Some(AnswerSource::Llm {
                    id,
                    model: Arc::new(model),
                    timeout: config.remote.timeout(),
                }),
                None => {
                    info!("no remote API key configured, remote model disabled");
                    None
                }
            },
            ProviderId::LocalLlm => Some(AnswerSource::Llm {
                id,
                model: Arc::new(OllamaLlm::new(&config.local)),
                timeout: config.local.timeout(),
            }),
            ProviderId::KeywordSearch => Some(AnswerSource::Search {
                search: Arc::new(DuckDuckGoSearch::new(config.search.timeout())),
                max_results: config.search.max_results,
                timeout: config.search.timeout(),
            }),
            other => {
                warn!(provider = %other, "not an answer provider, skipping");
                None
            }
        })
        .collect();

    info!(providers = ?sources.iter().map(AnswerSource::id).collect::<Vec<_>>(), "answer chain ready");
    AnswerChain::new(sources, config.attempt_share).with_search_context(config.search_context)
}

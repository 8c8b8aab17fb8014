//! Core state machine implementation
//!
//! Handles transitions between Idle, AwaitingCommand and Executing based on
//! what the listener hears and on external wake triggers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::audio::{ListenError, Listener};
use crate::config::{Config, WakeConfig};
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::events::StateEvent;
use crate::intent::{IntentClassifier, WakeMatch};
use crate::system::Speaker;

use super::session::{SessionState, State};

const REPROMPT: &str = "Sorry, could you say that again?";
const NOT_UNDERSTOOD: &str = "Sorry, I didn't catch that.";

/// Pause before listening again after an audio device error
const DEVICE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Why [`StateMachine::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user asked the assistant to exit
    UserExit,
    /// The audio source reached end of stream
    InputClosed,
}

enum Wake {
    Spoken(WakeMatch),
    External,
}

enum CommandFailure {
    NotUnderstood,
    InputClosed,
}

/// The state machine that drives the listen/execute loop
pub struct StateMachine {
    session: SessionState,
    config: WakeConfig,
    classifier: IntentClassifier,
    listener: Listener,
    dispatcher: Dispatcher,
    speaker: Arc<dyn Speaker>,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateMachine {
    pub fn new(
        config: &Config,
        listener: Listener,
        dispatcher: Dispatcher,
        speaker: Arc<dyn Speaker>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            session: SessionState::new(config.breaker, config.answer.history_len),
            config: config.wake.clone(),
            classifier: IntentClassifier::from_config(&config.wake),
            listener,
            dispatcher,
            speaker,
            event_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> State {
        self.session.state
    }

    /// Run until the user exits or the audio input closes
    ///
    /// External wake triggers arrive on `wake_rx` and are only consumed
    /// while idle.
    pub async fn run(&mut self, mut wake_rx: mpsc::Receiver<()>) -> ExitReason {
        info!("state machine started in Idle state");
        let mut triggers_open = true;

        loop {
            let wake = tokio::select! {
                biased;

                trigger = wake_rx.recv(), if triggers_open => match trigger {
                    Some(()) => Wake::External,
                    None => {
                        debug!("wake trigger channel closed");
                        triggers_open = false;
                        continue;
                    }
                },

                heard = self.listener.listen(self.config.idle_window(), &mut self.session.health) => {
                    match heard {
                        Ok(result) => match self.classifier.detect_wake(&result.text) {
                            Some(found) => Wake::Spoken(found),
                            None => {
                                trace!(text = %result.text, "no wake phrase");
                                continue;
                            }
                        },
                        Err(ListenError::Closed) => {
                            info!("audio input closed, state machine stopping");
                            return ExitReason::InputClosed;
                        }
                        Err(ListenError::Device(e)) => {
                            warn!(error = %e, "audio device error while idle");
                            tokio::time::sleep(DEVICE_RETRY_DELAY).await;
                            continue;
                        }
                        Err(ListenError::Transcription(e)) => {
                            trace!(error = %e, "nothing usable heard while idle");
                            continue;
                        }
                    }
                }
            };

            if let Some(reason) = self.handle_wake(wake).await {
                info!(?reason, "state machine stopped");
                return reason;
            }
        }
    }

    /// Take one command from wake to response
    async fn handle_wake(&mut self, wake: Wake) -> Option<ExitReason> {
        match wake {
            Wake::Spoken(found) => {
                info!(phrase = %found.phrase, "wake phrase detected");
                self.emit(StateEvent::WakeDetected {
                    phrase: Some(found.phrase),
                });

                if found.remainder.chars().count() >= self.config.immediate_command_min_chars {
                    debug!(command = %found.remainder, "command given with wake phrase");
                    self.transition_to(State::AwaitingCommand);
                    return self.execute(found.remainder).await;
                }
            }
            Wake::External => {
                info!("external wake trigger");
                self.emit(StateEvent::WakeDetected { phrase: None });
            }
        }

        self.transition_to(State::AwaitingCommand);
        self.speaker.speak(&self.config.acknowledgement);

        match self.await_command().await {
            Ok(command) => self.execute(command).await,
            Err(CommandFailure::NotUnderstood) => {
                self.speaker.speak(NOT_UNDERSTOOD);
                self.emit(StateEvent::CommandNotUnderstood);
                self.transition_to(State::Idle);
                None
            }
            Err(CommandFailure::InputClosed) => {
                self.transition_to(State::Idle);
                Some(ExitReason::InputClosed)
            }
        }
    }

    /// Capture one command, re-prompting once on failure
    ///
    /// Both attempts share one `command_timeout` deadline. The first gets
    /// half of it and the retry whatever is left.
    async fn await_command(&mut self) -> Result<String, CommandFailure> {
        let deadline = Instant::now() + self.config.command_timeout();

        for attempt in 1..=2 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(attempt, "command deadline reached");
                break;
            }
            let window = if attempt == 1 { remaining / 2 } else { remaining };

            match self.listener.listen(window, &mut self.session.health).await {
                Ok(result) => return Ok(result.text),
                Err(ListenError::Closed) => return Err(CommandFailure::InputClosed),
                Err(e) => {
                    warn!(attempt, error = %e, "command not captured");
                    if attempt == 1 {
                        self.speaker.speak(REPROMPT);
                    }
                }
            }
        }
        Err(CommandFailure::NotUnderstood)
    }

    /// Classify, dispatch and deliver the response
    async fn execute(&mut self, command: String) -> Option<ExitReason> {
        let intent = self.classifier.classify(&command);
        info!(%command, %intent, "command recognized");
        self.emit(StateEvent::CommandRecognized {
            text: command,
            intent: intent.to_string(),
        });

        self.transition_to(State::Executing);
        let started = Instant::now();

        let ctx = DispatchContext {
            listener: Some(&mut self.listener),
            health: &mut self.session.health,
            conversation: &mut self.session.conversation,
        };
        let outcome = self.dispatcher.dispatch(intent, ctx).await;

        if let Some(text) = &outcome.spoken_text {
            self.speaker.speak(text);
        }
        self.emit(StateEvent::ResponseDelivered {
            duration_ms: started.elapsed().as_millis() as u64,
            terminate: outcome.terminate,
        });
        self.emit(StateEvent::ProvidersUpdated {
            providers: self.session.health.snapshot(Instant::now()),
        });

        self.transition_to(State::Idle);
        outcome.terminate.then_some(ExitReason::UserExit)
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: State) {
        let old_state = self.session.state;
        if old_state == new_state {
            return;
        }
        let duration_ms = self.session.last_activity.elapsed().as_millis() as u64;

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.session.state = new_state;
        self.session.last_activity = Instant::now();
        self.emit(StateEvent::StateChanged {
            from: old_state,
            to: new_state,
        });
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}

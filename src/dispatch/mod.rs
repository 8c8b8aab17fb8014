//! Command dispatch
//!
//! Routes a classified [`Intent`] to the collaborator that carries it out and
//! turns the result into something to say. Collaborator failures never
//! escape: every path ends in a [`DispatchOutcome`].

mod dictation;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::audio::Listener;
use crate::config::DictationConfig;
use crate::error::{LaunchError, SystemError, TypingError};
use crate::intent::{ControlAction, ControlValue, Intent};
use crate::providers::{AnswerChain, AnswerRequest, ProviderHealth, ProviderId};
use crate::state::Conversation;
use crate::system::{AppLauncher, Speaker, SystemSettings, Typist};

use dictation::{DictationEnd, DictationSession};

/// Upper bound on any single launcher, settings or typing call
const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

const DEGRADED_SUFFIX: &str = " (best effort)";

/// Messages of recent conversation given to the models
const DEFAULT_PROMPT_HISTORY: usize = 5;

pub const HELP_TEXT: &str = "I can open applications, change the volume, brightness or WiFi, \
research a topic and follow up on it, type a phrase, or take dictation. Try saying \
\"open Firefox\", \"set volume to fifty\", \"research black holes\", \"type hello\" \
or \"start dictation\". Say \"goodbye\" to exit.";

/// Result of handling one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Text to speak, if any
    pub spoken_text: Option<String>,
    pub side_effect_performed: bool,
    /// The assistant should shut down
    pub terminate: bool,
}

impl DispatchOutcome {
    fn say(text: impl Into<String>) -> Self {
        Self {
            spoken_text: Some(text.into()),
            side_effect_performed: false,
            terminate: false,
        }
    }

    fn done(text: impl Into<String>) -> Self {
        Self {
            side_effect_performed: true,
            ..Self::say(text)
        }
    }
}

/// Per-command access to state owned by the state machine
pub struct DispatchContext<'a> {
    /// Absent when there is no live audio, e.g. one-shot commands
    pub listener: Option<&'a mut Listener>,
    pub health: &'a mut ProviderHealth,
    pub conversation: &'a mut Conversation,
}

pub struct Dispatcher {
    launcher: Arc<dyn AppLauncher>,
    settings: Arc<dyn SystemSettings>,
    typist: Arc<dyn Typist>,
    speaker: Arc<dyn Speaker>,
    answers: AnswerChain,
    research_deadline: Duration,
    prompt_history: usize,
    dictation: DictationConfig,
}

impl Dispatcher {
    pub fn new(
        launcher: Arc<dyn AppLauncher>,
        settings: Arc<dyn SystemSettings>,
        typist: Arc<dyn Typist>,
        speaker: Arc<dyn Speaker>,
        answers: AnswerChain,
        research_deadline: Duration,
        dictation: DictationConfig,
    ) -> Self {
        Self {
            launcher,
            settings,
            typist,
            speaker,
            answers,
            research_deadline,
            prompt_history: DEFAULT_PROMPT_HISTORY,
            dictation,
        }
    }

    /// How many recent messages go into a research prompt
    pub fn with_prompt_history(mut self, messages: usize) -> Self {
        self.prompt_history = messages;
        self
    }

    pub async fn dispatch(&self, intent: Intent, ctx: DispatchContext<'_>) -> DispatchOutcome {
        info!(%intent, "dispatching");
        match intent {
            Intent::Wake => DispatchOutcome::say("I'm here. What can I do for you?"),
            Intent::OpenApp { target } => self.open_app(&target).await,
            Intent::SystemControl { action, value } => self.system_control(action, value).await,
            Intent::Research { query } => self.research(&query, ctx).await,
            Intent::Dictate => self.dictate(ctx).await,
            Intent::TypeText { text } => self.type_text(&text).await,
            Intent::Help => DispatchOutcome::say(HELP_TEXT),
            Intent::Unknown => {
                DispatchOutcome::say(format!("I'm not sure how to help with that. {HELP_TEXT}"))
            }
            Intent::Exit => DispatchOutcome {
                spoken_text: Some("Goodbye!".to_string()),
                side_effect_performed: false,
                terminate: true,
            },
        }
    }

    async fn open_app(&self, target: &str) -> DispatchOutcome {
        match tokio::time::timeout(ACTION_TIMEOUT, self.launcher.launch(target)).await {
            Ok(Ok(())) => DispatchOutcome::done(format!("Opening {target}.")),
            Ok(Err(LaunchError::NotFound(_))) => {
                DispatchOutcome::say(format!("Sorry, I couldn't find {target}."))
            }
            Ok(Err(LaunchError::PermissionDenied(_))) => {
                DispatchOutcome::say(format!("I don't have permission to open {target}."))
            }
            Err(_) => {
                warn!(app = target, "launch timed out");
                DispatchOutcome::say(format!("Opening {target} is taking too long."))
            }
        }
    }

    async fn system_control(
        &self,
        action: ControlAction,
        value: Option<ControlValue>,
    ) -> DispatchOutcome {
        let value = match (action, value) {
            (ControlAction::Mute, None) => ControlValue::Switch(true),
            (ControlAction::Wifi, None | Some(ControlValue::Level(_) | ControlValue::Step(_))) => {
                return DispatchOutcome::say("Should I turn WiFi on or off?");
            }
            (_, None) => {
                return DispatchOutcome::say(format!("What level should I set the {action} to?"));
            }
            (_, Some(value)) => clamp(value),
        };

        let result = tokio::time::timeout(
            ACTION_TIMEOUT,
            self.settings.apply_control(action, Some(value)),
        )
        .await
        .unwrap_or_else(|_| Err(SystemError::Failed("timed out".to_string())));

        match result {
            Ok(()) => DispatchOutcome::done(confirmation(action, value)),
            Err(e) => {
                warn!(%action, ?value, error = %e, "system control failed");
                DispatchOutcome::say(match e {
                    SystemError::PermissionDenied => {
                        format!("I don't have permission to change the {action}.")
                    }
                    SystemError::Unsupported => {
                        format!("Changing the {action} isn't supported on this system.")
                    }
                    SystemError::OutOfRange => format!("That {action} value is out of range."),
                    SystemError::Failed(_) => format!("Sorry, I couldn't change the {action}."),
                })
            }
        }
    }

    async fn research(&self, query: &str, ctx: DispatchContext<'_>) -> DispatchOutcome {
        if query.trim().is_empty() {
            return DispatchOutcome::say("What would you like me to research?");
        }

        self.speaker.speak(&format!("Researching {query}."));
        let history = ctx.conversation.recent(self.prompt_history);
        let request = AnswerRequest::new(query, Instant::now() + self.research_deadline)
            .with_history(&history);
        let response = self.answers.answer(request, ctx.health).await;

        if response.source != ProviderId::Canned {
            ctx.conversation.record(query, &response.text);
        }
        let mut text = response.text;
        if response.degraded {
            text.push_str(DEGRADED_SUFFIX);
        }
        DispatchOutcome::say(text)
    }

    async fn type_text(&self, text: &str) -> DispatchOutcome {
        if text.trim().is_empty() {
            return DispatchOutcome::say("What should I type?");
        }

        let result = tokio::time::timeout(ACTION_TIMEOUT, self.typist.type_text(text))
            .await
            .unwrap_or_else(|_| Err(TypingError::Failed("timed out".to_string())));

        match result {
            Ok(()) => DispatchOutcome {
                spoken_text: None,
                side_effect_performed: true,
                terminate: false,
            },
            Err(TypingError::Unavailable) => {
                DispatchOutcome::say("Typing isn't available on this system.")
            }
            Err(e) => {
                warn!(error = %e, "typing failed");
                DispatchOutcome::say("Sorry, I couldn't type that.")
            }
        }
    }

    async fn dictate(&self, ctx: DispatchContext<'_>) -> DispatchOutcome {
        let Some(listener) = ctx.listener else {
            return DispatchOutcome::say("Dictation needs live audio input.");
        };

        let stop = self
            .dictation
            .stop_phrases
            .first()
            .map(String::as_str)
            .unwrap_or("stop dictation");
        self.speaker
            .speak(&format!("Start dictating. Say \"{stop}\" when you're done."));

        let report = DictationSession::new(&self.dictation, self.typist.as_ref())
            .run(listener, ctx.health)
            .await;

        let summary = match report.segments {
            1 => "I typed one segment.".to_string(),
            n => format!("I typed {n} segments."),
        };
        let text = match &report.end {
            DictationEnd::StopPhrase | DictationEnd::InputClosed => {
                format!("Dictation finished. {summary}")
            }
            DictationEnd::MaxDuration => format!("Dictation time limit reached. {summary}"),
            DictationEnd::Silence => format!("I stopped dictation after hearing nothing. {summary}"),
            DictationEnd::TypingFailed(_) => format!("Typing failed, so I stopped dictation. {summary}"),
        };

        DispatchOutcome {
            spoken_text: Some(text),
            side_effect_performed: report.segments > 0,
            terminate: false,
        }
    }
}

/// Keep levels within 0..=100 and steps within -100..=100
fn clamp(value: ControlValue) -> ControlValue {
    match value {
        ControlValue::Level(n) => ControlValue::Level(n.clamp(0, 100)),
        ControlValue::Step(d) => ControlValue::Step(d.clamp(-100, 100)),
        switch => switch,
    }
}

fn confirmation(action: ControlAction, value: ControlValue) -> String {
    let name = match action {
        ControlAction::Brightness => "Brightness",
        _ => "Volume",
    };
    match (action, value) {
        (ControlAction::Mute, ControlValue::Switch(true)) => "Muted.".to_string(),
        (ControlAction::Mute, ControlValue::Switch(false)) => "Unmuted.".to_string(),
        (ControlAction::Wifi, ControlValue::Switch(on)) => {
            format!("Turning WiFi {}.", if on { "on" } else { "off" })
        }
        (_, ControlValue::Level(n)) => format!("{name} set to {n} percent."),
        (_, ControlValue::Step(d)) if d >= 0 => format!("{name} up."),
        (_, ControlValue::Step(_)) => format!("{name} down."),
        (_, ControlValue::Switch(on)) => format!("{action} {}.", if on { "on" } else { "off" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ConsoleTranscriber;
    use crate::config::BreakerConfig;
    use crate::providers::{AnswerSource, ProviderId, TranscriptionAdapter, APOLOGY};
    use crate::testing::{
        RecordingLauncher, RecordingSettings, RecordingSpeaker, RecordingTypist, ScriptedModel,
        ScriptedSource,
    };

    struct Harness {
        launcher: Arc<RecordingLauncher>,
        settings: Arc<RecordingSettings>,
        typist: Arc<RecordingTypist>,
        speaker: Arc<RecordingSpeaker>,
        dispatcher: Dispatcher,
        health: ProviderHealth,
        conversation: Conversation,
    }

    fn harness_with(
        launcher: RecordingLauncher,
        settings: RecordingSettings,
        models: Vec<(ProviderId, Arc<ScriptedModel>)>,
    ) -> Harness {
        let launcher = Arc::new(launcher);
        let settings = Arc::new(settings);
        let typist = Arc::new(RecordingTypist::default());
        let speaker = Arc::new(RecordingSpeaker::default());
        let sources = models
            .into_iter()
            .map(|(id, model)| AnswerSource::Llm {
                id,
                model,
                timeout: Duration::from_secs(5),
            })
            .collect();
        let dispatcher = Dispatcher::new(
            launcher.clone(),
            settings.clone(),
            typist.clone(),
            speaker.clone(),
            AnswerChain::new(sources, 0.6),
            Duration::from_secs(20),
            DictationConfig::default(),
        );
        Harness {
            launcher,
            settings,
            typist,
            speaker,
            dispatcher,
            health: ProviderHealth::new(BreakerConfig::default()),
            conversation: Conversation::new(10),
        }
    }

    fn harness() -> Harness {
        harness_with(
            RecordingLauncher::default(),
            RecordingSettings::default(),
            Vec::new(),
        )
    }

    impl Harness {
        async fn dispatch(&mut self, intent: Intent) -> DispatchOutcome {
            let ctx = DispatchContext {
                listener: None,
                health: &mut self.health,
                conversation: &mut self.conversation,
            };
            self.dispatcher.dispatch(intent, ctx).await
        }
    }

    #[tokio::test]
    async fn test_open_app() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::OpenApp {
                target: "firefox".to_string(),
            })
            .await;
        assert_eq!(outcome.spoken_text.as_deref(), Some("Opening firefox."));
        assert!(outcome.side_effect_performed);
        assert_eq!(*h.launcher.launched.lock().unwrap(), vec!["firefox"]);
    }

    #[tokio::test]
    async fn test_open_missing_app() {
        let mut h = harness_with(
            RecordingLauncher {
                result: Some(LaunchError::NotFound("gimp".to_string())),
                ..RecordingLauncher::default()
            },
            RecordingSettings::default(),
            Vec::new(),
        );
        let outcome = h
            .dispatch(Intent::OpenApp {
                target: "gimp".to_string(),
            })
            .await;
        assert_eq!(outcome.spoken_text.as_deref(), Some("Sorry, I couldn't find gimp."));
        assert!(!outcome.side_effect_performed);
        assert!(!outcome.terminate);
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::SystemControl {
                action: ControlAction::Volume,
                value: Some(ControlValue::Level(150)),
            })
            .await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("Volume set to 100 percent.")
        );
        assert_eq!(
            *h.settings.applied.lock().unwrap(),
            vec![(ControlAction::Volume, Some(ControlValue::Level(100)))]
        );

        h.dispatch(Intent::SystemControl {
            action: ControlAction::Brightness,
            value: Some(ControlValue::Step(-400)),
        })
        .await;
        assert_eq!(
            h.settings.applied.lock().unwrap()[1],
            (ControlAction::Brightness, Some(ControlValue::Step(-100)))
        );
    }

    #[tokio::test]
    async fn test_missing_value_asks() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::SystemControl {
                action: ControlAction::Volume,
                value: None,
            })
            .await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("What level should I set the volume to?")
        );
        assert!(!outcome.side_effect_performed);
        assert!(h.settings.applied.lock().unwrap().is_empty());

        let outcome = h
            .dispatch(Intent::SystemControl {
                action: ControlAction::Wifi,
                value: None,
            })
            .await;
        assert_eq!(outcome.spoken_text.as_deref(), Some("Should I turn WiFi on or off?"));
    }

    #[tokio::test]
    async fn test_bare_mute_mutes() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::SystemControl {
                action: ControlAction::Mute,
                value: None,
            })
            .await;
        assert_eq!(outcome.spoken_text.as_deref(), Some("Muted."));
        assert_eq!(
            *h.settings.applied.lock().unwrap(),
            vec![(ControlAction::Mute, Some(ControlValue::Switch(true)))]
        );
    }

    #[tokio::test]
    async fn test_settings_failure_is_spoken() {
        let mut h = harness_with(
            RecordingLauncher::default(),
            RecordingSettings {
                result: Some(SystemError::PermissionDenied),
                ..RecordingSettings::default()
            },
            Vec::new(),
        );
        let outcome = h
            .dispatch(Intent::SystemControl {
                action: ControlAction::Wifi,
                value: Some(ControlValue::Switch(false)),
            })
            .await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("I don't have permission to change the WiFi.")
        );
        assert!(!outcome.side_effect_performed);
    }

    #[tokio::test]
    async fn test_research_primary_answer() {
        let mut h = harness_with(
            RecordingLauncher::default(),
            RecordingSettings::default(),
            vec![(
                ProviderId::RemoteLlm,
                ScriptedModel::new(vec![Ok("Black holes are dense.")]),
            )],
        );
        let outcome = h
            .dispatch(Intent::Research {
                query: "black holes".to_string(),
            })
            .await;
        assert_eq!(outcome.spoken_text.as_deref(), Some("Black holes are dense."));
        assert_eq!(h.speaker.spoken(), vec!["Researching black holes."]);
    }

    #[tokio::test]
    async fn test_research_fallback_is_marked() {
        let mut h = harness_with(
            RecordingLauncher::default(),
            RecordingSettings::default(),
            vec![
                (
                    ProviderId::RemoteLlm,
                    ScriptedModel::new(vec![Err(crate::error::ProviderError::RateLimited)]),
                ),
                (ProviderId::LocalLlm, ScriptedModel::new(vec![Ok("Local answer.")])),
            ],
        );
        let outcome = h
            .dispatch(Intent::Research {
                query: "black holes".to_string(),
            })
            .await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("Local answer. (best effort)")
        );
    }

    #[tokio::test]
    async fn test_research_without_providers_apologises() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::Research {
                query: "black holes".to_string(),
            })
            .await;
        assert_eq!(
            outcome.spoken_text,
            Some(format!("{APOLOGY}{DEGRADED_SUFFIX}"))
        );
    }

    #[tokio::test]
    async fn test_follow_up_research_sees_history() {
        let remote = ScriptedModel::new(vec![
            Ok("Jupiter is a gas giant."),
            Ok("It has 95 known moons."),
        ]);
        let mut h = harness_with(
            RecordingLauncher::default(),
            RecordingSettings::default(),
            vec![(ProviderId::RemoteLlm, remote.clone())],
        );

        h.dispatch(Intent::Research {
            query: "jupiter".to_string(),
        })
        .await;
        let outcome = h
            .dispatch(Intent::Research {
                query: "its moons".to_string(),
            })
            .await;

        assert_eq!(outcome.spoken_text.as_deref(), Some("It has 95 known moons."));
        let prompt = remote.last_prompt().unwrap();
        assert!(prompt.contains("User: jupiter"));
        assert!(prompt.contains("Assistant: Jupiter is a gas giant."));
        assert_eq!(h.conversation.len(), 4);
    }

    #[tokio::test]
    async fn test_apology_not_remembered() {
        let mut h = harness();
        h.dispatch(Intent::Research {
            query: "black holes".to_string(),
        })
        .await;
        assert!(h.conversation.is_empty());
    }

    #[tokio::test]
    async fn test_research_without_topic_asks() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::Research {
                query: String::new(),
            })
            .await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("What would you like me to research?")
        );
        assert!(h.speaker.spoken().is_empty());
    }

    #[tokio::test]
    async fn test_type_text() {
        let mut h = harness();
        let outcome = h
            .dispatch(Intent::TypeText {
                text: "Hello, World!".to_string(),
            })
            .await;
        assert_eq!(outcome.spoken_text, None);
        assert!(outcome.side_effect_performed);
        assert_eq!(*h.typist.typed.lock().unwrap(), vec!["Hello, World!"]);

        let outcome = h
            .dispatch(Intent::TypeText {
                text: String::new(),
            })
            .await;
        assert_eq!(outcome.spoken_text.as_deref(), Some("What should I type?"));
        assert_eq!(h.typist.typed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_type_text_unavailable() {
        let mut h = harness();
        h.dispatcher.typist = Arc::new(RecordingTypist {
            result: Some(TypingError::Unavailable),
            ..RecordingTypist::default()
        });
        let outcome = h
            .dispatch(Intent::TypeText {
                text: "hello".to_string(),
            })
            .await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("Typing isn't available on this system.")
        );
        assert!(!outcome.side_effect_performed);
    }

    #[tokio::test]
    async fn test_exit_terminates() {
        let mut h = harness();
        let outcome = h.dispatch(Intent::Exit).await;
        assert!(outcome.terminate);
        assert_eq!(outcome.spoken_text.as_deref(), Some("Goodbye!"));
    }

    #[tokio::test]
    async fn test_unknown_gets_help() {
        let mut h = harness();
        let outcome = h.dispatch(Intent::Unknown).await;
        let text = outcome.spoken_text.unwrap();
        assert!(text.starts_with("I'm not sure how to help with that."));
        assert!(text.ends_with(HELP_TEXT));
    }

    #[tokio::test]
    async fn test_dictation_without_audio() {
        let mut h = harness();
        let outcome = h.dispatch(Intent::Dictate).await;
        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("Dictation needs live audio input.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictation_types_segments() {
        let mut h = harness();
        let mut listener = Listener::new(
            Box::new(ScriptedSource::new(["hello there", "stop typing"])),
            TranscriptionAdapter::new(vec![Arc::new(ConsoleTranscriber)], Duration::from_secs(1)),
        );
        let ctx = DispatchContext {
            listener: Some(&mut listener),
            health: &mut h.health,
            conversation: &mut h.conversation,
        };
        let outcome = h.dispatcher.dispatch(Intent::Dictate, ctx).await;

        assert_eq!(
            outcome.spoken_text.as_deref(),
            Some("Dictation finished. I typed one segment.")
        );
        assert!(outcome.side_effect_performed);
        assert_eq!(*h.typist.typed.lock().unwrap(), vec!["hello there "]);
        assert_eq!(
            h.speaker.spoken(),
            vec!["Start dictating. Say \"stop dictation\" when you're done."]
        );
    }
}

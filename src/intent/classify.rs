//! Pattern-table classifier
//!
//! Match order is fixed: exit, system control, application open, research,
//! dictation, typing, help, bare wake phrase. Exit patterns come first so
//! that "goodbye" always terminates, whatever else the sentence contains.

use regex::Regex;
use tracing::{trace, warn};

use super::numbers::extract_number;
use super::{ControlAction, ControlValue, Intent};
use crate::config::WakeConfig;

/// Default step for "volume up" style commands
const STEP: i64 = 10;

/// Lower-case, strip punctuation and collapse whitespace
///
/// Hyphens, percent signs and apostrophes survive so that "wi-fi", "50%"
/// and "what's" keep their meaning.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase().replace('\u{2019}', "'");
    let trimmed = lowered.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '%');
    let cleaned: String = trimmed
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '%' | '\'') {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("invalid built-in intent pattern")
}

/// Compiled command patterns, applied to normalised text
#[derive(Debug, Clone)]
struct PatternSet {
    exit: Regex,
    unmute: Regex,
    mute: Regex,
    volume: Regex,
    wifi: Regex,
    brightness: Regex,
    up: Regex,
    down: Regex,
    on: Regex,
    off: Regex,
    /// Group 1: the amount after "by"
    by_amount: Regex,
    /// Group 1: target with fillers, articles and suffixes removed
    open: Regex,
    /// Group 1: query
    research: Regex,
    dictation: Regex,
    /// Matches the normalised form; payload comes from `type_raw`
    type_text: Regex,
    /// Group 1: text to type, case and punctuation kept
    type_raw: Regex,
    help: Regex,
}

impl PatternSet {
    fn new() -> Self {
        Self {
            exit: pattern(r"\b(?:exit|quit|goodbye|good bye|bye bye|shut down|stop listening)\b"),
            unmute: pattern(r"\bunmute\b"),
            mute: pattern(r"\bmute\b"),
            volume: pattern(r"\bvolume\b"),
            wifi: pattern(r"\b(?:wi-?fi|wi fi|wireless)\b"),
            brightness: pattern(r"\bbrightness\b"),
            up: pattern(r"\b(?:up|increase|louder|raise|higher|brighter)\b"),
            down: pattern(r"\b(?:down|decrease|lower|quieter|reduce|dimmer)\b"),
            on: pattern(r"\b(?:on|enable|connect)\b"),
            off: pattern(r"\b(?:off|disable|disconnect)\b"),
            by_amount: pattern(r"\bby (.+)$"),
            open: pattern(
                r"^(?:(?:please|can|could|would|you|hey|ok|okay|now|just) )*(?:open|launch) (?:(?:the|my|a|an|up) )*(.+?)(?: (?:please|app|application|for me))*$",
            ),
            research: pattern(
                r"\b(?:tell me about|search for|look up|find information about|research|search|what is|what are|who is|(?:and )?(?:what|how) about)\b ?(?:about )?(.*?)(?: please)*$",
            ),
            dictation: pattern(
                r"\b(?:dictate|dictation|type what i say|start typing|take a note)\b",
            ),
            type_text: pattern(r"^(?:(?:please|can|could|would|you|just|now) )*(?:type|write)\b"),
            type_raw: pattern(
                r"(?i)^\W*(?:(?:please|can|could|would|you|just|now)\W+)*(?:type|write)\b[\s:,]*(.*)$",
            ),
            help: pattern(r"\b(?:help|what can you do)\b"),
        }
    }
}

/// A wake phrase found in an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    pub phrase: String,
    /// Normalised text following the wake phrase
    pub remainder: String,
}

#[derive(Debug, Clone)]
struct WakePattern {
    phrase: String,
    regex: Regex,
}

/// Tolerant matcher for one normalised phrase
///
/// Words may be run together or hyphenated ("heyzee", "hey-zee") and the
/// last word may carry a possessive ("zee's").
fn wake_pattern(phrase: &str) -> Option<WakePattern> {
    let words: Vec<String> = phrase.split(' ').map(regex::escape).collect();
    let source = format!(r"\b{}(?:'s|s')?\b", words.join(r"[\s-]*"));
    match Regex::new(&source) {
        Ok(regex) => Some(WakePattern {
            phrase: phrase.to_string(),
            regex,
        }),
        Err(e) => {
            warn!(phrase, error = %e, "skipping wake phrase");
            None
        }
    }
}

/// Classifies normalised text into intents
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    patterns: PatternSet,
    /// Longest phrase first
    wake: Vec<WakePattern>,
}

impl IntentClassifier {
    pub fn new(wake_phrases: &[String]) -> Self {
        let mut phrases: Vec<String> = wake_phrases
            .iter()
            .map(|p| normalize(p))
            .filter(|p| !p.is_empty())
            .collect();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        phrases.dedup();
        Self {
            patterns: PatternSet::new(),
            wake: phrases.iter().filter_map(|p| wake_pattern(p)).collect(),
        }
    }

    /// Configured phrases plus the recogniser variants that stand in for them
    pub fn from_config(config: &WakeConfig) -> Self {
        let phrases: Vec<String> = config
            .phrases
            .iter()
            .chain(config.variants.iter())
            .cloned()
            .collect();
        Self::new(&phrases)
    }

    /// Look for any wake phrase in `text`
    pub fn detect_wake(&self, text: &str) -> Option<WakeMatch> {
        let text = normalize(text);
        self.wake.iter().find_map(|wake| {
            wake.regex.find(&text).map(|m| WakeMatch {
                phrase: wake.phrase.clone(),
                remainder: text[m.end()..].trim().to_string(),
            })
        })
    }

    /// Classify `text`; never fails
    pub fn classify(&self, text: &str) -> Intent {
        let normalized = normalize(text);
        let intent = self.classify_normalized(text, &normalized);
        trace!(text = %normalized, %intent, "classified");
        intent
    }

    fn classify_normalized(&self, raw: &str, text: &str) -> Intent {
        let p = &self.patterns;
        if text.is_empty() {
            return Intent::Unknown;
        }
        if p.exit.is_match(text) {
            return Intent::Exit;
        }
        if let Some(intent) = self.system_control(text) {
            return intent;
        }
        if let Some(caps) = p.open.captures(text) {
            return Intent::OpenApp {
                target: caps[1].to_string(),
            };
        }
        if let Some(caps) = p.research.captures(text) {
            return Intent::Research {
                query: caps[1].to_string(),
            };
        }
        if p.dictation.is_match(text) {
            return Intent::Dictate;
        }
        if p.type_text.is_match(text) {
            let typed = p
                .type_raw
                .captures(raw.trim())
                .map(|caps| caps[1].trim().to_string())
                .unwrap_or_default();
            return Intent::TypeText { text: typed };
        }
        if p.help.is_match(text) {
            return Intent::Help;
        }
        let only_wake = self.wake.iter().any(|wake| {
            wake.regex
                .find(text)
                .is_some_and(|m| m.start() == 0 && m.end() == text.len())
        });
        if only_wake {
            return Intent::Wake;
        }
        Intent::Unknown
    }

    fn system_control(&self, text: &str) -> Option<Intent> {
        let p = &self.patterns;
        let control = |action, value| Some(Intent::SystemControl { action, value });

        if p.unmute.is_match(text) {
            return control(ControlAction::Mute, Some(ControlValue::Switch(false)));
        }
        if p.mute.is_match(text) {
            return control(ControlAction::Mute, Some(ControlValue::Switch(true)));
        }
        if p.volume.is_match(text) {
            return control(ControlAction::Volume, self.level_value(text));
        }
        if p.wifi.is_match(text) {
            return control(ControlAction::Wifi, self.switch_value(text));
        }
        if p.brightness.is_match(text) {
            return control(ControlAction::Brightness, self.level_value(text));
        }
        None
    }

    /// "by <n>" is a relative step, any other number is the target level,
    /// and a bare direction moves by [`STEP`]
    fn level_value(&self, text: &str) -> Option<ControlValue> {
        let p = &self.patterns;
        let direction = if p.up.is_match(text) {
            Some(1)
        } else if p.down.is_match(text) {
            Some(-1)
        } else {
            None
        };

        let by = p
            .by_amount
            .captures(text)
            .and_then(|caps| extract_number(&caps[1]));
        if let Some(amount) = by {
            return Some(ControlValue::Step(direction.unwrap_or(1) * amount));
        }
        if let Some(level) = extract_number(text) {
            return Some(ControlValue::Level(level));
        }
        direction.map(|sign| ControlValue::Step(sign * STEP))
    }

    fn switch_value(&self, text: &str) -> Option<ControlValue> {
        let p = &self.patterns;
        if p.off.is_match(text) {
            Some(ControlValue::Switch(false))
        } else if p.on.is_match(text) {
            Some(ControlValue::Switch(true))
        } else {
            None
        }
    }
}

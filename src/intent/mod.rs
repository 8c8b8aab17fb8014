//! Intent classification for transcribed commands
//!
//! Maps free-form text to a discrete [`Intent`] with compiled patterns over
//! normalised text. Classification is total: anything unrecognised is
//! [`Intent::Unknown`].

mod classify;
mod numbers;

use serde::{Deserialize, Serialize};

pub use classify::{normalize, IntentClassifier, WakeMatch};
pub use numbers::extract_number;

/// A system setting the assistant can change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Volume,
    Mute,
    Wifi,
    Brightness,
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlAction::Volume => write!(f, "volume"),
            ControlAction::Mute => write!(f, "mute"),
            ControlAction::Wifi => write!(f, "WiFi"),
            ControlAction::Brightness => write!(f, "brightness"),
        }
    }
}

/// Argument to a system control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlValue {
    /// Absolute percentage
    Level(i64),
    /// Relative change in percentage points
    Step(i64),
    /// On or off
    Switch(bool),
}

/// Classified meaning of an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// The utterance was only a wake phrase
    Wake,
    OpenApp {
        target: String,
    },
    SystemControl {
        action: ControlAction,
        value: Option<ControlValue>,
    },
    /// Empty `query` means the topic is still missing
    Research {
        query: String,
    },
    Dictate,
    /// One-shot typing; empty `text` means nothing was given
    TypeText {
        text: String,
    },
    Help,
    Exit,
    Unknown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Wake => write!(f, "WAKE"),
            Intent::OpenApp { target } => write!(f, "OPEN_APP({target})"),
            Intent::SystemControl { action, value } => match value {
                Some(value) => write!(f, "SYSTEM_CONTROL({action}, {value:?})"),
                None => write!(f, "SYSTEM_CONTROL({action})"),
            },
            Intent::Research { query } => write!(f, "RESEARCH({query})"),
            Intent::Dictate => write!(f, "DICTATE"),
            Intent::TypeText { text } => write!(f, "TYPE_TEXT({text})"),
            Intent::Help => write!(f, "HELP"),
            Intent::Exit => write!(f, "EXIT"),
            Intent::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

//! OS-facing collaborators
//!
//! Traits at the boundary the dispatcher and state machine call through,
//! plus thin default implementations that shell out to platform tools.

mod launcher;
mod settings;
mod speech;
mod typing;

use async_trait::async_trait;

use crate::error::{LaunchError, SystemError, TypingError};
use crate::intent::{ControlAction, ControlValue};

pub use launcher::ProcessLauncher;
pub use settings::ShellSettings;
pub use speech::{ConsoleSpeaker, ProcessSpeaker};
pub use typing::{CommandTypist, ConsoleTypist};

/// Host platform, selecting which tools the defaults invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            _ => Platform::Other,
        }
    }
}

/// Changes volume, mute, WiFi and brightness
#[async_trait]
pub trait SystemSettings: Send + Sync {
    async fn apply_control(
        &self,
        action: ControlAction,
        value: Option<ControlValue>,
    ) -> Result<(), SystemError>;
}

/// Starts applications by spoken name
#[async_trait]
pub trait AppLauncher: Send + Sync {
    async fn launch(&self, app_name: &str) -> Result<(), LaunchError>;
}

/// Types text into the focused window
#[async_trait]
pub trait Typist: Send + Sync {
    async fn type_text(&self, text: &str) -> Result<(), TypingError>;
}

/// Speaks responses; fire-and-forget
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str);
}

/// Non-zero exit output that indicates missing privileges
fn looks_like_permission_error(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    ["permission", "not authorized", "not permitted", "access denied"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

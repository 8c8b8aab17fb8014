//! System settings through platform command-line tools

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::SystemError;
use crate::intent::{ControlAction, ControlValue};

use super::{looks_like_permission_error, Platform, SystemSettings};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

fn signed_percent(delta: i64) -> String {
    let sign = if delta >= 0 { '+' } else { '-' };
    format!("{}%{sign}", delta.unsigned_abs())
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Command line that applies `action` on `platform`
fn control_command(
    platform: Platform,
    action: ControlAction,
    value: Option<ControlValue>,
) -> Result<Vec<String>, SystemError> {
    use ControlAction::*;
    use ControlValue::*;

    let value = value.ok_or(SystemError::OutOfRange)?;
    let on_off = |on: bool| if on { "on" } else { "off" };

    match platform {
        Platform::Linux => match (action, value) {
            (Volume, Level(n)) => Ok(argv(&["amixer", "set", "Master", &format!("{n}%")])),
            (Volume, Step(d)) => Ok(argv(&["amixer", "set", "Master", &signed_percent(d)])),
            (Mute, Switch(muted)) => Ok(argv(&[
                "amixer",
                "set",
                "Master",
                if muted { "mute" } else { "unmute" },
            ])),
            (Wifi, Switch(on)) => Ok(argv(&["nmcli", "radio", "wifi", on_off(on)])),
            (Brightness, Level(n)) => Ok(argv(&["brightnessctl", "set", &format!("{n}%")])),
            (Brightness, Step(d)) => Ok(argv(&["brightnessctl", "set", &signed_percent(d)])),
            _ => Err(SystemError::OutOfRange),
        },
        Platform::MacOs => match (action, value) {
            (Volume, Level(n)) => Ok(argv(&[
                "osascript",
                "-e",
                &format!("set volume output volume {n}"),
            ])),
            (Volume, Step(d)) => Ok(argv(&[
                "osascript",
                "-e",
                &format!("set volume output volume ((output volume of (get volume settings)) + {d})"),
            ])),
            (Mute, Switch(muted)) => Ok(argv(&[
                "osascript",
                "-e",
                &format!("set volume output muted {muted}"),
            ])),
            (Wifi, Switch(on)) => Ok(argv(&["networksetup", "-setairportpower", "en0", on_off(on)])),
            (Brightness, Level(n)) => Ok(argv(&["brightness", &format!("{:.2}", n as f64 / 100.0)])),
            (Brightness, Step(_)) => Err(SystemError::Unsupported),
            _ => Err(SystemError::OutOfRange),
        },
        Platform::Other => Err(SystemError::Unsupported),
    }
}

/// Runs amixer/nmcli/brightnessctl on Linux, osascript/networksetup on macOS
pub struct ShellSettings {
    platform: Platform,
}

impl ShellSettings {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl SystemSettings for ShellSettings {
    async fn apply_control(
        &self,
        action: ControlAction,
        value: Option<ControlValue>,
    ) -> Result<(), SystemError> {
        let command = control_command(self.platform, action, value)?;
        let (program, args) = command.split_first().ok_or(SystemError::Unsupported)?;

        if which::which(program).is_err() {
            warn!(program, "control tool not installed");
            return Err(SystemError::Unsupported);
        }

        debug!(?command, "applying system control");
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            tokio::process::Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SystemError::Failed(format!("{program} timed out")))?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => SystemError::PermissionDenied,
            std::io::ErrorKind::NotFound => SystemError::Unsupported,
            _ => SystemError::Failed(e.to_string()),
        })?;

        if output.status.success() {
            info!(%action, ?value, "system control applied");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(program, status = ?output.status, stderr = %stderr.trim(), "system control failed");
        if looks_like_permission_error(&stderr) {
            Err(SystemError::PermissionDenied)
        } else {
            Err(SystemError::Failed(stderr.trim().to_string()))
        }
    }
}

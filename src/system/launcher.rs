//! Application launching by spoken name

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::LaunchError;

use super::{looks_like_permission_error, AppLauncher, Platform};

const OPENER_TIMEOUT: Duration = Duration::from_secs(5);

/// Spoken names that open a web page instead of a program
fn web_target(name: &str) -> Option<&'static str> {
    match name {
        "google" => Some("https://www.google.com"),
        "youtube" => Some("https://www.youtube.com"),
        "chatgpt" | "chat gpt" => Some("https://chat.openai.com"),
        "gmail" => Some("https://mail.google.com"),
        _ => None,
    }
}

fn app_alias(platform: Platform, name: &str) -> String {
    let alias = match (platform, name) {
        (Platform::Linux, "chrome" | "google chrome") => "google-chrome",
        (Platform::Linux, "browser" | "web browser") => "firefox",
        (Platform::Linux, "terminal") => "gnome-terminal",
        (Platform::Linux, "calculator") => "gnome-calculator",
        (Platform::Linux, "files" | "file manager") => "nautilus",
        (Platform::Linux, "vs code" | "visual studio code" | "code") => "code",
        (Platform::MacOs, "chrome" | "google chrome") => "Google Chrome",
        (Platform::MacOs, "browser" | "web browser" | "safari") => "Safari",
        (Platform::MacOs, "firefox") => "Firefox",
        (Platform::MacOs, "terminal") => "Terminal",
        (Platform::MacOs, "calculator") => "Calculator",
        (Platform::MacOs, "notes") => "Notes",
        (Platform::MacOs, "files" | "finder") => "Finder",
        (Platform::MacOs, "vs code" | "visual studio code" | "code") => "Visual Studio Code",
        _ => return name.replace(' ', "-"),
    };
    alias.to_string()
}

/// Command line for `name`, and whether it is a short-lived opener to wait on
fn launch_command(platform: Platform, name: &str) -> (Vec<String>, bool) {
    if let Some(url) = web_target(name) {
        let opener = match platform {
            Platform::MacOs => "open",
            _ => "xdg-open",
        };
        return (vec![opener.to_string(), url.to_string()], true);
    }

    let app = app_alias(platform, name);
    match platform {
        Platform::MacOs => (vec!["open".to_string(), "-a".to_string(), app], true),
        _ => (vec![app], false),
    }
}

/// Spawns programs found on PATH; `open -a` on macOS
pub struct ProcessLauncher {
    platform: Platform,
}

impl ProcessLauncher {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl AppLauncher for ProcessLauncher {
    async fn launch(&self, app_name: &str) -> Result<(), LaunchError> {
        let name = app_name.trim().to_lowercase();
        let (command, wait) = launch_command(self.platform, &name);
        let not_found = || LaunchError::NotFound(app_name.to_string());
        let (program, args) = command.split_first().ok_or_else(not_found)?;

        if which::which(program).is_err() {
            debug!(program, "launch target not on PATH");
            return Err(not_found());
        }

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(if wait { Stdio::piped() } else { Stdio::null() });

        let map_spawn_error = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                LaunchError::PermissionDenied(app_name.to_string())
            }
            _ => not_found(),
        };

        if !wait {
            cmd.spawn().map_err(map_spawn_error)?;
            info!(app = %name, program, "application launched");
            return Ok(());
        }

        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(OPENER_TIMEOUT, cmd.output())
            .await
            .map_err(|_| not_found())?
            .map_err(map_spawn_error)?;

        if output.status.success() {
            info!(app = %name, program, "application opened");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(app = %name, stderr = %stderr.trim(), "opener failed");
        if looks_like_permission_error(&stderr) {
            Err(LaunchError::PermissionDenied(app_name.to_string()))
        } else {
            Err(not_found())
        }
    }
}

//! Spoken output

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Platform, Speaker};

/// Prints responses to stdout
pub struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&self, text: &str) {
        info!(%text, "speaking");
        println!("zee> {text}");
    }
}

/// Plays responses through a text-to-speech program, one at a time
///
/// `speak` only queues the text. A single worker task runs the program for
/// each queued response and waits for it to finish before starting the next.
pub struct ProcessSpeaker {
    queue: mpsc::UnboundedSender<String>,
}

impl ProcessSpeaker {
    /// Start the playback worker; needs a running tokio runtime
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(play_queue(program, args, rx));
        Self { queue }
    }

    /// Finds `say` on macOS, or spd-say / espeak-ng / espeak on Linux
    pub fn detect(platform: Platform) -> Option<Self> {
        // Each program must block until playback ends
        let candidates: &[(&str, Option<&str>)] = match platform {
            Platform::MacOs => &[("say", None)],
            Platform::Linux => &[
                ("spd-say", Some("--wait")),
                ("espeak-ng", None),
                ("espeak", None),
            ],
            Platform::Other => &[],
        };
        candidates.iter().find_map(|(name, flag)| {
            let program = which::which(name).ok()?;
            debug!(program = %program.display(), "text-to-speech program found");
            Some(Self::new(program, flag.map(str::to_string).into_iter().collect()))
        })
    }
}

impl Speaker for ProcessSpeaker {
    fn speak(&self, text: &str) {
        ConsoleSpeaker.speak(text);

        if self.queue.send(text.to_string()).is_err() {
            warn!("speech worker stopped, response not played");
        }
    }
}

async fn play_queue(program: PathBuf, args: Vec<String>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        let status = Command::new(&program)
            .args(&args)
            .arg(&text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if !status.success() => {
                warn!(program = %program.display(), %status, "text-to-speech exited with error");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(program = %program.display(), error = %e, "text-to-speech failed");
            }
        }
    }
    debug!("speech queue closed");
}

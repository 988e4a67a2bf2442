use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

use super::{Probe, ProbeOutcome};
use crate::config::DEFAULT_USER_AGENT;

/// Stream selections tried in order: first video stream, then anything.
const SELECTIONS: [&[&str]; 2] = [&["-select_streams", "v:0"], &[]];

/// Probe that shells out to `ffprobe` and reports codec/resolution JSON as
/// diagnostics.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    command: String,
    user_agent: String,
}

impl FfprobeProbe {
    pub fn new(command: Option<String>, user_agent: impl Into<String>) -> Self {
        Self {
            command: command.unwrap_or_else(|| "ffprobe".to_string()),
            user_agent: user_agent.into(),
        }
    }

    fn args<'a>(&'a self, selection: &[&'a str], url: &'a str) -> Vec<&'a str> {
        let mut args = vec!["-v", "error"];
        args.extend_from_slice(selection);
        args.extend_from_slice(&[
            "-show_entries",
            "stream=width,height,codec_name",
            "-print_format",
            "json",
            "-user_agent",
            self.user_agent.as_str(),
            url,
        ]);
        args
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new(None, DEFAULT_USER_AGENT)
    }
}

#[async_trait]
impl Probe for FfprobeProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        let deadline = started + timeout;

        for selection in SELECTIONS {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let mut cmd = Command::new(&self.command);
            cmd.args(self.args(selection, url))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let output = match tokio::time::timeout(remaining, cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    debug!(url, command = %self.command, error = %e, "Failed to run ffprobe");
                    return ProbeOutcome::failure(started.elapsed());
                }
                Err(_) => {
                    debug!(url, timeout_ms = timeout.as_millis(), "ffprobe timed out");
                    return ProbeOutcome::failure(started.elapsed());
                }
            };

            if output.status.success() {
                let diagnostics = serde_json::from_slice::<serde_json::Value>(&output.stdout).ok();
                if diagnostics.is_none() {
                    debug!(url, "ffprobe succeeded with unreadable output");
                }
                return ProbeOutcome::success(started.elapsed(), diagnostics);
            }

            debug!(
                url,
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffprobe failed"
            );
        }

        ProbeOutcome::failure(started.elapsed())
    }
}

mod ffprobe;
mod http;

pub use ffprobe::FfprobeProbe;
pub use http::HttpProbe;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a single liveness attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub succeeded: bool,
    pub duration: Duration,
    /// Structured stream metadata (codec, resolution) from a successful probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

impl ProbeOutcome {
    pub fn success(duration: Duration, diagnostics: Option<serde_json::Value>) -> Self {
        Self {
            succeeded: true,
            duration,
            diagnostics,
        }
    }

    pub fn failure(duration: Duration) -> Self {
        Self {
            succeeded: false,
            duration,
            diagnostics: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// One liveness check against a stream URL.
///
/// Implementations must return within `timeout` and never fail: crashes,
/// malformed output and network errors all become `succeeded == false`.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// Which built-in probe to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// External `ffprobe` utility.
    #[default]
    Ffprobe,
    /// Plain HTTP request inspecting status, content type and first bytes.
    Http,
}

impl std::str::FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffprobe" => Ok(Self::Ffprobe),
            "http" => Ok(Self::Http),
            other => Err(format!(
                "Invalid probe '{}': must be 'ffprobe' or 'http'",
                other
            )),
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ffprobe => write!(f, "ffprobe"),
            Self::Http => write!(f, "http"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        let ok = ProbeOutcome::success(Duration::from_millis(1500), None);
        assert!(ok.succeeded);
        assert_eq!(ok.duration_secs(), 1.5);

        let failed = ProbeOutcome::failure(Duration::from_secs(2));
        assert!(!failed.succeeded);
        assert!(failed.diagnostics.is_none());
    }

    #[test]
    fn probe_kind_parses() {
        assert_eq!("FFPROBE".parse::<ProbeKind>().unwrap(), ProbeKind::Ffprobe);
        assert_eq!("http".parse::<ProbeKind>().unwrap(), ProbeKind::Http);
        assert!("vlc".parse::<ProbeKind>().is_err());
        assert_eq!(ProbeKind::Http.to_string(), "http");
    }
}

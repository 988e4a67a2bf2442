//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [check]
//! source = "https://provider.example.com/playlist.m3u"
//! output_dir = "output"
//! retry_delay_secs = 0.3
//! max_workers = 800
//! diagnostics_dir = "diagnostics"
//! retest = true
//! probe = "ffprobe"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use m3u_core::{CheckConfig, ProbeKind, RetryMode};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub check: CheckSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
        }
    }
}

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_format() -> String {
    "pretty".into()
}

/// `[check]` table: every knob of a run plus where its input and output live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckSection {
    pub source: Option<String>,
    pub output_dir: PathBuf,
    pub retest: bool,
    pub probe: ProbeKind,
    pub ffprobe_path: Option<String>,
    pub retry_delay_secs: f64,
    pub max_workers: usize,
    pub diagnostics_dir: Option<PathBuf>,
    pub retries: u32,
    pub alive_threshold: f64,
    pub first_success: bool,
    pub initial_timeout_secs: f64,
    pub min_timeout_secs: f64,
    pub max_timeout_secs: f64,
    pub timeout_buffer_secs: f64,
    pub timeout_window: usize,
    pub timeout_min_samples: usize,
    pub retest_timeout_secs: f64,
    pub user_agent: Option<String>,
}

impl Default for CheckSection {
    fn default() -> Self {
        let d = CheckConfig::default();
        Self {
            source: None,
            output_dir: PathBuf::from("output"),
            retest: false,
            probe: ProbeKind::default(),
            ffprobe_path: None,
            retry_delay_secs: d.retry_delay.as_secs_f64(),
            max_workers: d.max_workers,
            diagnostics_dir: None,
            retries: d.retries,
            alive_threshold: d.alive_threshold,
            first_success: false,
            initial_timeout_secs: d.initial_timeout.as_secs_f64(),
            min_timeout_secs: d.min_timeout.as_secs_f64(),
            max_timeout_secs: d.max_timeout.as_secs_f64(),
            timeout_buffer_secs: d.timeout_buffer.as_secs_f64(),
            timeout_window: d.timeout_window,
            timeout_min_samples: d.timeout_min_samples,
            retest_timeout_secs: d.retest_timeout.as_secs_f64(),
            user_agent: None,
        }
    }
}

impl CheckSection {
    pub fn to_check_config(&self) -> CheckConfig {
        let mode = if self.first_success {
            RetryMode::FirstSuccess
        } else {
            RetryMode::Exhaustive
        };
        let mut c = CheckConfig::default()
            .with_retry_delay_secs(self.retry_delay_secs)
            .with_max_workers(self.max_workers)
            .with_diagnostics_dir(self.diagnostics_dir.clone())
            .with_retries(self.retries)
            .with_alive_threshold(self.alive_threshold)
            .with_retry_mode(mode)
            .with_initial_timeout(secs(self.initial_timeout_secs))
            .with_timeout_bounds(secs(self.min_timeout_secs), secs(self.max_timeout_secs))
            .with_timeout_buffer(secs(self.timeout_buffer_secs))
            .with_timeout_window(self.timeout_window, self.timeout_min_samples)
            .with_retest_timeout(secs(self.retest_timeout_secs));
        if let Some(ref ua) = self.user_agent {
            c = c.with_user_agent(ua.clone());
        }
        c
    }
}

fn secs(v: f64) -> Duration {
    Duration::try_from_secs_f64(v.max(0.0)).unwrap_or(Duration::MAX)
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could use. Called on load and again after
    /// command-line flags have been merged in.
    pub fn validate(&self) -> Result<(), String> {
        let c = &self.check;

        if let Some(ref source) = c.source {
            if source.trim().is_empty() {
                return Err("check.source must not be empty".into());
            }
            if source.contains("://") {
                let parsed = url::Url::parse(source)
                    .map_err(|e| format!("Invalid playlist URL: {} ({})", source, e))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(format!("Playlist URL must use http or https: {}", source));
                }
            }
        }

        let durations = [
            ("retry_delay_secs", c.retry_delay_secs),
            ("initial_timeout_secs", c.initial_timeout_secs),
            ("min_timeout_secs", c.min_timeout_secs),
            ("max_timeout_secs", c.max_timeout_secs),
            ("timeout_buffer_secs", c.timeout_buffer_secs),
            ("retest_timeout_secs", c.retest_timeout_secs),
        ];
        for (name, value) in durations {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(format!("check.{} must be a non-negative number, got {}", name, value));
            }
        }
        if c.min_timeout_secs > c.max_timeout_secs {
            return Err(format!(
                "check.min_timeout_secs ({}) exceeds check.max_timeout_secs ({})",
                c.min_timeout_secs, c.max_timeout_secs
            ));
        }
        if c.max_workers == 0 {
            return Err("check.max_workers must be at least 1".into());
        }
        if c.retries == 0 {
            return Err("check.retries must be at least 1".into());
        }
        if !(c.alive_threshold > 0.0 && c.alive_threshold <= 1.0) {
            return Err(format!(
                "check.alive_threshold must be in (0, 1], got {}",
                c.alive_threshold
            ));
        }
        if c.timeout_min_samples == 0 || c.timeout_min_samples > c.timeout_window {
            return Err(format!(
                "check.timeout_min_samples must be between 1 and timeout_window ({})",
                c.timeout_window
            ));
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.log_format, "pretty");
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.check.output_dir, PathBuf::from("output"));
        assert_eq!(config.check.probe, ProbeKind::Ffprobe);

        let c = config.check.to_check_config();
        assert_eq!(c.retries, 10);
        assert_eq!(c.alive_threshold, 0.7);
        assert_eq!(c.retry_delay, Duration::from_millis(300));
        assert_eq!(c.retest_timeout, Duration::from_secs(30));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[server]
listen = "127.0.0.1:9090"
log_format = "json"

[check]
source = "https://provider.example.com/list.m3u"
output_dir = "results"
retest = true
probe = "http"
retry_delay_secs = 0.5
max_workers = 64
diagnostics_dir = "diag"
retries = 5
alive_threshold = 0.6
first_success = true
min_timeout_secs = 2
max_timeout_secs = 20
retest_timeout_secs = 15
user_agent = "Kodi/20"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 9090);
        assert_eq!(config.server.log_format, "json");
        assert!(config.check.retest);
        assert_eq!(config.check.probe, ProbeKind::Http);

        let c = config.check.to_check_config();
        assert_eq!(c.retry_delay, Duration::from_millis(500));
        assert_eq!(c.max_workers, 64);
        assert_eq!(c.diagnostics_dir, Some(PathBuf::from("diag")));
        assert_eq!(c.retries, 5);
        assert_eq!(c.alive_threshold, 0.6);
        assert_eq!(c.retry_mode, RetryMode::FirstSuccess);
        assert_eq!(c.min_timeout, Duration::from_secs(2));
        assert_eq!(c.max_timeout, Duration::from_secs(20));
        assert_eq!(c.retest_timeout, Duration::from_secs(15));
        assert_eq!(c.user_agent, "Kodi/20");
    }

    #[test]
    fn validate_rejects_bad_threshold() {
        let config: AppConfig = toml::from_str("[check]\nalive_threshold = 1.5\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("alive_threshold"), "{}", err);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config: AppConfig = toml::from_str("[check]\nmax_workers = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_workers"), "{}", err);
    }

    #[test]
    fn validate_rejects_negative_delay() {
        let config: AppConfig = toml::from_str("[check]\nretry_delay_secs = -1.0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("retry_delay_secs"), "{}", err);
    }

    #[test]
    fn validate_rejects_delay_beyond_duration_range() {
        let mut config = AppConfig::default();
        config.check.retry_delay_secs = 1e20;
        let err = config.validate().unwrap_err();
        assert!(err.contains("retry_delay_secs"), "{}", err);

        config.check.retry_delay_secs = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_values_set_after_load() {
        let mut config: AppConfig = toml::from_str("[check]\nmax_workers = 16\n").unwrap();
        config.validate().unwrap();

        config.check.alive_threshold = 0.0;
        assert!(config.validate().unwrap_err().contains("alive_threshold"));

        config.check.alive_threshold = 0.7;
        config.check.max_workers = 0;
        assert!(config.validate().unwrap_err().contains("max_workers"));
    }

    #[test]
    fn oversized_durations_saturate() {
        assert_eq!(secs(1e20), Duration::MAX);
        assert_eq!(secs(-2.0), Duration::ZERO);
    }

    #[test]
    fn validate_rejects_reversed_timeout_bounds() {
        let config: AppConfig =
            toml::from_str("[check]\nmin_timeout_secs = 40\nmax_timeout_secs = 5\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("exceeds"), "{}", err);
    }

    #[test]
    fn validate_rejects_non_http_source() {
        let config: AppConfig =
            toml::from_str("[check]\nsource = \"ftp://example.com/list.m3u\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("http or https"), "{}", err);

        let config: AppConfig =
            toml::from_str("[check]\nsource = \"playlists/local.m3u\"\n").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let config: AppConfig = toml::from_str("[server]\nlog_format = \"xml\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log_format"), "{}", err);
    }

    #[test]
    fn unknown_probe_fails_to_parse() {
        assert!(toml::from_str::<AppConfig>("[check]\nprobe = \"vlc\"\n").is_err());
    }
}

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "VLC/3.0.11 LibVLC/3.0.11";

/// How the retry controller treats a successful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Run every attempt so the success ratio is a true ratio.
    #[default]
    Exhaustive,
    /// Stop at the first successful attempt.
    FirstSuccess,
}

/// Configuration for a health-check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Pause between two attempts against the same channel (default: 300ms).
    pub retry_delay: Duration,
    /// Maximum number of channels probed at the same time.
    pub max_workers: usize,
    /// Where probe diagnostics are written. `None` disables diagnostics.
    pub diagnostics_dir: Option<PathBuf>,
    /// Attempts per channel (default: 10).
    pub retries: u32,
    /// Success ratio at or above which a channel is ALIVE (default: 0.7).
    pub alive_threshold: f64,
    pub retry_mode: RetryMode,
    /// Probe timeout used until enough successful samples have been seen.
    pub initial_timeout: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    /// Added to the mean successful duration to form the adaptive timeout.
    pub timeout_buffer: Duration,
    /// Capacity of the rolling window of successful durations.
    pub timeout_window: usize,
    /// Samples required before the adaptive timeout replaces the initial one.
    pub timeout_min_samples: usize,
    /// Timeout for the single confirmation attempt given to UNSTABLE channels.
    pub retest_timeout: Duration,
    pub user_agent: String,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(300),
            max_workers: 800,
            diagnostics_dir: None,
            retries: 10,
            alive_threshold: 0.7,
            retry_mode: RetryMode::Exhaustive,
            initial_timeout: Duration::from_secs(10),
            min_timeout: Duration::from_secs(3),
            max_timeout: Duration::from_secs(30),
            timeout_buffer: Duration::from_secs(3),
            timeout_window: 20,
            timeout_min_samples: 5,
            retest_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CheckConfig {
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Same as [`with_retry_delay`](Self::with_retry_delay) for fractional
    /// seconds. Negative values become zero and values too large for a
    /// `Duration` saturate.
    pub fn with_retry_delay_secs(self, secs: f64) -> Self {
        self.with_retry_delay(
            Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX),
        )
    }

    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.diagnostics_dir = dir;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_alive_threshold(mut self, threshold: f64) -> Self {
        self.alive_threshold = if threshold.is_finite() {
            threshold.clamp(f64::EPSILON, 1.0)
        } else {
            0.7
        };
        self
    }

    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = mode;
        self
    }

    pub fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Sets the bounds of the adaptive timeout. A reversed pair is swapped.
    pub fn with_timeout_bounds(mut self, min: Duration, max: Duration) -> Self {
        if min <= max {
            self.min_timeout = min;
            self.max_timeout = max;
        } else {
            self.min_timeout = max;
            self.max_timeout = min;
        }
        self
    }

    pub fn with_timeout_buffer(mut self, buffer: Duration) -> Self {
        self.timeout_buffer = buffer;
        self
    }

    pub fn with_timeout_window(mut self, window: usize, min_samples: usize) -> Self {
        self.timeout_window = window.max(1);
        self.timeout_min_samples = min_samples.clamp(1, self.timeout_window);
        self
    }

    pub fn with_retest_timeout(mut self, timeout: Duration) -> Self {
        self.retest_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CheckConfig;

#[derive(Debug)]
struct Window {
    samples: VecDeque<Duration>,
    estimate: Duration,
}

/// Adaptive per-attempt timeout shared by every worker of a run.
///
/// Keeps the last `window` successful probe durations. Once at least
/// `min_samples` are present the estimate becomes
/// `clamp(mean + buffer, min, max)`; before that it stays at `initial`.
/// Failed attempts are never recorded.
#[derive(Debug)]
pub struct TimeoutEstimator {
    inner: RwLock<Window>,
    min: Duration,
    max: Duration,
    buffer: Duration,
    window: usize,
    min_samples: usize,
}

impl TimeoutEstimator {
    pub fn new(
        initial: Duration,
        min: Duration,
        max: Duration,
        buffer: Duration,
        window: usize,
        min_samples: usize,
    ) -> Self {
        let window = window.max(1);
        Self {
            inner: RwLock::new(Window {
                samples: VecDeque::with_capacity(window),
                estimate: initial,
            }),
            min,
            max: max.max(min),
            buffer,
            window,
            min_samples: min_samples.clamp(1, window),
        }
    }

    pub fn from_config(config: &CheckConfig) -> Self {
        Self::new(
            config.initial_timeout,
            config.min_timeout,
            config.max_timeout,
            config.timeout_buffer,
            config.timeout_window,
            config.timeout_min_samples,
        )
    }

    pub async fn current(&self) -> Duration {
        self.inner.read().await.estimate
    }

    pub async fn samples(&self) -> usize {
        self.inner.read().await.samples.len()
    }

    /// Mean of the retained samples, `None` when empty.
    pub async fn mean(&self) -> Option<Duration> {
        let inner = self.inner.read().await;
        mean_of(&inner.samples)
    }

    pub async fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.write().await;
        if inner.samples.len() >= self.window {
            inner.samples.pop_front();
        }
        inner.samples.push_back(duration);

        if inner.samples.len() < self.min_samples {
            return;
        }
        if let Some(mean) = mean_of(&inner.samples) {
            let estimate = (mean + self.buffer).clamp(self.min, self.max);
            if estimate != inner.estimate {
                debug!(
                    previous_secs = inner.estimate.as_secs_f64(),
                    estimate_secs = estimate.as_secs_f64(),
                    samples = inner.samples.len(),
                    "Adaptive timeout updated"
                );
            }
            inner.estimate = estimate;
        }
    }
}

fn mean_of(samples: &VecDeque<Duration>) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: Duration = samples.iter().sum();
    Some(total / samples.len() as u32)
}

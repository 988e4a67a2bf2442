use std::sync::Arc;

use tracing::{debug, warn};

use crate::checker::status::ChannelResult;
use crate::checker::timeout::TimeoutEstimator;
use crate::config::{CheckConfig, RetryMode};
use crate::diagnostics::DiagnosticsWriter;
use crate::playlist::Channel;
use crate::probe::Probe;

/// Runs the configured number of probe attempts against one channel and
/// classifies the result.
#[derive(Clone)]
pub struct RetryController {
    probe: Arc<dyn Probe>,
    estimator: Arc<TimeoutEstimator>,
    config: Arc<CheckConfig>,
    diagnostics: Option<DiagnosticsWriter>,
}

impl RetryController {
    pub fn new(
        probe: Arc<dyn Probe>,
        estimator: Arc<TimeoutEstimator>,
        config: Arc<CheckConfig>,
    ) -> Self {
        let diagnostics = config.diagnostics_dir.clone().map(DiagnosticsWriter::new);
        Self {
            probe,
            estimator,
            config,
            diagnostics,
        }
    }

    pub async fn run(&self, channel: &Channel) -> ChannelResult {
        let attempts = self.config.retries.max(1);
        let mut made = 0u32;
        let mut successes = 0u32;
        let mut latest_diagnostics = None;

        for attempt in 1..=attempts {
            // Read per attempt so a run picks up estimator changes from
            // concurrent workers.
            let timeout = self.estimator.current().await;
            let outcome = self.probe.probe(&channel.url, timeout).await;
            made += 1;

            if outcome.succeeded {
                successes += 1;
                self.estimator.record_success(outcome.duration).await;
                if outcome.diagnostics.is_some() {
                    latest_diagnostics = outcome.diagnostics;
                }
                if self.config.retry_mode == RetryMode::FirstSuccess {
                    break;
                }
            } else {
                debug!(
                    channel = %channel.name,
                    attempt,
                    timeout_secs = timeout.as_secs_f64(),
                    "Attempt failed"
                );
            }

            if attempt < attempts && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        if let Some(payload) = &latest_diagnostics {
            persist_diagnostics(self.diagnostics.as_ref(), channel, payload).await;
        }

        let result = ChannelResult::from_counts(
            channel.clone(),
            made,
            successes,
            self.config.alive_threshold,
        )
        .with_diagnostics(latest_diagnostics);

        debug!(
            channel = %channel.name,
            status = %result.status,
            successes,
            attempts = made,
            "Channel classified"
        );
        result
    }

}

/// Write the latest successful payload of `channel`. Failures are logged and
/// never change the classification.
pub(crate) async fn persist_diagnostics(
    writer: Option<&DiagnosticsWriter>,
    channel: &Channel,
    payload: &serde_json::Value,
) {
    let Some(writer) = writer else {
        return;
    };
    if let Err(e) = writer.write(&channel.url, payload).await {
        warn!(channel = %channel.name, error = %e, "Failed to write diagnostics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::status::ChannelStatus;
    use crate::probe::ProbeOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed success pattern, then fails.
    struct Scripted {
        pattern: Vec<bool>,
        calls: AtomicUsize,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl Scripted {
        fn new(pattern: &[bool]) -> Self {
            Self {
                pattern: pattern.to_vec(),
                calls: AtomicUsize::new(0),
                timeouts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Probe for Scripted {
        async fn probe(&self, _url: &str, timeout: Duration) -> ProbeOutcome {
            self.timeouts.lock().unwrap().push(timeout);
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.pattern.get(i).copied().unwrap_or(false) {
                ProbeOutcome::success(
                    Duration::from_secs(1),
                    Some(serde_json::json!({"attempt": i})),
                )
            } else {
                ProbeOutcome::failure(Duration::from_millis(5))
            }
        }
    }

    fn controller(probe: Arc<Scripted>, config: CheckConfig) -> RetryController {
        controller_with(probe, config)
    }

    fn controller_with(probe: Arc<dyn Probe>, config: CheckConfig) -> RetryController {
        let config = Arc::new(config.with_retry_delay(Duration::ZERO));
        let estimator = Arc::new(TimeoutEstimator::from_config(&config));
        RetryController::new(probe, estimator, config)
    }

    fn channel() -> Channel {
        Channel::new(1, "News", "http://example.com/news.ts")
    }

    #[tokio::test]
    async fn exhaustive_runs_every_attempt() {
        let probe = Arc::new(Scripted::new(&[true, false, true]));
        let result = controller(probe.clone(), CheckConfig::default())
            .run(&channel())
            .await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
        assert_eq!(result.attempts, 10);
        assert_eq!(result.successes, 2);
        assert_eq!(result.status, ChannelStatus::Unstable);
        assert_eq!(result.diagnostics, Some(serde_json::json!({"attempt": 2})));
    }

    #[tokio::test]
    async fn first_success_stops_early() {
        let probe = Arc::new(Scripted::new(&[false, false, true, true]));
        let config = CheckConfig::default().with_retry_mode(RetryMode::FirstSuccess);
        let result = controller(probe.clone(), config).run(&channel()).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.successes, 1);
        // 1/3 is below the default threshold
        assert_eq!(result.status, ChannelStatus::Unstable);
    }

    #[tokio::test]
    async fn first_attempt_success_is_alive_in_first_success_mode() {
        let probe = Arc::new(Scripted::new(&[true]));
        let config = CheckConfig::default().with_retry_mode(RetryMode::FirstSuccess);
        let result = controller(probe, config).run(&channel()).await;
        assert_eq!(result.attempts, 1);
        assert_eq!(result.status, ChannelStatus::Alive);
    }

    #[tokio::test]
    async fn all_failures_are_dead() {
        let probe = Arc::new(Scripted::new(&[]));
        let result = controller(probe, CheckConfig::default())
            .run(&channel())
            .await;
        assert_eq!(result.status, ChannelStatus::Dead);
        assert_eq!(result.successes, 0);
        assert!(result.diagnostics.is_none());
    }

    #[tokio::test]
    async fn timeout_comes_from_estimator() {
        let probe = Arc::new(Scripted::new(&[true; 10]));
        let config = CheckConfig::default().with_timeout_window(20, 2);
        controller(probe.clone(), config).run(&channel()).await;

        let timeouts = probe.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts[0], Duration::from_secs(10));
        assert_eq!(timeouts[1], Duration::from_secs(10));
        // two 1s samples recorded: 1s mean + 3s buffer, clamped to 3..30
        assert_eq!(timeouts[2], Duration::from_secs(4));
    }

    /// Always succeeds and notes whether the diagnostics file was already
    /// on disk when each attempt started.
    struct FileWatcher {
        path: std::path::PathBuf,
        calls: AtomicUsize,
        seen: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl Probe for FileWatcher {
        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
            self.seen.lock().unwrap().push(self.path.exists());
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            ProbeOutcome::success(
                Duration::from_secs(1),
                Some(serde_json::json!({"attempt": i})),
            )
        }
    }

    #[tokio::test]
    async fn diagnostics_written_once_with_latest_payload() {
        let dir = std::env::temp_dir().join(format!("m3u-retry-{}", uuid::Uuid::new_v4()));
        let writer = DiagnosticsWriter::new(dir.clone());
        let probe = Arc::new(FileWatcher {
            path: writer.path_for(&channel().url),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let config = CheckConfig::default().with_diagnostics_dir(Some(dir.clone()));
        let result = controller_with(probe.clone(), config).run(&channel()).await;

        assert_eq!(result.successes, 10);
        // nothing hits the disk while attempts are still running
        assert_eq!(*probe.seen.lock().unwrap(), vec![false; 10]);
        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(writer.path_for(&channel().url)).await.unwrap())
                .unwrap();
        assert_eq!(written, serde_json::json!({"attempt": 9}));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts_only() {
        let probe = Arc::new(Scripted::new(&[]));
        let config = Arc::new(
            CheckConfig::default()
                .with_retries(4)
                .with_retry_delay(Duration::from_secs(1)),
        );
        let estimator = Arc::new(TimeoutEstimator::from_config(&config));
        let ctl = RetryController::new(probe, estimator, config);

        let started = tokio::time::Instant::now();
        ctl.run(&channel()).await;
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}

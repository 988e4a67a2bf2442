use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::checker::event::CheckEvent;
use crate::checker::report::CheckReport;
use crate::checker::retry::RetryController;
use crate::checker::status::{ChannelResult, ChannelStatus};
use crate::checker::timeout::TimeoutEstimator;
use crate::config::CheckConfig;
use crate::playlist::Channel;
use crate::probe::Probe;

const MIN_BATCH: usize = 10;
const MAX_BATCH: usize = 25;

/// Number of channels per batch for a playlist of `total` channels.
pub fn batch_size(total: usize) -> usize {
    (total / 10).clamp(MIN_BATCH, MAX_BATCH)
}

/// Split `channels` into consecutive batches of at most `size`.
pub fn partition(channels: &[Channel], size: usize) -> Vec<&[Channel]> {
    channels.chunks(size.max(1)).collect()
}

/// Concurrent health checker.
///
/// Channels are processed in batches; inside a batch every channel gets its
/// own task, and a shared semaphore caps how many run at once. The next
/// batch starts only once the current one has fully drained.
#[derive(Clone)]
pub struct Checker {
    pub(crate) config: Arc<CheckConfig>,
    pub(crate) probe: Arc<dyn Probe>,
    pub(crate) estimator: Arc<TimeoutEstimator>,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) events: Option<UnboundedSender<CheckEvent>>,
    pub(crate) in_flight: Arc<AtomicUsize>,
    pub(crate) in_flight_peak: Arc<AtomicUsize>,
}

impl Checker {
    pub fn new(config: CheckConfig, probe: Arc<dyn Probe>) -> Self {
        let estimator = Arc::new(TimeoutEstimator::from_config(&config));
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config: Arc::new(config),
            probe,
            estimator,
            semaphore,
            events: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            in_flight_peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_events(mut self, tx: UnboundedSender<CheckEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn estimator(&self) -> &Arc<TimeoutEstimator> {
        &self.estimator
    }

    /// Highest number of channel tasks observed running at the same time.
    pub fn in_flight_peak(&self) -> usize {
        self.in_flight_peak.load(Ordering::SeqCst)
    }

    /// Check every channel, then retest the UNSTABLE ones when `retest` is set.
    pub async fn run(&self, channels: Vec<Channel>, retest: bool) -> CheckReport {
        let report = self.check(channels).await;
        if retest {
            self.retest(report).await
        } else {
            report
        }
    }

    /// Check every channel once through the retry controller. The report
    /// holds exactly one result per input channel, in input order.
    pub async fn check(&self, channels: Vec<Channel>) -> CheckReport {
        let started_at = Utc::now();
        let total = channels.len();
        let size = batch_size(total);
        let batches = partition(&channels, size);
        let batch_count = batches.len();

        info!(
            total,
            batch_size = size,
            batches = batch_count,
            max_workers = self.config.max_workers,
            "Starting health check"
        );

        let controller = RetryController::new(
            self.probe.clone(),
            self.estimator.clone(),
            self.config.clone(),
        );
        let mut slots: Vec<Option<ChannelResult>> = vec![None; total];
        let mut tally = Tally::default();

        for (batch_index, batch) in batches.iter().enumerate() {
            let offset = batch_index * size;
            let mut set = JoinSet::new();

            for (i, channel) in batch.iter().enumerate() {
                let index = offset + i;
                let channel = channel.clone();
                let controller = controller.clone();
                let semaphore = self.semaphore.clone();
                let in_flight = self.in_flight.clone();
                let peak = self.in_flight_peak.clone();

                set.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (index, ChannelResult::task_failure(channel, "worker pool closed"));
                    };
                    let _guard = InFlight::enter(in_flight, &peak);
                    let result = match AssertUnwindSafe(controller.run(&channel))
                        .catch_unwind()
                        .await
                    {
                        Ok(result) => result,
                        Err(panic) => {
                            let message = panic_message(panic);
                            warn!(channel = %channel.name, error = %message, "Channel task panicked");
                            ChannelResult::task_failure(channel.clone(), message)
                        }
                    };
                    (index, result)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, result)) => {
                        tally.record(result.status);
                        slots[index] = Some(result);
                    }
                    Err(e) => warn!(error = %e, "Channel task failed to join"),
                }
            }

            // A task that vanished without reporting is still accounted for.
            for (i, channel) in batch.iter().enumerate() {
                let slot = &mut slots[offset + i];
                if slot.is_none() {
                    let result = ChannelResult::task_failure(channel.clone(), "channel task aborted");
                    tally.record(result.status);
                    *slot = Some(result);
                }
            }

            let timeout_secs = self.estimator.current().await.as_secs_f64();
            info!(
                "{}/{} checked, {} dead, timeout {:.2}s",
                tally.checked, total, tally.dead, timeout_secs
            );
            self.emit(CheckEvent::BatchCompleted {
                batch: batch_index + 1,
                batches: batch_count,
                checked: tally.checked,
                total,
                alive: tally.alive,
                unstable: tally.unstable,
                dead: tally.dead,
                timeout_secs,
            });
        }

        let results: Vec<ChannelResult> = slots.into_iter().flatten().collect();
        let final_timeout_secs = self.estimator.current().await.as_secs_f64();

        info!(
            total,
            alive = tally.alive,
            unstable = tally.unstable,
            dead = tally.dead,
            "Health check finished"
        );

        CheckReport {
            id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            results,
            batches: batch_count,
            final_timeout_secs,
        }
    }

    pub(crate) fn emit(&self, event: CheckEvent) {
        if let Some(tx) = &self.events {
            // receiver gone: nobody is listening
            let _ = tx.send(event);
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    checked: usize,
    alive: usize,
    unstable: usize,
    dead: usize,
}

impl Tally {
    fn record(&mut self, status: ChannelStatus) {
        self.checked += 1;
        match status {
            ChannelStatus::Alive => self.alive += 1,
            ChannelStatus::Unstable => self.unstable += 1,
            ChannelStatus::Dead => self.dead += 1,
        }
    }
}

/// Tracks the number of running channel tasks for the lifetime of the guard.
pub(crate) struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    pub(crate) fn enter(counter: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("probe panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("probe panicked: {}", s)
    } else {
        "probe panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(n: usize) -> Vec<Channel> {
        (1..=n)
            .map(|i| Channel::new(i, format!("ch{}", i), format!("http://example.com/{}.ts", i)))
            .collect()
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(batch_size(0), 10);
        assert_eq!(batch_size(5), 10);
        assert_eq!(batch_size(150), 15);
        assert_eq!(batch_size(250), 25);
        assert_eq!(batch_size(10_000), 25);
    }

    #[test]
    fn partition_covers_every_channel_once() {
        for total in [0usize, 1, 9, 10, 11, 99, 100, 101, 257, 1000] {
            let list = channels(total);
            let size = batch_size(total);
            let batches = partition(&list, size);
            assert_eq!(batches.len(), total.div_ceil(size), "total {}", total);
            let ids: Vec<usize> = batches.iter().flat_map(|b| b.iter().map(|c| c.id)).collect();
            assert_eq!(ids, (1..=total).collect::<Vec<_>>());
        }
    }

    #[test]
    fn panic_message_extracts_payload() {
        assert_eq!(panic_message(Box::new("boom")), "probe panicked: boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "probe panicked: bang");
        assert_eq!(panic_message(Box::new(42u8)), "probe panicked");
    }

    #[test]
    fn in_flight_guard_tracks_peak() {
        let counter = Arc::new(AtomicUsize::new(0));
        let peak = AtomicUsize::new(0);
        {
            let _a = InFlight::enter(counter.clone(), &peak);
            let _b = InFlight::enter(counter.clone(), &peak);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}

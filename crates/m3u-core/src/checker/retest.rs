use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::checker::event::CheckEvent;
use crate::checker::report::CheckReport;
use crate::checker::retry::persist_diagnostics;
use crate::checker::scheduler::{panic_message, Checker, InFlight};
use crate::checker::status::{ChannelPhase, ChannelResult, ChannelStatus};
use crate::diagnostics::DiagnosticsWriter;

impl Checker {
    /// Give every UNSTABLE channel of `report` one confirmation attempt.
    pub async fn retest(&self, mut report: CheckReport) -> CheckReport {
        report.results = self.retest_results(report.results).await;
        report.finished_at = Utc::now();
        report
    }

    /// Retest the UNSTABLE entries of `results` with the retest timeout.
    ///
    /// A success makes the channel ALIVE, anything else DEAD. ALIVE and DEAD
    /// entries are returned unchanged, in their original positions.
    pub async fn retest_results(&self, mut results: Vec<ChannelResult>) -> Vec<ChannelResult> {
        let candidates: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.phase().can_transition_to(ChannelPhase::Retesting))
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            debug!("No unstable channels to retest");
            self.emit(CheckEvent::RetestCompleted {
                recovered: 0,
                failed: 0,
            });
            return results;
        }

        let timeout = self.config.retest_timeout;
        info!(
            channels = candidates.len(),
            timeout_secs = timeout.as_secs_f64(),
            "Retesting unstable channels"
        );

        let mut set = JoinSet::new();
        for &index in &candidates {
            let url = results[index].channel.url.clone();
            let probe = self.probe.clone();
            let semaphore = self.semaphore.clone();
            let in_flight = self.in_flight.clone();
            let peak = self.in_flight_peak.clone();

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, None);
                };
                let _guard = InFlight::enter(in_flight, &peak);
                match AssertUnwindSafe(probe.probe(&url, timeout))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => (index, Some(Ok(outcome))),
                    Err(panic) => (index, Some(Err(panic_message(panic)))),
                }
            });
        }

        let diagnostics = self.config.diagnostics_dir.clone().map(DiagnosticsWriter::new);
        let mut recovered = 0;
        let mut failed = 0;
        let mut reported = vec![false; results.len()];

        while let Some(joined) = set.join_next().await {
            let (index, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Retest task failed to join");
                    continue;
                }
            };
            reported[index] = true;
            let result = &mut results[index];
            result.attempts += 1;
            result.retested = true;

            match outcome {
                Some(Ok(outcome)) if outcome.succeeded => {
                    result.successes += 1;
                    result.status = ChannelStatus::Alive;
                    if let Some(payload) = outcome.diagnostics {
                        persist_diagnostics(diagnostics.as_ref(), &result.channel, &payload)
                            .await;
                        result.diagnostics = Some(payload);
                    }
                    recovered += 1;
                }
                Some(Ok(_)) => {
                    result.status = ChannelStatus::Dead;
                    failed += 1;
                }
                Some(Err(message)) => {
                    warn!(channel = %result.channel.name, error = %message, "Retest panicked");
                    result.status = ChannelStatus::Dead;
                    result.error = Some(message);
                    failed += 1;
                }
                None => {
                    result.status = ChannelStatus::Dead;
                    result.error = Some("worker pool closed".to_string());
                    failed += 1;
                }
            }
            debug!(channel = %result.channel.name, status = %result.status, "Retest finished");
        }

        for &index in &candidates {
            if !reported[index] {
                let result = &mut results[index];
                result.attempts += 1;
                result.retested = true;
                result.status = ChannelStatus::Dead;
                result.error = Some("retest task aborted".to_string());
                failed += 1;
            }
        }

        info!(recovered, failed, "Retest finished");
        self.emit(CheckEvent::RetestCompleted { recovered, failed });
        results
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checker::status::{ChannelResult, ChannelStatus};

/// Outcome of a whole health-check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per input channel, in input order.
    pub results: Vec<ChannelResult>,
    pub batches: usize,
    /// Adaptive timeout at the end of the run.
    pub final_timeout_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub total: usize,
    pub alive: usize,
    pub unstable: usize,
    pub dead: usize,
    pub retested: usize,
    pub recovered: usize,
}

impl CheckReport {
    pub fn count(&self, status: ChannelStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn with_status(&self, status: ChannelStatus) -> impl Iterator<Item = &ChannelResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    pub fn alive(&self) -> impl Iterator<Item = &ChannelResult> {
        self.with_status(ChannelStatus::Alive)
    }

    pub fn unstable(&self) -> impl Iterator<Item = &ChannelResult> {
        self.with_status(ChannelStatus::Unstable)
    }

    pub fn dead(&self) -> impl Iterator<Item = &ChannelResult> {
        self.with_status(ChannelStatus::Dead)
    }

    /// Channels that were UNSTABLE and came back ALIVE on retest.
    pub fn retested_recovered(&self) -> impl Iterator<Item = &ChannelResult> {
        self.results
            .iter()
            .filter(|r| r.retested && r.status == ChannelStatus::Alive)
    }

    pub fn sorted_by_channel(&self) -> Vec<&ChannelResult> {
        let mut sorted: Vec<&ChannelResult> = self.results.iter().collect();
        sorted.sort_by_key(|r| r.channel.id);
        sorted
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn summary(&self) -> CheckSummary {
        CheckSummary {
            total: self.results.len(),
            alive: self.count(ChannelStatus::Alive),
            unstable: self.count(ChannelStatus::Unstable),
            dead: self.count(ChannelStatus::Dead),
            retested: self.results.iter().filter(|r| r.retested).count(),
            recovered: self.retested_recovered().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::Channel;

    fn report() -> CheckReport {
        let mut recovered = ChannelResult::from_counts(Channel::new(3, "c", "http://c"), 10, 3, 0.7);
        recovered.status = ChannelStatus::Alive;
        recovered.retested = true;
        CheckReport {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![
                recovered,
                ChannelResult::from_counts(Channel::new(1, "a", "http://a"), 10, 10, 0.7),
                ChannelResult::from_counts(Channel::new(2, "b", "http://b"), 10, 0, 0.7),
                ChannelResult::from_counts(Channel::new(4, "d", "http://d"), 10, 4, 0.7),
            ],
            batches: 1,
            final_timeout_secs: 10.0,
        }
    }

    #[test]
    fn summary_counts() {
        let s = report().summary();
        assert_eq!(
            s,
            CheckSummary {
                total: 4,
                alive: 2,
                unstable: 1,
                dead: 1,
                retested: 1,
                recovered: 1,
            }
        );
    }

    #[test]
    fn partitions_are_disjoint() {
        let r = report();
        assert_eq!(r.alive().count() + r.unstable().count() + r.dead().count(), r.results.len());
        assert_eq!(r.retested_recovered().next().unwrap().channel.id, 3);
    }

    #[test]
    fn sorted_by_channel_orders_by_id() {
        let r = report();
        let ids: Vec<usize> = r.sorted_by_channel().iter().map(|r| r.channel.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}

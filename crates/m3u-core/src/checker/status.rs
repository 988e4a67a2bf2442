use std::fmt;

use serde::{Deserialize, Serialize};

use crate::playlist::Channel;

/// Final health classification of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Alive,
    Unstable,
    Dead,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => write!(f, "ALIVE"),
            Self::Unstable => write!(f, "UNSTABLE"),
            Self::Dead => write!(f, "DEAD"),
        }
    }
}

/// Classify a channel from its success ratio.
///
/// `successes / attempts >= threshold` is ALIVE, any other non-zero ratio is
/// UNSTABLE, no success (or no attempt) is DEAD.
pub fn classify(successes: u32, attempts: u32, threshold: f64) -> ChannelStatus {
    if attempts == 0 || successes == 0 {
        return ChannelStatus::Dead;
    }
    // Compare in the multiplied form with a small tolerance so that exact
    // boundaries such as 7/10 against 0.7 land on ALIVE.
    if successes as f64 + 1e-9 >= threshold * attempts as f64 {
        ChannelStatus::Alive
    } else {
        ChannelStatus::Unstable
    }
}

/// Lifecycle of one channel inside a run.
///
/// `Pending -> Probing -> Classified(_)`; a `Classified(Unstable)` channel may
/// go through `Retesting -> Final(Alive | Dead)` once. Alive and Dead
/// classifications are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPhase {
    Pending,
    Probing,
    Classified(ChannelStatus),
    Retesting,
    Final(ChannelStatus),
}

impl ChannelPhase {
    pub fn can_transition_to(self, target: ChannelPhase) -> bool {
        use ChannelStatus::*;
        matches!(
            (self, target),
            (ChannelPhase::Pending, ChannelPhase::Probing)
                | (ChannelPhase::Probing, ChannelPhase::Classified(_))
                | (ChannelPhase::Classified(Unstable), ChannelPhase::Retesting)
                | (ChannelPhase::Retesting, ChannelPhase::Final(Alive | Dead))
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelPhase::Classified(ChannelStatus::Alive | ChannelStatus::Dead)
                | ChannelPhase::Final(_)
        )
    }
}

/// Aggregated outcome of all attempts against one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: Channel,
    pub status: ChannelStatus,
    pub attempts: u32,
    pub successes: u32,
    /// Whether the status came out of the retest pass.
    #[serde(default)]
    pub retested: bool,
    /// Set when the channel's task failed unexpectedly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

impl ChannelResult {
    /// Build a classified result. Counts are normalised so that
    /// `1 <= attempts` and `successes <= attempts` always hold.
    pub fn from_counts(channel: Channel, attempts: u32, successes: u32, threshold: f64) -> Self {
        let attempts = attempts.max(1);
        let successes = successes.min(attempts);
        Self {
            status: classify(successes, attempts, threshold),
            channel,
            attempts,
            successes,
            retested: false,
            error: None,
            diagnostics: None,
        }
    }

    /// A DEAD result for a channel whose task failed before reporting.
    pub fn task_failure(channel: Channel, message: impl Into<String>) -> Self {
        Self {
            channel,
            status: ChannelStatus::Dead,
            attempts: 1,
            successes: 0,
            retested: false,
            error: Some(message.into()),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Option<serde_json::Value>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn ratio(&self) -> f64 {
        self.successes as f64 / self.attempts.max(1) as f64
    }

    pub fn phase(&self) -> ChannelPhase {
        if self.retested {
            ChannelPhase::Final(self.status)
        } else {
            ChannelPhase::Classified(self.status)
        }
    }
}

pub mod event;
pub mod report;
mod retest;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod timeout;

pub use event::CheckEvent;
pub use report::{CheckReport, CheckSummary};
pub use retry::RetryController;
pub use scheduler::{batch_size, partition, Checker};
pub use status::{classify, ChannelPhase, ChannelResult, ChannelStatus};
pub use timeout::TimeoutEstimator;

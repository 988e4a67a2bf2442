#![forbid(unsafe_code)]

pub mod checker;
pub mod config;
pub mod diagnostics;
pub mod filter;
pub mod output;
pub mod playlist;
pub mod probe;
pub mod source;

pub use checker::{
    classify, CheckEvent, CheckReport, CheckSummary, ChannelPhase, ChannelResult, ChannelStatus,
    Checker, RetryController, TimeoutEstimator,
};
pub use config::{CheckConfig, RetryMode};
pub use diagnostics::{DiagnosticsError, DiagnosticsWriter};
pub use filter::filter_channels;
pub use output::{write_outputs, OutputError, OutputFiles};
pub use playlist::{parse_playlist, render_playlist, Channel, PlaylistError};
pub use probe::{FfprobeProbe, HttpProbe, Probe, ProbeKind, ProbeOutcome};
pub use source::{load_channels, HttpSource, PlaylistSource, SourceError};

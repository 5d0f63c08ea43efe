//! Statistics for sinks

pub mod metrics;

pub use metrics::{SinkStats, SinkStatsSnapshot};

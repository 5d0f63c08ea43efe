//! Media source configuration

use std::time::Duration;

use crate::ring::RingConfig;

/// Default delay before a source without readers is reported idle
pub const DEFAULT_NONE_READER_DELAY: Duration = Duration::from_millis(5000);

/// Per-source configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Grace period a source must spend without readers before the
    /// "no readers" notification fires
    pub none_reader_delay: Duration,

    /// Retention policy of the source's ring
    pub ring: RingConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            none_reader_delay: DEFAULT_NONE_READER_DELAY,
            ring: RingConfig::default(),
        }
    }
}

impl SourceConfig {
    /// Set the grace period
    pub fn none_reader_delay(mut self, delay: Duration) -> Self {
        self.none_reader_delay = delay;
        self
    }

    /// Set the ring retention policy
    pub fn ring(mut self, ring: RingConfig) -> Self {
        self.ring = ring;
        self
    }
}

//! Ring configuration

/// Default number of slots for a bounded ring
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// Retention policy of a broadcast ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Maximum retained items; `None` keeps everything a reader has not consumed yet
    pub capacity: Option<usize>,

    /// Start new readers at the most recent key point instead of the head
    pub cache_gop: bool,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_RING_CAPACITY),
            cache_gop: true,
        }
    }
}

impl RingConfig {
    /// Bounded ring dropping the oldest items beyond `capacity`
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Default::default()
        }
    }

    /// Ring that never drops unread items
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            ..Default::default()
        }
    }

    /// Enable or disable starting new readers at the last key point
    pub fn cache_gop(mut self, enabled: bool) -> Self {
        self.cache_gop = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RingConfig::default();
        assert_eq!(config.capacity, Some(DEFAULT_RING_CAPACITY));
        assert!(config.cache_gop);
    }

    #[test]
    fn test_bounded_minimum_capacity() {
        assert_eq!(RingConfig::bounded(0).capacity, Some(1));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RingConfig::unbounded().cache_gop(false);
        assert_eq!(config.capacity, None);
        assert!(!config.cache_gop);
    }
}

//! Per-sink counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters a sink updates on every frame
///
/// Lock-free so readers on other threads can sample them while the writer
/// is active.
#[derive(Debug, Default)]
pub struct SinkStats {
    frames: AtomicU64,
    bytes: AtomicU64,
    rejected: AtomicU64,
    packets: AtomicU64,
}

impl SinkStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame was accepted
    pub fn record_frame(&self, bytes: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A frame was refused
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Packets published to the sink's ring
    pub fn record_packets(&self, count: usize) {
        self.packets.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            frames: self.frames(),
            bytes: self.bytes(),
            rejected: self.rejected(),
            packets: self.packets(),
        }
    }
}

/// Plain copy of [`SinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub frames: u64,
    pub bytes: u64,
    pub rejected: u64,
    pub packets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_stats_new() {
        let stats = SinkStats::new();
        assert_eq!(stats.snapshot(), SinkStatsSnapshot::default());
    }

    #[test]
    fn test_sink_stats_counting() {
        let stats = SinkStats::new();
        stats.record_frame(100);
        stats.record_frame(50);
        stats.record_rejected();
        stats.record_packets(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.bytes, 150);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.packets, 3);
    }
}

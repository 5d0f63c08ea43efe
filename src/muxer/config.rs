//! Muxer configuration

use crate::sink::RecordConfig;
use crate::source::SourceConfig;

/// Which sinks a muxer builds and how
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Stream length in seconds, `0.0` for live
    pub duration: f32,

    /// Publish over RTSP
    pub enable_rtsp: bool,

    /// Publish over RTMP
    pub enable_rtmp: bool,

    /// Settings shared by the protocol sources
    pub source: SourceConfig,

    /// Recorder settings
    pub record: RecordConfig,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            duration: 0.0,
            enable_rtsp: true,
            enable_rtmp: true,
            source: SourceConfig::default(),
            record: RecordConfig::default(),
        }
    }
}

impl MuxerConfig {
    /// Set stream duration in seconds
    pub fn duration(mut self, duration: f32) -> Self {
        self.duration = duration;
        self
    }

    pub fn enable_rtsp(mut self, enabled: bool) -> Self {
        self.enable_rtsp = enabled;
        self
    }

    pub fn enable_rtmp(mut self, enabled: bool) -> Self {
        self.enable_rtmp = enabled;
        self
    }

    pub fn source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    pub fn record(mut self, record: RecordConfig) -> Self {
        self.record = record;
        self
    }
}

//! Frame, track and stream identity types
//!
//! These are the units the producer hands to the fan-out muxer. A frame is
//! immutable once handed off and is shared by every sink through `Arc`.

use std::sync::Arc;

use bytes::Bytes;

/// Unique identifier for a stream (vhost + app + stream name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    /// Virtual host (e.g., "__defaultVhost__")
    pub vhost: String,
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name (e.g., "camera01")
    pub stream: String,
}

impl SourceKey {
    /// Create a new source key
    pub fn new(vhost: impl Into<String>, app: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            vhost: vhost.into(),
            app: app.into(),
            stream: stream.into(),
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.vhost, self.app, self.stream)
    }
}

/// Delivery protocol a media source speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    Rtsp,
    Rtmp,
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schema::Rtsp => f.write_str("rtsp"),
            Schema::Rtmp => f.write_str("rtmp"),
        }
    }
}

/// Kind of elementary stream carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackType {
    Video,
    Audio,
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackType::Video => f.write_str("video"),
            TrackType::Audio => f.write_str("audio"),
        }
    }
}

/// Codec of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264,
    H265,
    Aac,
    /// G.711 A-law
    G711A,
    /// G.711 mu-law
    G711U,
    Opus,
}

impl CodecId {
    /// Track type this codec belongs to
    pub fn track_type(&self) -> TrackType {
        match self {
            CodecId::H264 | CodecId::H265 => TrackType::Video,
            CodecId::Aac | CodecId::G711A | CodecId::G711U | CodecId::Opus => TrackType::Audio,
        }
    }

    /// Default RTP clock rate in Hz
    pub fn clock_rate(&self) -> u32 {
        match self {
            CodecId::H264 | CodecId::H265 => 90_000,
            CodecId::Aac => 44_100,
            CodecId::G711A | CodecId::G711U => 8_000,
            CodecId::Opus => 48_000,
        }
    }

    /// Encoding name as used in SDP `a=rtpmap`
    pub fn encoding_name(&self) -> &'static str {
        match self {
            CodecId::H264 => "H264",
            CodecId::H265 => "H265",
            CodecId::Aac => "mpeg4-generic",
            CodecId::G711A => "PCMA",
            CodecId::G711U => "PCMU",
            CodecId::Opus => "opus",
        }
    }
}

/// Description of one elementary stream announced by the producer
#[derive(Debug, Clone)]
pub struct Track {
    /// Video or audio
    pub track_type: TrackType,
    /// Codec
    pub codec: CodecId,
    /// Decoder configuration record (SPS/PPS, AudioSpecificConfig), may be empty
    pub config: Bytes,
    /// Sample clock in Hz
    pub clock_rate: u32,
}

impl Track {
    /// Create a track with the codec's default clock rate and no config record
    pub fn new(codec: CodecId) -> Self {
        Self {
            track_type: codec.track_type(),
            codec,
            config: Bytes::new(),
            clock_rate: codec.clock_rate(),
        }
    }

    /// Attach a decoder configuration record
    pub fn with_config(mut self, config: Bytes) -> Self {
        self.config = config;
        self
    }

    /// Override the sample clock
    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = clock_rate;
        self
    }
}

/// One unit of encoded media
///
/// Cheap to share: the payload is reference counted and frames travel as
/// [`FramePtr`].
#[derive(Debug, Clone)]
pub struct Frame {
    /// Track this frame belongs to
    pub track_type: TrackType,
    /// Codec of the payload
    pub codec: CodecId,
    /// Decode timestamp in milliseconds
    pub dts: u32,
    /// Presentation timestamp in milliseconds
    pub pts: u32,
    /// Encoded payload
    pub data: Bytes,
    /// Whether a decoder can start from this frame
    pub key_frame: bool,
    /// Whether this frame carries decoder configuration (SPS/PPS etc.)
    pub config_frame: bool,
}

/// Shared frame handle passed through the fan-out
pub type FramePtr = Arc<Frame>;

impl Frame {
    /// Create a video frame
    pub fn video(codec: CodecId, dts: u32, pts: u32, data: Bytes, key_frame: bool) -> Self {
        Self {
            track_type: TrackType::Video,
            codec,
            dts,
            pts,
            data,
            key_frame,
            config_frame: false,
        }
    }

    /// Create an audio frame
    pub fn audio(codec: CodecId, timestamp: u32, data: Bytes) -> Self {
        Self {
            track_type: TrackType::Audio,
            codec,
            dts: timestamp,
            pts: timestamp,
            data,
            key_frame: false,
            config_frame: false,
        }
    }

    /// Mark as an in-band decoder configuration frame (SPS/PPS etc.)
    ///
    /// FLV outputs drop these since the track's config record already
    /// goes out as a sequence header; RTP carries them in-band.
    pub fn into_config(mut self) -> Self {
        self.config_frame = true;
        self
    }

    /// Composition time offset (pts - dts) in milliseconds
    pub fn composition_offset(&self) -> i32 {
        self.pts.wrapping_sub(self.dts) as i32
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Wrap into a shared handle
    pub fn into_ptr(self) -> FramePtr {
        Arc::new(self)
    }
}

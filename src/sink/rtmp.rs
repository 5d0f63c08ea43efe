//! RTMP sink: frames to FLV tag bodies
//!
//! RTMP audio/video messages carry FLV tag bodies, so the sink muxes each
//! frame with the FLV helpers and publishes the result. The metadata
//! descriptor mirrors the `onMetaData` fields a player needs before the
//! first frame:
//!
//! ```text
//! duration=0.00
//! videocodecid=7
//! audiocodecid=10
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::media::flv::{self, FlvTag};
use crate::media::{FramePtr, Schema, SourceKey, Track, TrackType};
use crate::source::{
    DescriptorError, MediaPacket, MediaSource, MediaSourceEvent, ReaderCounter, SessionDescriptor,
    SourceConfig, SourceRegistry,
};
use crate::stats::SinkStats;

use super::{FrameWriter, ProtocolSink, SinkError};

/// One RTMP media message
#[derive(Debug, Clone)]
pub struct RtmpPacket {
    pub track_type: TrackType,
    pub tag: FlvTag,
}

impl RtmpPacket {
    pub fn new(track_type: TrackType, tag: FlvTag) -> Self {
        Self { track_type, tag }
    }

    /// Whether this is a decoder configuration message
    pub fn is_sequence_header(&self) -> bool {
        self.tag.is_sequence_header()
    }
}

impl MediaPacket for RtmpPacket {
    type Descriptor = FlvMetadata;

    fn track_type(&self) -> TrackType {
        self.track_type
    }

    fn timestamp(&self) -> u32 {
        self.tag.timestamp
    }
}

/// Stream metadata published alongside RTMP packets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlvMetadata {
    /// Seconds, `0.0` for live
    pub duration: f32,
    pub video_codec_id: Option<u8>,
    pub audio_codec_id: Option<u8>,
}

impl FlvMetadata {
    /// Render as `key=value` lines
    pub fn render(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "duration={:.2}", self.duration);
        if let Some(id) = self.video_codec_id {
            let _ = writeln!(text, "videocodecid={}", id);
        }
        if let Some(id) = self.audio_codec_id {
            let _ = writeln!(text, "audiocodecid={}", id);
        }
        text
    }
}

impl SessionDescriptor for FlvMetadata {
    fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut metadata = FlvMetadata::default();
        let mut has_duration = false;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| DescriptorError::new(format!("Malformed metadata line: {}", line)))?;
            let invalid = || DescriptorError::new(format!("Invalid {}: {}", key, value));
            match key {
                "duration" => {
                    metadata.duration = value.parse().map_err(|_| invalid())?;
                    has_duration = true;
                }
                "videocodecid" => metadata.video_codec_id = Some(value.parse().map_err(|_| invalid())?),
                "audiocodecid" => metadata.audio_codec_id = Some(value.parse().map_err(|_| invalid())?),
                _ => {}
            }
        }

        if !has_duration {
            return Err(DescriptorError::new("Metadata without duration"));
        }
        Ok(metadata)
    }

    fn track_types(&self) -> Vec<TrackType> {
        let mut types = Vec::new();
        if self.video_codec_id.is_some() {
            types.push(TrackType::Video);
        }
        if self.audio_codec_id.is_some() {
            types.push(TrackType::Audio);
        }
        types
    }
}

struct RtmpTracks {
    tracks: BTreeMap<TrackType, Track>,
    headers: BTreeMap<TrackType, RtmpPacket>,
}

/// Muxes frames to FLV bodies and publishes them on an RTMP media source
pub struct RtmpSink {
    source: Arc<MediaSource<RtmpPacket>>,
    duration: f32,
    state: Mutex<RtmpTracks>,
    stats: SinkStats,
}

impl RtmpSink {
    /// Create a sink; `duration` in seconds, `0.0` for live
    pub fn new(
        key: SourceKey,
        duration: f32,
        config: SourceConfig,
        registry: Option<Arc<SourceRegistry>>,
    ) -> Self {
        Self {
            source: MediaSource::new(Schema::Rtmp, key, config, registry),
            duration,
            state: Mutex::new(RtmpTracks {
                tracks: BTreeMap::new(),
                headers: BTreeMap::new(),
            }),
            stats: SinkStats::new(),
        }
    }

    pub fn source(&self) -> &Arc<MediaSource<RtmpPacket>> {
        &self.source
    }

    /// Sequence headers of the declared tracks
    ///
    /// A player joining at a key frame has missed them on the ring and must
    /// be sent these first.
    pub fn sequence_headers(&self) -> Vec<RtmpPacket> {
        self.state.lock().headers.values().cloned().collect()
    }

    /// Metadata currently published
    pub fn metadata(&self) -> Option<FlvMetadata> {
        self.source.with_descriptor(FlvMetadata::clone)
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

impl FrameWriter for RtmpSink {
    fn add_track(&self, track: &Track) -> Result<(), SinkError> {
        let codec_id = match track.track_type {
            TrackType::Video => flv::video_codec_id(track.codec),
            TrackType::Audio => flv::audio_sound_format(track.codec),
        };
        if codec_id.is_none() {
            return Err(SinkError::UnsupportedCodec(track.codec));
        }

        let (metadata, header) = {
            let mut state = self.state.lock();
            state.tracks.insert(track.track_type, track.clone());

            let header = flv::sequence_header(track).map(|tag| RtmpPacket::new(track.track_type, tag));
            match &header {
                Some(packet) => state.headers.insert(track.track_type, packet.clone()),
                None => state.headers.remove(&track.track_type),
            };

            let metadata = FlvMetadata {
                duration: self.duration,
                video_codec_id: state
                    .tracks
                    .get(&TrackType::Video)
                    .and_then(|t| flv::video_codec_id(t.codec)),
                audio_codec_id: state
                    .tracks
                    .get(&TrackType::Audio)
                    .and_then(|t| flv::audio_sound_format(t.codec)),
            };
            (metadata, header)
        };

        self.source.set_track_info(&metadata.render())?;
        if let Some(header) = header {
            self.source.write(header, false);
        }
        tracing::debug!(
            stream = %self.source.key(),
            track = %track.track_type,
            codec = ?track.codec,
            "RTMP track added"
        );
        Ok(())
    }

    fn input_frame(&self, frame: &FramePtr) -> Result<(), SinkError> {
        if !self.state.lock().tracks.contains_key(&frame.track_type) {
            self.stats.record_rejected();
            return Err(SinkError::UnknownTrack(frame.track_type));
        }

        if frame.config_frame {
            tracing::trace!(stream = %self.source.key(), "Skipping in-band config frame");
            return Ok(());
        }

        let body = match flv::frame_tag_body(frame) {
            Some(body) => body,
            None => {
                self.stats.record_rejected();
                return Err(SinkError::UnsupportedCodec(frame.codec));
            }
        };

        let tag = match frame.track_type {
            TrackType::Video => FlvTag::video(frame.dts, body),
            TrackType::Audio => FlvTag::audio(frame.dts, body),
        };
        self.stats.record_frame(frame.size());
        self.stats.record_packets(1);

        let key_frame = frame.track_type == TrackType::Video && frame.key_frame;
        self.source.write(RtmpPacket::new(frame.track_type, tag), key_frame);
        Ok(())
    }
}

impl ProtocolSink for RtmpSink {
    fn reader_count(&self) -> usize {
        self.source.reader_count()
    }

    fn set_listener(&self, listener: Weak<dyn MediaSourceEvent>) {
        self.source.set_listener(listener);
    }

    fn set_reader_counter(&self, counter: Weak<dyn ReaderCounter>) {
        self.source.set_reader_counter(counter);
    }

    fn set_timestamp(&self, timestamp: u32) {
        self.source.set_timestamp(timestamp);
    }
}

//! RTSP sink: frames to RTP packets

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::media::{sdp, FramePtr, RtpPacket, RtpPacketizer, Schema, SourceKey, Track, TrackType};
use crate::source::{MediaSource, MediaSourceEvent, ReaderCounter, SourceConfig, SourceRegistry};
use crate::stats::SinkStats;

use super::{FrameWriter, ProtocolSink, SinkError};

struct RtspTrack {
    track: Track,
    packetizer: RtpPacketizer,
}

/// Packetizes frames to RTP and publishes them on an RTSP media source
///
/// The source's descriptor is the SDP of all declared tracks and is
/// rebuilt whenever a track is declared.
pub struct RtspSink {
    source: Arc<MediaSource<RtpPacket>>,
    duration: f32,
    tracks: Mutex<BTreeMap<TrackType, RtspTrack>>,
    stats: SinkStats,
}

impl RtspSink {
    /// Create a sink; `duration` in seconds, `0.0` for live
    pub fn new(
        key: SourceKey,
        duration: f32,
        config: SourceConfig,
        registry: Option<Arc<SourceRegistry>>,
    ) -> Self {
        Self {
            source: MediaSource::new(Schema::Rtsp, key, config, registry),
            duration,
            tracks: Mutex::new(BTreeMap::new()),
            stats: SinkStats::new(),
        }
    }

    /// The underlying media source
    pub fn source(&self) -> &Arc<MediaSource<RtpPacket>> {
        &self.source
    }

    /// Current SDP, once a track has been declared
    pub fn sdp(&self) -> Option<String> {
        self.source.track_info()
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

/// Stable SSRC per stream and track
fn ssrc_for(key: &SourceKey, track_type: TrackType) -> u32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    track_type.hash(&mut hasher);
    hasher.finish() as u32
}

impl FrameWriter for RtspSink {
    fn add_track(&self, track: &Track) -> Result<(), SinkError> {
        let sdp = {
            let mut tracks = self.tracks.lock();
            let ssrc = ssrc_for(self.source.key(), track.track_type);
            let mut packetizer = RtpPacketizer::new(track, sdp::payload_type(track.codec), ssrc);
            // Readers must not see the sequence restart on a re-declaration
            if let Some(previous) = tracks.get(&track.track_type) {
                packetizer = packetizer.with_sequence(previous.packetizer.next_sequence());
                tracing::debug!(stream = %self.source.key(), track = %track.track_type, "RTSP track replaced");
            }
            tracks.insert(
                track.track_type,
                RtspTrack {
                    track: track.clone(),
                    packetizer,
                },
            );

            let declared: Vec<Track> = tracks.values().map(|t| t.track.clone()).collect();
            sdp::build(self.duration, &declared)
        };

        self.source.set_track_info(&sdp)?;
        tracing::debug!(
            stream = %self.source.key(),
            track = %track.track_type,
            codec = ?track.codec,
            "RTSP track added"
        );
        Ok(())
    }

    fn input_frame(&self, frame: &FramePtr) -> Result<(), SinkError> {
        let packets = {
            let mut tracks = self.tracks.lock();
            match tracks.get_mut(&frame.track_type) {
                Some(entry) => entry.packetizer.packetize(frame),
                None => {
                    self.stats.record_rejected();
                    return Err(SinkError::UnknownTrack(frame.track_type));
                }
            }
        };

        self.stats.record_frame(frame.size());
        self.stats.record_packets(packets.len());

        // Only the first packet of a key frame is a valid join point
        let key_frame = frame.track_type == TrackType::Video && frame.key_frame;
        for (index, packet) in packets.into_iter().enumerate() {
            self.source.write(packet, key_frame && index == 0);
        }
        Ok(())
    }
}

impl ProtocolSink for RtspSink {
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

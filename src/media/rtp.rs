//! RTP packets and frame packetization
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```
//!
//! Payload formats (FU-A, AU headers) are left to the payload bytes handed
//! in; the packetizer only splits on the MTU and numbers the packets.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{Frame, Track, TrackType};
use super::sdp::Sdp;
use crate::source::MediaPacket;

/// RTP fixed header size
pub const RTP_HEADER_SIZE: usize = 12;

/// Default maximum payload per packet
pub const DEFAULT_MTU: usize = 1400;

/// A single RTP packet
#[derive(Debug, Clone)]
pub struct RtpPacket {
    /// Track this packet belongs to
    pub track_type: TrackType,
    /// RTP payload type
    pub payload_type: u8,
    /// Sequence number
    pub sequence: u16,
    /// Timestamp in the track's clock rate
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Marker bit (last packet of a frame)
    pub marker: bool,
    /// Payload
    pub payload: Bytes,
}

impl RtpPacket {
    /// Serialize header + payload
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + self.payload.len());
        buf.put_u8(0x80); // V=2
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Size on the wire
    pub fn size(&self) -> usize {
        RTP_HEADER_SIZE + self.payload.len()
    }
}

impl MediaPacket for RtpPacket {
    type Descriptor = Sdp;

    fn track_type(&self) -> TrackType {
        self.track_type
    }

    fn timestamp(&self) -> u32 {
        self.timestamp
    }

    fn sequence(&self) -> u16 {
        self.sequence
    }

    fn ssrc(&self) -> u32 {
        self.ssrc
    }
}

/// Splits frames of one track into RTP packets
#[derive(Debug)]
pub struct RtpPacketizer {
    track_type: TrackType,
    payload_type: u8,
    clock_rate: u32,
    ssrc: u32,
    sequence: u16,
    mtu: usize,
}

impl RtpPacketizer {
    /// Create a packetizer for a track
    pub fn new(track: &Track, payload_type: u8, ssrc: u32) -> Self {
        Self {
            track_type: track.track_type,
            payload_type,
            clock_rate: track.clock_rate,
            ssrc,
            sequence: 0,
            mtu: DEFAULT_MTU,
        }
    }

    /// Set the maximum payload per packet
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(1);
        self
    }

    /// Continue numbering from `sequence`
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Next sequence number to be assigned
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Convert a millisecond timestamp to the track clock
    pub fn rtp_timestamp(&self, ms: u32) -> u32 {
        (ms as u64 * self.clock_rate as u64 / 1000) as u32
    }

    /// Split a frame into packets; the last one carries the marker bit
    ///
    /// An empty frame still produces one (empty) packet so the frame
    /// boundary survives.
    pub fn packetize(&mut self, frame: &Frame) -> Vec<RtpPacket> {
        let timestamp = self.rtp_timestamp(frame.pts);
        let chunks: Vec<Bytes> = if frame.data.is_empty() {
            vec![Bytes::new()]
        } else {
            (0..frame.data.len())
                .step_by(self.mtu)
                .map(|start| frame.data.slice(start..(start + self.mtu).min(frame.data.len())))
                .collect()
        };

        let last = chunks.len() - 1;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let sequence = self.sequence;
                self.sequence = self.sequence.wrapping_add(1);
                RtpPacket {
                    track_type: self.track_type,
                    payload_type: self.payload_type,
                    sequence,
                    timestamp,
                    ssrc: self.ssrc,
                    marker: i == last,
                    payload,
                }
            })
            .collect()
    }
}

//! Packet and session descriptor contracts, per-track state

use crate::media::TrackType;

use super::error::DescriptorError;

/// Protocol metadata a media source tracks per track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackState {
    /// Latest sequence number written
    pub sequence: u16,
    /// Latest timestamp written
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
}

/// Textual per-stream description of the available tracks
///
/// The format belongs to the protocol (SDP for RTSP, `onMetaData` for
/// RTMP); the source only needs to know which tracks it describes.
pub trait SessionDescriptor: Sized + Send + Sync + 'static {
    /// Parse the textual form
    fn parse(text: &str) -> Result<Self, DescriptorError>;

    /// Tracks described, in descriptor order
    fn track_types(&self) -> Vec<TrackType>;
}

/// A protocol packet a media source can publish
pub trait MediaPacket: Send + Sync + 'static {
    /// Descriptor format of the protocol this packet belongs to
    type Descriptor: SessionDescriptor;

    fn track_type(&self) -> TrackType;

    fn timestamp(&self) -> u32;

    fn sequence(&self) -> u16 {
        0
    }

    fn ssrc(&self) -> u32 {
        0
    }
}

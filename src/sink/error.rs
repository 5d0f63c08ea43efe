//! Sink error types

use crate::media::{CodecId, TrackType};
use crate::source::DescriptorError;

/// Error raised by a single sink while accepting a track or a frame
///
/// These never leave the fan-out muxer: it logs them and carries on with
/// the remaining sinks.
#[derive(Debug)]
pub enum SinkError {
    /// Frame for a track that was never announced
    UnknownTrack(TrackType),
    /// The sink's protocol or container cannot carry this codec
    UnsupportedCodec(CodecId),
    /// The generated session descriptor was rejected
    Descriptor(DescriptorError),
    /// Writing to storage failed
    Io(std::io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::UnknownTrack(track) => write!(f, "No {} track announced", track),
            SinkError::UnsupportedCodec(codec) => write!(f, "Unsupported codec: {:?}", codec),
            SinkError::Descriptor(e) => write!(f, "{}", e),
            SinkError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Descriptor(e) => Some(e),
            SinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<DescriptorError> for SinkError {
    fn from(e: DescriptorError) -> Self {
        SinkError::Descriptor(e)
    }
}

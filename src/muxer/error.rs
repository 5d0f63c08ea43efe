//! Muxer error types

use crate::media::{Schema, SourceKey};
use crate::sink::SinkError;

/// Error building a muxer
#[derive(Debug)]
pub enum MuxerError {
    /// A live source already publishes this stream over the protocol
    AlreadyRegistered(Schema, SourceKey),
    /// The recorder could not be set up
    Recorder(SinkError),
}

impl std::fmt::Display for MuxerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuxerError::AlreadyRegistered(schema, key) => {
                write!(f, "Stream already published over {}: {}", schema, key)
            }
            MuxerError::Recorder(e) => write!(f, "Recorder setup failed: {}", e),
        }
    }
}

impl std::error::Error for MuxerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MuxerError::Recorder(e) => Some(e),
            MuxerError::AlreadyRegistered(..) => None,
        }
    }
}

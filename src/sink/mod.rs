//! Output sinks of the fan-out muxer
//!
//! Every sink accepts the same frame stream and converts it into one
//! output form:
//!
//! ```text
//!                 ┌───────────────┐   RtpPacket    ┌─────────────┐
//!            ┌───►│   RtspSink    │───────────────►│ MediaSource │──► RTSP players
//!            │    └───────────────┘                └─────────────┘
//!  FramePtr  │    ┌───────────────┐   RtmpPacket   ┌─────────────┐
//!  ──────────┼───►│   RtmpSink    │───────────────►│ MediaSource │──► RTMP players
//!            │    └───────────────┘                └─────────────┘
//!            │    ┌───────────────┐
//!            └───►│ MediaRecorder │──► FLV files
//!                 └───────────────┘
//! ```
//!
//! Protocol sinks publish through a [`MediaSource`](crate::source::MediaSource)
//! and so also have readers and listeners; the recorder only writes.

pub mod error;
pub mod recorder;
pub mod rtmp;
pub mod rtsp;

use std::sync::Weak;

use crate::media::{FramePtr, Track};
use crate::source::{MediaSourceEvent, ReaderCounter};

pub use error::SinkError;
pub use recorder::{MediaRecorder, RecordConfig};
pub use rtmp::{FlvMetadata, RtmpPacket, RtmpSink};
pub use rtsp::RtspSink;

/// Accepts track declarations and frames
pub trait FrameWriter: Send + Sync {
    /// Declare a track; must precede frames of that track
    ///
    /// Declaring a track type again replaces the earlier declaration.
    fn add_track(&self, track: &Track) -> Result<(), SinkError>;

    /// Accept one frame
    fn input_frame(&self, frame: &FramePtr) -> Result<(), SinkError>;
}

/// A sink that publishes to readers through a media source
pub trait ProtocolSink: FrameWriter {
    /// Readers currently attached to the sink's source
    fn reader_count(&self) -> usize;

    /// Register the listener for the sink's source events
    fn set_listener(&self, listener: Weak<dyn MediaSourceEvent>);

    /// Register the provider of the aggregate reader count
    fn set_reader_counter(&self, counter: Weak<dyn ReaderCounter>);

    /// Overwrite the timestamp of every track
    fn set_timestamp(&self, timestamp: u32);
}

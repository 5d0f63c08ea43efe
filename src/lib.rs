//! Live stream fan-out core
//!
//! One producer writes frames of a live stream into a [`FanoutMuxer`]; the
//! muxer converts them for every enabled output (RTSP, RTMP, FLV recording)
//! and each protocol output republishes its packets on a broadcast ring
//! that any number of readers consume at their own pace.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use stream_fanout::media::{CodecId, Frame, SourceKey, Track};
//! use stream_fanout::{FanoutMuxer, MuxerConfig, SourceRegistry};
//!
//! let registry = Arc::new(SourceRegistry::new());
//! let key = SourceKey::new("__defaultVhost__", "live", "cam01");
//! let muxer = FanoutMuxer::new(key, MuxerConfig::default(), registry)?;
//!
//! muxer.add_track(&Track::new(CodecId::H264));
//! muxer.input_frame(&Frame::video(CodecId::H264, 0, 0, Bytes::from_static(&[0x65]), true).into_ptr());
//! # Ok::<(), stream_fanout::MuxerError>(())
//! ```

pub mod media;
pub mod muxer;
pub mod ring;
pub mod sink;
pub mod source;
pub mod stats;

pub use muxer::{FanoutMuxer, MuxerConfig, MuxerError};
pub use ring::{RingBuffer, RingConfig, RingReader};
pub use sink::{FrameWriter, ProtocolSink, RecordConfig, SinkError};
pub use source::{MediaSource, MediaSourceEvent, SourceConfig, SourceRegistry};

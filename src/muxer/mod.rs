//! Fan-out muxer
//!
//! The muxer is what a producer writes a stream into. It owns one sink per
//! enabled output and is the aggregate reader counter of its protocol
//! sources, so idle detection considers readers on every protocol:
//!
//! ```text
//!                       Arc<FanoutMuxer>
//!                 ┌──────────────────────────┐
//!   add_track ──► │ rtsp:     Option<Sink>   │ ──► RTSP MediaSource ─┐
//!   input_frame   │ rtmp:     Option<Sink>   │ ──► RTMP MediaSource ─┤
//!                 │ recorder: MediaRecorder  │ ──► FLV files         │
//!                 └────────────▲─────────────┘                       │
//!                              │  Weak<dyn ReaderCounter>            │
//!                              └─────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fanout;

pub use config::MuxerConfig;
pub use error::MuxerError;
pub use fanout::FanoutMuxer;

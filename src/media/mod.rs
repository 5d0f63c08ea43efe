//! Media types and wire formats
//!
//! This module provides:
//! - Frames, tracks and stream identity handed over by the producer
//! - FLV tag bodies and files (RTMP sink, recorder)
//! - RTP packets and packetization (RTSP sink)
//! - SDP generation and parsing (RTSP session descriptor)

pub mod flv;
pub mod frame;
pub mod rtp;
pub mod sdp;

pub use flv::{FlvTag, FlvTagType};
pub use frame::{CodecId, Frame, FramePtr, Schema, SourceKey, Track, TrackType};
pub use rtp::{RtpPacket, RtpPacketizer};
pub use sdp::Sdp;

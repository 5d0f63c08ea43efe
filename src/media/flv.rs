//! FLV tag bodies and files
//!
//! RTMP audio/video messages are FLV tag bodies without the 11-byte tag
//! header, so the same muxing serves the RTMP sink and the FLV recorder.
//!
//! Video tag body (AVC/HEVC):
//! ```text
//! +----------+----------+-------------+---------------+---------
//! | FrameType| CodecID  | PacketType  | CompTime (24) | NALUs...
//! | (4 bits) | (4 bits) | (8 bits)    | (signed, ms)  |
//! +----------+----------+-------------+---------------+---------
//! ```
//!
//! Audio tag body:
//! ```text
//! +-----------+----------+----------+----------+-------------------
//! |SoundFormat|SoundRate |SoundSize |SoundType | [AACPacketType] data
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  |
//! +-----------+----------+----------+----------+-------------------
//! ```
//!
//! File layout:
//! ```text
//! +============+==================+==============+==================+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1 ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+
//! ```

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{CodecId, Frame, Track, TrackType};

/// FLV file signature: "FLV" in ASCII
const FLV_SIGNATURE: [u8; 3] = [0x46, 0x4C, 0x56];

/// FLV header is always 9 bytes
const FLV_HEADER_SIZE: u32 = 9;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    /// Tag type code used in the FLV tag header
    pub fn code(&self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

/// An FLV tag (header fields + body)
#[derive(Debug, Clone)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Tag body (including codec headers)
    pub data: Bytes,
}

impl FlvTag {
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            data,
        }
    }

    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            data,
        }
    }

    /// Keyframe bit of a video tag body
    pub fn is_keyframe(&self) -> bool {
        self.tag_type == FlvTagType::Video
            && !self.data.is_empty()
            && matches!((self.data[0] >> 4) & 0x0F, 1 | 4)
    }

    /// Sequence header (AVC/HEVC decoder config or AAC AudioSpecificConfig)
    pub fn is_sequence_header(&self) -> bool {
        if self.data.len() < 2 {
            return false;
        }
        match self.tag_type {
            FlvTagType::Video => self.data[1] == 0,
            FlvTagType::Audio => (self.data[0] >> 4) == SOUND_FORMAT_AAC && self.data[1] == 0,
            FlvTagType::Script => false,
        }
    }

    /// Size of the tag body
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// FLV video codec id for a codec, `None` if FLV cannot carry it
pub fn video_codec_id(codec: CodecId) -> Option<u8> {
    match codec {
        CodecId::H264 => Some(7),
        CodecId::H265 => Some(12),
        _ => None,
    }
}

const SOUND_FORMAT_AAC: u8 = 10;

/// FLV sound format for a codec, `None` if FLV cannot carry it
pub fn audio_sound_format(codec: CodecId) -> Option<u8> {
    match codec {
        CodecId::Aac => Some(SOUND_FORMAT_AAC),
        CodecId::G711A => Some(7),
        CodecId::G711U => Some(8),
        _ => None,
    }
}

fn audio_flags(codec: CodecId) -> Option<u8> {
    let format = audio_sound_format(codec)?;
    // AAC is always signalled as 44kHz/16bit/stereo; G.711 as 5.5kHz/16bit/mono
    Some(match codec {
        CodecId::Aac => (format << 4) | 0x0F,
        _ => (format << 4) | 0x02,
    })
}

/// Build the tag body of a video frame
pub fn video_tag_body(frame: &Frame) -> Option<Bytes> {
    let codec_id = video_codec_id(frame.codec)?;
    let frame_type: u8 = if frame.key_frame { 1 } else { 2 };
    let cts = frame.composition_offset();

    let mut buf = BytesMut::with_capacity(frame.data.len() + 5);
    buf.put_u8((frame_type << 4) | codec_id);
    buf.put_u8(1); // NALU
    buf.put_uint(cts as u32 as u64 & 0x00FF_FFFF, 3);
    buf.put_slice(&frame.data);
    Some(buf.freeze())
}

/// Build the tag body of an audio frame
pub fn audio_tag_body(frame: &Frame) -> Option<Bytes> {
    let flags = audio_flags(frame.codec)?;

    let mut buf = BytesMut::with_capacity(frame.data.len() + 2);
    buf.put_u8(flags);
    if frame.codec == CodecId::Aac {
        buf.put_u8(1); // raw
    }
    buf.put_slice(&frame.data);
    Some(buf.freeze())
}

/// Build the tag body of any frame
pub fn frame_tag_body(frame: &Frame) -> Option<Bytes> {
    match frame.track_type {
        TrackType::Video => video_tag_body(frame),
        TrackType::Audio => audio_tag_body(frame),
    }
}

/// Build the sequence header tag for a track
///
/// Returns `None` when the track has no config record or the codec has no
/// sequence header in FLV (G.711).
pub fn sequence_header(track: &Track) -> Option<FlvTag> {
    if track.config.is_empty() {
        return None;
    }
    match track.track_type {
        TrackType::Video => {
            let codec_id = video_codec_id(track.codec)?;
            let mut buf = BytesMut::with_capacity(track.config.len() + 5);
            buf.put_u8(0x10 | codec_id);
            buf.put_u8(0); // sequence header
            buf.put_uint(0, 3);
            buf.put_slice(&track.config);
            Some(FlvTag::video(0, buf.freeze()))
        }
        TrackType::Audio if track.codec == CodecId::Aac => {
            let mut buf = BytesMut::with_capacity(track.config.len() + 2);
            buf.put_u8((SOUND_FORMAT_AAC << 4) | 0x0F);
            buf.put_u8(0); // sequence header
            buf.put_slice(&track.config);
            Some(FlvTag::audio(0, buf.freeze()))
        }
        TrackType::Audio => None,
    }
}

/// Writes the FLV file header (9 bytes) plus PreviousTagSize0 (4 bytes)
pub fn write_file_header(writer: &mut impl Write, has_video: bool, has_audio: bool) -> std::io::Result<()> {
    let mut flags = 0u8;
    if has_audio {
        flags |= 0x04;
    }
    if has_video {
        flags |= 0x01;
    }
    writer.write_all(&FLV_SIGNATURE)?;
    writer.write_all(&[0x01, flags])?;
    writer.write_all(&FLV_HEADER_SIZE.to_be_bytes())?;
    writer.write_all(&0u32.to_be_bytes())?;
    Ok(())
}

/// Writes one tag with its 11-byte header and trailing PreviousTagSize
pub fn write_tag(writer: &mut impl Write, tag: &FlvTag) -> std::io::Result<()> {
    let data_size = tag.data.len() as u32;
    let ts = tag.timestamp;

    let mut header = [0u8; 11];
    header[0] = tag.tag_type.code();
    header[1..4].copy_from_slice(&data_size.to_be_bytes()[1..]);
    header[4..7].copy_from_slice(&ts.to_be_bytes()[1..]);
    header[7] = (ts >> 24) as u8;
    // stream id stays 0

    writer.write_all(&header)?;
    writer.write_all(&tag.data)?;
    writer.write_all(&(11 + data_size).to_be_bytes())?;
    Ok(())
}

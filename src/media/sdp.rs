//! Minimal SDP generation and parsing
//!
//! Only what the RTSP source needs: a title section carrying the duration
//! hint, one media section per track, and on the parse side the list of
//! media sections.

use std::fmt::Write as _;

use super::frame::{CodecId, Track, TrackType};
use crate::source::{DescriptorError, SessionDescriptor};

/// Dynamic payload type assigned to a codec
pub fn payload_type(codec: CodecId) -> u8 {
    match codec {
        CodecId::G711U => 0,
        CodecId::G711A => 8,
        CodecId::H264 | CodecId::H265 => 96,
        CodecId::Aac => 97,
        CodecId::Opus => 98,
    }
}

/// Render a session description for the given tracks
///
/// `duration` is the stream length in seconds; `0.0` marks a live stream.
pub fn build(duration: f32, tracks: &[Track]) -> String {
    let mut sdp = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(sdp, "v=0\r");
    let _ = writeln!(sdp, "o=- 0 0 IN IP4 0.0.0.0\r");
    let _ = writeln!(sdp, "s=Streamed by stream-fanout\r");
    let _ = writeln!(sdp, "c=IN IP4 0.0.0.0\r");
    let _ = writeln!(sdp, "t=0 0\r");
    if duration <= 0.0 {
        let _ = writeln!(sdp, "a=range:npt=0-\r");
    } else {
        let _ = writeln!(sdp, "a=range:npt=0-{:.2}\r", duration);
    }
    let _ = writeln!(sdp, "a=control:*\r");

    for (index, track) in tracks.iter().enumerate() {
        let pt = payload_type(track.codec);
        let _ = writeln!(sdp, "m={} 0 RTP/AVP {}\r", track.track_type, pt);
        let _ = writeln!(
            sdp,
            "a=rtpmap:{} {}/{}\r",
            pt,
            track.codec.encoding_name(),
            track.clock_rate
        );
        let _ = writeln!(sdp, "a=control:trackID={}\r", index);
    }
    sdp
}

/// One media section of a parsed SDP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpMedia {
    pub track_type: TrackType,
    pub payload_type: u8,
    pub control: Option<String>,
}

/// Parsed session description
#[derive(Debug, Clone, Default)]
pub struct Sdp {
    pub media: Vec<SdpMedia>,
}

impl Sdp {
    /// Parse the media sections of an SDP text
    ///
    /// Media kinds other than audio/video (e.g. `application`) are skipped.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut media: Vec<SdpMedia> = Vec::new();
        let mut in_skipped_section = false;

        for line in text.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("m=") {
                let mut fields = rest.split_whitespace();
                let kind = fields.next().unwrap_or_default();
                let track_type = match kind {
                    "video" => TrackType::Video,
                    "audio" => TrackType::Audio,
                    _ => {
                        in_skipped_section = true;
                        continue;
                    }
                };
                let payload_type = fields
                    .nth(2)
                    .and_then(|pt| pt.parse::<u8>().ok())
                    .ok_or_else(|| DescriptorError::new(format!("bad media line: {}", line)))?;
                in_skipped_section = false;
                media.push(SdpMedia {
                    track_type,
                    payload_type,
                    control: None,
                });
            } else if let Some(control) = line.strip_prefix("a=control:") {
                if in_skipped_section {
                    continue;
                }
                if let Some(current) = media.last_mut() {
                    current.control = Some(control.to_string());
                }
            }
        }

        if media.is_empty() && !text.trim().is_empty() && !text.contains("v=") {
            return Err(DescriptorError::new("not a session description"));
        }
        Ok(Self { media })
    }
}

impl SessionDescriptor for Sdp {
    fn parse(text: &str) -> Result<Self, DescriptorError> {
        Sdp::parse(text)
    }

    fn track_types(&self) -> Vec<TrackType> {
        self.media.iter().map(|m| m.track_type).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_live_sdp() {
        let sdp = build(0.0, &[Track::new(CodecId::H264), Track::new(CodecId::Aac)]);
        assert!(sdp.contains("a=range:npt=0-\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 96"));
        assert!(sdp.contains("a=rtpmap:97 mpeg4-generic/44100"));
        assert!(sdp.contains("a=control:trackID=1"));
    }

    #[test]
    fn test_build_with_duration() {
        let sdp = build(12.5, &[Track::new(CodecId::H264)]);
        assert!(sdp.contains("a=range:npt=0-12.50"));
    }

    #[test]
    fn test_parse_round_trip_tracks() {
        let text = build(0.0, &[Track::new(CodecId::H264), Track::new(CodecId::G711A)]);
        let sdp = Sdp::parse(&text).unwrap();

        assert_eq!(sdp.track_types(), vec![TrackType::Video, TrackType::Audio]);
        assert_eq!(sdp.media[1].payload_type, 8);
        assert_eq!(sdp.media[0].control.as_deref(), Some("trackID=0"));
    }

    #[test]
    fn test_parse_skips_application_sections() {
        let text = "v=0\r\nm=application 0 RTP/AVP 107\r\na=control:meta\r\nm=audio 0 RTP/AVP 0\r\n";
        let sdp = Sdp::parse(text).unwrap();
        assert_eq!(sdp.track_types(), vec![TrackType::Audio]);
        assert_eq!(sdp.media[0].control, None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Sdp::parse("hello world").is_err());
        assert!(Sdp::parse("v=0\r\nm=video 0 RTP/AVP\r\n").is_err());
    }
}

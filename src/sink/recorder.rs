//! FLV recorder
//!
//! Files are laid out per stream:
//!
//! ```text
//! <root>/<vhost>/<app>/<stream>/<stream>.flv            first file
//! <root>/<vhost>/<app>/<stream>/<stream>-00001.flv      every later file
//! <root>/<vhost>/<app>/<stream>/<stream>-00000.flv      first segment, when segmented
//! ```
//!
//! When the stream has video, a file only starts at a key frame, and a new
//! segment is cut at the first key frame after `segment_duration`. The FLV
//! header and sequence headers describe the tracks known when a file is
//! opened, so declaring a new or changed track closes the current file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;

use crate::media::flv::{self, FlvTag};
use crate::media::{Frame, FramePtr, SourceKey, Track, TrackType};
use crate::stats::SinkStats;

use super::{FrameWriter, SinkError};

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Directory recordings are written under
    pub root: PathBuf,

    /// Record FLV files
    ///
    /// FLV is the only recorded container; `segment_duration` gives the
    /// segmented output other live recorders produce as HLS.
    pub enable_flv: bool,

    /// Cut a new file after this much media time, `None` for one file
    pub segment_duration: Option<Duration>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./record"),
            enable_flv: false,
            segment_duration: None,
        }
    }
}

impl RecordConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Enable or disable FLV recording
    pub fn enable_flv(mut self, enabled: bool) -> Self {
        self.enable_flv = enabled;
        self
    }

    /// Set segment length
    pub fn segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = Some(duration);
        self
    }
}

/// An open output file
struct FlvFile {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Timestamp of the first frame, written as 0
    base_timestamp: u32,
    tags: u64,
}

impl FlvFile {
    fn create(path: PathBuf, tracks: &BTreeMap<TrackType, Track>, base_timestamp: u32) -> std::io::Result<Self> {
        let mut writer = BufWriter::new(File::create(&path)?);
        flv::write_file_header(
            &mut writer,
            tracks.contains_key(&TrackType::Video),
            tracks.contains_key(&TrackType::Audio),
        )?;

        let mut tags = 0;
        for track in tracks.values() {
            if let Some(header) = flv::sequence_header(track) {
                flv::write_tag(&mut writer, &header)?;
                tags += 1;
            }
        }

        Ok(Self {
            writer,
            path,
            base_timestamp,
            tags,
        })
    }

    fn elapsed(&self, timestamp: u32) -> Duration {
        Duration::from_millis(timestamp.saturating_sub(self.base_timestamp) as u64)
    }

    fn write_frame(&mut self, frame: &Frame, body: bytes::Bytes) -> std::io::Result<()> {
        let timestamp = frame.dts.saturating_sub(self.base_timestamp);
        let tag = match frame.track_type {
            TrackType::Video => FlvTag::video(timestamp, body),
            TrackType::Audio => FlvTag::audio(timestamp, body),
        };
        flv::write_tag(&mut self.writer, &tag)?;
        self.tags += 1;
        Ok(())
    }

    fn finish(mut self) -> std::io::Result<PathBuf> {
        self.writer.flush()?;
        tracing::info!(path = %self.path.display(), tags = self.tags, "Recording file closed");
        Ok(self.path)
    }
}

struct RecorderState {
    tracks: BTreeMap<TrackType, Track>,
    file: Option<FlvFile>,
    segment: u32,
    finished: Vec<PathBuf>,
}

/// Records the frame stream to FLV files
///
/// With FLV disabled the recorder still validates track declarations but
/// writes nothing.
pub struct MediaRecorder {
    key: SourceKey,
    config: RecordConfig,
    dir: PathBuf,
    state: Mutex<RecorderState>,
    stats: SinkStats,
}

impl MediaRecorder {
    /// Create a recorder, creating the output directory if recording is on
    pub fn new(key: SourceKey, config: RecordConfig) -> Result<Self, SinkError> {
        let dir = config.root.join(&key.vhost).join(&key.app).join(&key.stream);
        if config.enable_flv {
            fs::create_dir_all(&dir)?;
        }

        Ok(Self {
            key,
            config,
            dir,
            state: Mutex::new(RecorderState {
                tracks: BTreeMap::new(),
                file: None,
                segment: 0,
                finished: Vec::new(),
            }),
            stats: SinkStats::new(),
        })
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }

    /// Directory this stream is recorded into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether anything is written at all
    pub fn is_recording(&self) -> bool {
        self.config.enable_flv
    }

    /// Track types declared so far
    pub fn track_types(&self) -> Vec<TrackType> {
        self.state.lock().tracks.keys().copied().collect()
    }

    /// Path of the file being written
    pub fn current_file(&self) -> Option<PathBuf> {
        self.state.lock().file.as_ref().map(|f| f.path.clone())
    }

    /// Files that have been completed
    pub fn finished_files(&self) -> Vec<PathBuf> {
        self.state.lock().finished.clone()
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    /// Flush and close the current file
    pub fn close(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.take() {
            let path = file.finish()?;
            state.finished.push(path);
        }
        Ok(())
    }

    fn segment_path(&self, index: u32) -> PathBuf {
        let name = if self.config.segment_duration.is_some() || index > 0 {
            format!("{}-{:05}.flv", self.key.stream, index)
        } else {
            format!("{}.flv", self.key.stream)
        };
        self.dir.join(name)
    }

    fn record(&self, state: &mut RecorderState, frame: &Frame) -> Result<(), SinkError> {
        // In-band parameter sets are already in the sequence headers
        if !self.config.enable_flv || frame.config_frame {
            return Ok(());
        }

        let body = flv::frame_tag_body(frame).ok_or(SinkError::UnsupportedCodec(frame.codec))?;
        let has_video = state.tracks.contains_key(&TrackType::Video);
        let video_key = frame.track_type == TrackType::Video && frame.key_frame;

        let rotate = match (&state.file, self.config.segment_duration) {
            (Some(file), Some(segment)) => video_key && file.elapsed(frame.dts) >= segment,
            _ => false,
        };
        if rotate {
            if let Some(file) = state.file.take() {
                let path = file.finish()?;
                state.finished.push(path);
            }
        }

        if state.file.is_none() {
            if has_video && !video_key {
                // Wait for a key frame to start the file
                return Ok(());
            }
            let path = self.segment_path(state.segment);
            let file = FlvFile::create(path, &state.tracks, frame.dts)?;
            state.segment += 1;
            tracing::info!(stream = %self.key, path = %file.path.display(), "Recording file opened");
            state.file = Some(file);
        }

        if let Some(file) = state.file.as_mut() {
            file.write_frame(frame, body)?;
        }
        Ok(())
    }
}

impl FrameWriter for MediaRecorder {
    fn add_track(&self, track: &Track) -> Result<(), SinkError> {
        if self.config.enable_flv {
            let codec_id = match track.track_type {
                TrackType::Video => flv::video_codec_id(track.codec),
                TrackType::Audio => flv::audio_sound_format(track.codec),
            };
            if codec_id.is_none() {
                return Err(SinkError::UnsupportedCodec(track.codec));
            }
        }

        let mut state = self.state.lock();
        let changed = state
            .tracks
            .get(&track.track_type)
            .map_or(true, |known| known.codec != track.codec || known.config != track.config);
        state.tracks.insert(track.track_type, track.clone());
        tracing::debug!(stream = %self.key, track = %track.track_type, "Recorder track added");

        if changed {
            if let Some(file) = state.file.take() {
                tracing::info!(stream = %self.key, track = %track.track_type, "Track set changed, closing file");
                let path = file.finish()?;
                state.finished.push(path);
            }
        }
        Ok(())
    }

    fn input_frame(&self, frame: &FramePtr) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if !state.tracks.contains_key(&frame.track_type) {
            self.stats.record_rejected();
            return Err(SinkError::UnknownTrack(frame.track_type));
        }

        match self.record(&mut state, frame) {
            Ok(()) => {
                self.stats.record_frame(frame.size());
                Ok(())
            }
            Err(e) => {
                self.stats.record_rejected();
                Err(e)
            }
        }
    }
}

impl Drop for MediaRecorder {
    fn drop(&mut self) {
        if let Some(file) = self.state.get_mut().file.take() {
            if let Err(e) = file.finish() {
                tracing::warn!(stream = %self.key, error = %e, "Failed to close recording");
            }
        }
    }
}

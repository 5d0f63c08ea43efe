//! Fan-out muxer implementation

use std::sync::{Arc, Weak};

use crate::media::{FramePtr, Schema, SourceKey, Track};
use crate::sink::{FrameWriter, MediaRecorder, ProtocolSink, RtmpSink, RtspSink};
use crate::source::{MediaSourceEvent, ReaderCounter, SourceRegistry};

use super::config::MuxerConfig;
use super::error::MuxerError;

/// Single write entry point for one published stream
///
/// Forwards every track declaration and frame to the enabled sinks in a
/// fixed order (RTSP, RTMP, recorder). A sink refusing a call is logged
/// and skipped; the producer never sees the failure.
pub struct FanoutMuxer {
    key: SourceKey,
    rtsp: Option<RtspSink>,
    rtmp: Option<RtmpSink>,
    recorder: MediaRecorder,
}

impl FanoutMuxer {
    /// Build the sinks enabled in `config`
    ///
    /// Fails if a live source already publishes this stream over an enabled
    /// protocol, or if the recording directory cannot be created.
    pub fn new(
        key: SourceKey,
        config: MuxerConfig,
        registry: Arc<SourceRegistry>,
    ) -> Result<Arc<Self>, MuxerError> {
        let enabled = [
            (Schema::Rtsp, config.enable_rtsp),
            (Schema::Rtmp, config.enable_rtmp),
        ];
        for (schema, on) in enabled {
            if on && registry.contains(schema, &key) {
                tracing::warn!(schema = %schema, stream = %key, "Stream already published");
                return Err(MuxerError::AlreadyRegistered(schema, key));
            }
        }

        let recorder =
            MediaRecorder::new(key.clone(), config.record.clone()).map_err(MuxerError::Recorder)?;

        let rtsp = config.enable_rtsp.then(|| {
            RtspSink::new(
                key.clone(),
                config.duration,
                config.source.clone(),
                Some(Arc::clone(&registry)),
            )
        });
        let rtmp = config.enable_rtmp.then(|| {
            RtmpSink::new(
                key.clone(),
                config.duration,
                config.source.clone(),
                Some(Arc::clone(&registry)),
            )
        });

        tracing::info!(
            stream = %key,
            rtsp = config.enable_rtsp,
            rtmp = config.enable_rtmp,
            record = config.record.enable_flv,
            "Muxer created"
        );

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let counter: Weak<dyn ReaderCounter> = weak.clone();
            if let Some(sink) = &rtsp {
                sink.set_reader_counter(counter.clone());
            }
            if let Some(sink) = &rtmp {
                sink.set_reader_counter(counter);
            }
            Self {
                key,
                rtsp,
                rtmp,
                recorder,
            }
        }))
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn rtsp(&self) -> Option<&RtspSink> {
        self.rtsp.as_ref()
    }

    pub fn rtmp(&self) -> Option<&RtmpSink> {
        self.rtmp.as_ref()
    }

    pub fn recorder(&self) -> &MediaRecorder {
        &self.recorder
    }

    /// Announce a track to every sink
    pub fn add_track(&self, track: &Track) {
        for (name, writer) in self.writers() {
            if let Err(e) = writer.add_track(track) {
                tracing::warn!(
                    stream = %self.key,
                    sink = name,
                    track = %track.track_type,
                    error = %e,
                    "Sink rejected track"
                );
            }
        }
    }

    /// Hand a frame to every sink
    pub fn input_frame(&self, frame: &FramePtr) {
        for (name, writer) in self.writers() {
            if let Err(e) = writer.input_frame(frame) {
                tracing::warn!(
                    stream = %self.key,
                    sink = name,
                    track = %frame.track_type,
                    dts = frame.dts,
                    error = %e,
                    "Sink rejected frame"
                );
            }
        }
    }

    /// Register the listener on the protocol sinks
    pub fn set_listener(&self, listener: Weak<dyn MediaSourceEvent>) {
        for sink in self.protocol_sinks() {
            sink.set_listener(listener.clone());
        }
    }

    /// Readers across the protocol sinks
    pub fn reader_count(&self) -> usize {
        self.protocol_sinks().map(|sink| sink.reader_count()).sum()
    }

    /// Overwrite the RTSP track timestamps
    pub fn set_timestamp(&self, timestamp: u32) {
        if let Some(rtsp) = &self.rtsp {
            rtsp.set_timestamp(timestamp);
        }
    }

    fn protocol_sinks(&self) -> impl Iterator<Item = &dyn ProtocolSink> + '_ {
        let rtsp = self.rtsp.iter().map(|s| s as &dyn ProtocolSink);
        let rtmp = self.rtmp.iter().map(|s| s as &dyn ProtocolSink);
        rtsp.chain(rtmp)
    }

    fn writers(&self) -> impl Iterator<Item = (&'static str, &dyn FrameWriter)> + '_ {
        let rtsp = self.rtsp.iter().map(|s| ("rtsp", s as &dyn FrameWriter));
        let rtmp = self.rtmp.iter().map(|s| ("rtmp", s as &dyn FrameWriter));
        let recorder = std::iter::once(("recorder", &self.recorder as &dyn FrameWriter));
        rtsp.chain(rtmp).chain(recorder)
    }
}

impl ReaderCounter for FanoutMuxer {
    fn total_reader_count(&self) -> usize {
        self.reader_count()
    }
}

impl Drop for FanoutMuxer {
    fn drop(&mut self) {
        tracing::info!(stream = %self.key, "Muxer closed");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::media::{CodecId, Frame, TrackType};
    use crate::sink::RecordConfig;
    use crate::source::SourceConfig;

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    fn temp_root(name: &str) -> PathBuf {
        let id = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("stream-fanout-muxer-{}-{}-{}", std::process::id(), name, id))
    }

    fn key() -> SourceKey {
        SourceKey::new("vhost", "live", "cam")
    }

    fn video(dts: u32, key_frame: bool) -> FramePtr {
        Frame::video(CodecId::H264, dts, dts, Bytes::from_static(&[0x65, 0x01]), key_frame).into_ptr()
    }

    #[derive(Default)]
    struct IdleLog {
        no_reader: AtomicUsize,
    }

    impl MediaSourceEvent for IdleLog {
        fn on_no_reader(&self, _schema: Schema, _key: &SourceKey) {
            self.no_reader.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rtsp_and_recorder_scenario() {
        let registry = Arc::new(SourceRegistry::new());
        let config = MuxerConfig::default()
            .enable_rtmp(false)
            .source(SourceConfig::default().none_reader_delay(Duration::from_millis(5000)))
            .record(RecordConfig::new(temp_root("scenario")).enable_flv(true));
        let muxer = FanoutMuxer::new(key(), config, registry).unwrap();
        let listener = Arc::new(IdleLog::default());
        muxer.set_listener(Arc::downgrade(&listener) as Weak<dyn MediaSourceEvent>);

        assert!(muxer.rtmp().is_none());
        let rtsp = muxer.rtsp().unwrap();

        // No track declared yet
        for i in 0..10 {
            muxer.input_frame(&video(i * 40, i == 0));
        }
        assert_eq!(rtsp.stats().frames(), 0);
        assert_eq!(rtsp.stats().rejected(), 10);
        assert_eq!(muxer.recorder().stats().frames(), 0);

        muxer.add_track(&Track::new(CodecId::H264));
        for i in 0..10 {
            muxer.input_frame(&video(400 + i * 40, i == 0));
        }
        assert_eq!(rtsp.stats().frames(), 10);
        assert_eq!(muxer.recorder().stats().frames(), 10);
        assert_eq!(muxer.reader_count(), 0);

        // Frames come out of the ring in order
        let mut reader = rtsp.source().attach_reader().unwrap();
        assert_eq!(muxer.reader_count(), 1);
        let sequences: Vec<u16> = std::iter::from_fn(|| reader.try_recv().ok()).map(|p| p.sequence).collect();
        assert_eq!(sequences, (0..10).collect::<Vec<u16>>());

        drop(reader);
        assert_eq!(muxer.reader_count(), 0);
        assert!(rtsp.source().idle_state().is_pending());

        tokio::time::advance(Duration::from_millis(6000)).await;
        muxer.input_frame(&video(6400, false));
        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 1);

        muxer.input_frame(&video(6440, false));
        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tracks_reach_every_enabled_sink() {
        let registry = Arc::new(SourceRegistry::new());
        let muxer = FanoutMuxer::new(key(), MuxerConfig::default(), registry).unwrap();

        muxer.add_track(&Track::new(CodecId::H264));
        muxer.add_track(&Track::new(CodecId::Aac));

        let expected = vec![TrackType::Video, TrackType::Audio];
        assert_eq!(muxer.rtsp().unwrap().source().track_types(), expected);
        assert_eq!(muxer.rtmp().unwrap().source().track_types(), expected);
        assert_eq!(muxer.recorder().track_types(), expected);
    }

    #[test]
    fn test_sink_failure_is_isolated() {
        let registry = Arc::new(SourceRegistry::new());
        let muxer = FanoutMuxer::new(key(), MuxerConfig::default(), registry).unwrap();

        // RTMP cannot carry Opus; RTSP and the recorder still take it
        muxer.add_track(&Track::new(CodecId::Opus));
        let frame = Frame::audio(CodecId::Opus, 0, Bytes::from_static(&[0xFC])).into_ptr();
        muxer.input_frame(&frame);

        assert_eq!(muxer.rtsp().unwrap().stats().frames(), 1);
        assert_eq!(muxer.rtmp().unwrap().stats().rejected(), 1);
        assert_eq!(muxer.recorder().stats().frames(), 1);
    }

    #[test]
    fn test_disabled_sinks_are_not_built() {
        let registry = Arc::new(SourceRegistry::new());
        let config = MuxerConfig::default().enable_rtsp(false).enable_rtmp(false);
        let muxer = FanoutMuxer::new(key(), config, registry.clone()).unwrap();

        muxer.add_track(&Track::new(CodecId::H264));
        muxer.input_frame(&video(0, true));

        assert!(muxer.rtsp().is_none());
        assert!(muxer.rtmp().is_none());
        assert_eq!(muxer.reader_count(), 0);
        assert!(registry.is_empty());
        assert_eq!(muxer.recorder().stats().frames(), 1);
    }

    #[test]
    fn test_reader_count_sums_protocol_sinks() {
        let registry = Arc::new(SourceRegistry::new());
        let muxer = FanoutMuxer::new(key(), MuxerConfig::default(), registry).unwrap();
        muxer.add_track(&Track::new(CodecId::H264));
        muxer.input_frame(&video(0, true));

        let rtsp = muxer.rtsp().unwrap().source().attach_reader().unwrap();
        let rtmp_a = muxer.rtmp().unwrap().source().attach_reader().unwrap();
        let rtmp_b = muxer.rtmp().unwrap().source().attach_reader().unwrap();
        assert_eq!(muxer.reader_count(), 3);
        assert_eq!(muxer.total_reader_count(), 3);

        drop(rtsp);
        drop(rtmp_a);
        assert_eq!(muxer.reader_count(), 1);
        drop(rtmp_b);
        assert_eq!(muxer.reader_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_on_sibling_protocol_holds_off_idle() {
        let registry = Arc::new(SourceRegistry::new());
        let muxer = FanoutMuxer::new(key(), MuxerConfig::default(), registry).unwrap();
        let listener = Arc::new(IdleLog::default());
        muxer.set_listener(Arc::downgrade(&listener) as Weak<dyn MediaSourceEvent>);

        muxer.add_track(&Track::new(CodecId::H264));
        muxer.input_frame(&video(0, true));
        let _rtmp_reader = muxer.rtmp().unwrap().source().attach_reader().unwrap();

        tokio::time::advance(Duration::from_millis(6000)).await;
        muxer.input_frame(&video(6000, false));

        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registry_conflict() {
        let registry = Arc::new(SourceRegistry::new());
        let first = FanoutMuxer::new(key(), MuxerConfig::default(), registry.clone()).unwrap();
        first.add_track(&Track::new(CodecId::H264));
        first.input_frame(&video(0, true));
        assert!(registry.contains(Schema::Rtsp, &key()));

        let second = FanoutMuxer::new(key(), MuxerConfig::default(), registry.clone());
        assert!(matches!(second, Err(MuxerError::AlreadyRegistered(Schema::Rtsp, _))));

        let rtmp_only = MuxerConfig::default().enable_rtsp(false);
        assert!(FanoutMuxer::new(key(), rtmp_only, registry.clone()).is_err());

        drop(first);
        assert!(registry.is_empty());
        assert!(FanoutMuxer::new(key(), MuxerConfig::default(), registry).is_ok());
    }

    #[test]
    fn test_muxers_racing_for_the_same_stream() {
        let registry = Arc::new(SourceRegistry::new());
        // Both pass the up-front check: nothing is registered before the first write
        let first = FanoutMuxer::new(key(), MuxerConfig::default(), registry.clone()).unwrap();
        let second = FanoutMuxer::new(key(), MuxerConfig::default(), registry.clone()).unwrap();

        for muxer in [&first, &second] {
            muxer.add_track(&Track::new(CodecId::H264));
            muxer.input_frame(&video(0, true));
        }

        assert!(first.rtsp().unwrap().source().is_registered());
        assert!(second.rtsp().unwrap().source().is_rejected());
        assert!(second.rtmp().unwrap().source().is_rejected());

        let found = registry.find::<crate::media::RtpPacket>(Schema::Rtsp, &key()).unwrap();
        assert!(Arc::ptr_eq(&found, first.rtsp().unwrap().source()));
    }

    #[test]
    fn test_recorder_setup_failure() {
        let root = temp_root("blocked");
        std::fs::write(&root, b"file").unwrap();
        let config = MuxerConfig::default().record(RecordConfig::new(&root).enable_flv(true));

        let result = FanoutMuxer::new(key(), config, Arc::new(SourceRegistry::new()));
        assert!(matches!(result, Err(MuxerError::Recorder(_))));
        let _ = std::fs::remove_file(&root);
    }

    #[test]
    fn test_set_timestamp_only_touches_rtsp() {
        let registry = Arc::new(SourceRegistry::new());
        let muxer = FanoutMuxer::new(key(), MuxerConfig::default(), registry).unwrap();
        muxer.add_track(&Track::new(CodecId::H264));
        muxer.input_frame(&video(1000, true));

        muxer.set_timestamp(0);
        assert_eq!(muxer.rtsp().unwrap().source().timestamp(Some(TrackType::Video)), 0);
        assert_eq!(muxer.rtmp().unwrap().source().timestamp(Some(TrackType::Video)), 1000);
    }
}

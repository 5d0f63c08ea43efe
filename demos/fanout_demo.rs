//! Fan-out demo - one synthetic producer, several readers
//!
//! Run with: cargo run --example fanout_demo -- [record_dir]
//!
//! This example demonstrates:
//! - Building a `FanoutMuxer` with RTSP, RTMP and FLV recording
//! - Reading the RTSP and RTMP rings from separate tasks
//! - Receiving the "no readers" notification once every reader has left
//!
//! # Architecture
//!
//! ```text
//!   producer task ──► FanoutMuxer ──► RTSP ring ──► rtsp reader task
//!    (25 fps H.264)        │      └─► RTMP ring ──► rtmp reader task
//!                          └────────► <record_dir>/__defaultVhost__/live/demo/
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

use stream_fanout::media::{CodecId, Frame, Schema, SourceKey, Track};
use stream_fanout::ring::RecvError;
use stream_fanout::{FanoutMuxer, MediaSourceEvent, MuxerConfig, RecordConfig, SourceConfig, SourceRegistry};

/// Logs source events and wakes `main` when the stream went idle
struct DemoListener {
    idle: Notify,
}

impl MediaSourceEvent for DemoListener {
    fn on_no_reader(&self, schema: Schema, key: &SourceKey) {
        tracing::info!(schema = %schema, stream = %key, "Stream idle, stopping producer");
        self.idle.notify_one();
    }

    fn on_reader_changed(&self, schema: Schema, key: &SourceKey, readers: usize) {
        tracing::info!(schema = %schema, stream = %key, readers = readers, "Readers changed");
    }

    fn on_registered(&self, schema: Schema, key: &SourceKey, registered: bool) {
        tracing::info!(schema = %schema, stream = %key, registered = registered, "Registration changed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let record_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("fanout_demo"));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stream_fanout=debug".parse()?)
                .add_directive("fanout_demo=info".parse()?),
        )
        .init();

    let registry = Arc::new(SourceRegistry::new());
    let key = SourceKey::new("__defaultVhost__", "live", "demo");
    let config = MuxerConfig::default()
        .source(SourceConfig::default().none_reader_delay(Duration::from_secs(2)))
        .record(
            RecordConfig::new(&record_dir)
                .enable_flv(true)
                .segment_duration(Duration::from_secs(2)),
        );
    let muxer = FanoutMuxer::new(key.clone(), config, Arc::clone(&registry))?;

    let listener = Arc::new(DemoListener { idle: Notify::new() });
    let weak_listener: std::sync::Weak<dyn MediaSourceEvent> = Arc::downgrade(&listener) as _;
    muxer.set_listener(weak_listener);

    let sps_pps = Bytes::from_static(&[0x01, 0x42, 0xC0, 0x1E, 0xFF, 0xE1]);
    muxer.add_track(&Track::new(CodecId::H264).with_config(sps_pps));
    muxer.add_track(&Track::new(CodecId::G711A));

    // Producer: 25 fps video, 50 packets/s audio
    let producer = {
        let muxer = Arc::clone(&muxer);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(20));
            let mut ts: u32 = 0;
            loop {
                tick.tick().await;
                if ts % 40 == 0 {
                    let key_frame = ts % 1000 == 0;
                    let nalu = Bytes::from(vec![if key_frame { 0x65 } else { 0x41 }; 1800]);
                    muxer.input_frame(&Frame::video(CodecId::H264, ts, ts, nalu, key_frame).into_ptr());
                }
                muxer.input_frame(&Frame::audio(CodecId::G711A, ts, Bytes::from(vec![0xD5; 160])).into_ptr());
                ts += 20;
            }
        })
    };

    // Rings exist after the first frame
    tokio::time::sleep(Duration::from_millis(100)).await;

    let rtsp_reader = muxer.rtsp().and_then(|sink| sink.source().attach_reader());
    let rtsp_task = rtsp_reader.map(|mut reader| {
        tokio::spawn(async move {
            let deadline = tokio::time::sleep(Duration::from_secs(3));
            tokio::pin!(deadline);
            let mut packets = 0u64;
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    result = reader.recv() => match result {
                        Ok(_) => packets += 1,
                        Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "RTSP reader lagged"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            tracing::info!(packets = packets, "RTSP reader leaving");
        })
    });

    let rtmp_reader = muxer.rtmp().and_then(|sink| sink.source().attach_reader());
    let headers = muxer.rtmp().map(|sink| sink.sequence_headers().len()).unwrap_or(0);
    let rtmp_task = rtmp_reader.map(|mut reader| {
        tokio::spawn(async move {
            tracing::info!(headers = headers, "RTMP reader sends cached sequence headers first");
            let mut keyframes = 0u64;
            for _ in 0..100 {
                match reader.recv().await {
                    Ok(packet) if packet.tag.is_keyframe() => keyframes += 1,
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "RTMP reader lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::info!(keyframes = keyframes, "RTMP reader leaving");
        })
    });

    for task in [rtsp_task, rtmp_task].into_iter().flatten() {
        task.await?;
    }
    tracing::info!(readers = muxer.reader_count(), "All readers gone");

    listener.idle.notified().await;
    producer.abort();

    if let Err(e) = muxer.recorder().close() {
        tracing::warn!(error = %e, "Failed to close recording");
    }
    for path in muxer.recorder().finished_files() {
        tracing::info!(path = %path.display(), "Recorded");
    }
    if let Some(rtsp) = muxer.rtsp() {
        let stats = rtsp.stats().snapshot();
        tracing::info!(frames = stats.frames, packets = stats.packets, bytes = stats.bytes, "RTSP stats");
    }
    tracing::info!(registered = registry.len(), stream = %key, "Done");

    Ok(())
}

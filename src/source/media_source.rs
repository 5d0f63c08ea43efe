//! Media source implementation

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::media::{Schema, SourceKey, TrackType};
use crate::ring::{RingBuffer, RingReader};

use super::config::SourceConfig;
use super::error::DescriptorError;
use super::event::{MediaSourceEvent, ReaderCounter};
use super::idle::IdleState;
use super::registry::SourceRegistry;
use super::track::{MediaPacket, SessionDescriptor, TrackState};

/// Registration progress of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    /// Waiting for both the descriptor and the ring
    Pending,
    Registered,
    /// Another live source owns the key; not retried
    Rejected,
}

/// Descriptor text and the per-track state parsed from it
struct TrackTable<D> {
    text: Option<String>,
    descriptor: Option<D>,
    states: BTreeMap<TrackType, TrackState>,
}

/// A publishable stream of protocol packets
///
/// Owns the broadcast ring its packets are fanned out on. The ring is only
/// created on the first write and the source only becomes discoverable once
/// both the ring and the session descriptor exist.
pub struct MediaSource<P: MediaPacket> {
    schema: Schema,
    key: SourceKey,
    config: SourceConfig,
    weak_self: Weak<Self>,
    tracks: Mutex<TrackTable<P::Descriptor>>,
    ring: OnceLock<RingBuffer<Arc<P>>>,
    idle: Mutex<IdleState>,
    registration: Mutex<Registration>,
    registry: Option<Arc<SourceRegistry>>,
    listener: RwLock<Option<Weak<dyn MediaSourceEvent>>>,
    reader_counter: RwLock<Option<Weak<dyn ReaderCounter>>>,
}

impl<P: MediaPacket> MediaSource<P> {
    /// Create a source
    ///
    /// With a registry, the source registers itself once it is ready and
    /// unregisters when dropped.
    pub fn new(
        schema: Schema,
        key: SourceKey,
        config: SourceConfig,
        registry: Option<Arc<SourceRegistry>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            schema,
            key,
            config,
            weak_self: weak_self.clone(),
            tracks: Mutex::new(TrackTable {
                text: None,
                descriptor: None,
                states: BTreeMap::new(),
            }),
            ring: OnceLock::new(),
            idle: Mutex::new(IdleState::default()),
            registration: Mutex::new(Registration::Pending),
            registry,
            listener: RwLock::new(None),
            reader_counter: RwLock::new(None),
        })
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Assign the session descriptor
    ///
    /// Track state is rebuilt from the descriptor; tracks that were already
    /// known keep their state. Registers the source if the ring exists.
    pub fn set_track_info(&self, text: &str) -> Result<(), DescriptorError> {
        let descriptor = P::Descriptor::parse(text)?;
        {
            let mut tracks = self.tracks.lock();
            let states = descriptor
                .track_types()
                .into_iter()
                .map(|t| (t, tracks.states.get(&t).copied().unwrap_or_default()))
                .collect();
            tracks.states = states;
            tracks.descriptor = Some(descriptor);
            tracks.text = Some(text.to_string());
        }

        if self.ring.get().is_some() {
            self.try_register();
        }
        Ok(())
    }

    /// The descriptor text last assigned
    pub fn track_info(&self) -> Option<String> {
        self.tracks.lock().text.clone()
    }

    /// Run `f` on the parsed descriptor, if one has been assigned
    pub fn with_descriptor<R>(&self, f: impl FnOnce(&P::Descriptor) -> R) -> Option<R> {
        self.tracks.lock().descriptor.as_ref().map(f)
    }

    /// Track types known from the descriptor
    pub fn track_types(&self) -> Vec<TrackType> {
        self.tracks.lock().states.keys().copied().collect()
    }

    /// Publish a packet
    pub fn write(&self, packet: P, is_key: bool) {
        {
            let mut tracks = self.tracks.lock();
            if let Some(state) = tracks.states.get_mut(&packet.track_type()) {
                state.sequence = packet.sequence();
                state.timestamp = packet.timestamp();
                state.ssrc = packet.ssrc();
            }
        }

        let mut created = false;
        let ring = self.ring.get_or_init(|| {
            created = true;
            self.new_ring()
        });
        if created {
            tracing::debug!(schema = %self.schema, stream = %self.key, "Ring created");
            self.arm_idle(0);
        }

        if *self.registration.lock() == Registration::Pending && self.tracks.lock().text.is_some() {
            self.try_register();
        }

        ring.write(Arc::new(packet), is_key);
        self.check_no_reader();
    }

    /// Number of readers attached to this source
    pub fn reader_count(&self) -> usize {
        self.ring.get().map(RingBuffer::reader_count).unwrap_or(0)
    }

    /// The ring, once the first packet has been written
    pub fn ring(&self) -> Option<&RingBuffer<Arc<P>>> {
        self.ring.get()
    }

    /// Attach a reader; `None` until the first packet has been written
    pub fn attach_reader(&self) -> Option<RingReader<Arc<P>>> {
        self.ring.get().map(RingBuffer::attach)
    }

    /// Whether the source is discoverable through the registry
    pub fn is_registered(&self) -> bool {
        *self.registration.lock() == Registration::Registered
    }

    /// Whether registration failed because another source owns the key
    pub fn is_rejected(&self) -> bool {
        *self.registration.lock() == Registration::Rejected
    }

    /// Timestamp of a track
    ///
    /// Without a known track, the larger timestamp of the first two tracks;
    /// `0` when no track is known.
    pub fn timestamp(&self, track: Option<TrackType>) -> u32 {
        let tracks = self.tracks.lock();
        if let Some(state) = track.and_then(|t| tracks.states.get(&t)) {
            return state.timestamp;
        }
        tracks.states.values().take(2).map(|s| s.timestamp).max().unwrap_or(0)
    }

    /// Overwrite the timestamp of every known track
    pub fn set_timestamp(&self, timestamp: u32) {
        for state in self.tracks.lock().states.values_mut() {
            state.timestamp = timestamp;
        }
    }

    /// Latest sequence number of a track, `0` if unknown
    pub fn sequence(&self, track: TrackType) -> u16 {
        self.tracks.lock().states.get(&track).map(|s| s.sequence).unwrap_or(0)
    }

    /// Synchronization source of a track, `0` if unknown
    pub fn ssrc(&self, track: TrackType) -> u32 {
        self.tracks.lock().states.get(&track).map(|s| s.ssrc).unwrap_or(0)
    }

    /// Register the event listener
    pub fn set_listener(&self, listener: Weak<dyn MediaSourceEvent>) {
        *self.listener.write() = Some(listener);
    }

    /// Register the provider of the aggregate reader count
    pub fn set_reader_counter(&self, counter: Weak<dyn ReaderCounter>) {
        *self.reader_counter.write() = Some(counter);
    }

    /// Current idle detection state
    pub fn idle_state(&self) -> IdleState {
        *self.idle.lock()
    }

    fn listener(&self) -> Option<Arc<dyn MediaSourceEvent>> {
        self.listener.read().as_ref().and_then(Weak::upgrade)
    }

    fn aggregate_reader_count(&self) -> usize {
        let counter = self.reader_counter.read().as_ref().and_then(Weak::upgrade);
        match counter {
            Some(counter) => counter.total_reader_count(),
            None => self.reader_count(),
        }
    }

    fn new_ring(&self) -> RingBuffer<Arc<P>> {
        let weak = self.weak_self.clone();
        RingBuffer::new(self.config.ring.clone(), move |readers| {
            // The source may already be gone when the last reader detaches
            if let Some(source) = weak.upgrade() {
                source.on_reader_changed(readers);
            }
        })
    }

    fn on_reader_changed(&self, readers: usize) {
        self.arm_idle(readers);
        tracing::debug!(
            schema = %self.schema,
            stream = %self.key,
            readers = readers,
            "Reader count changed"
        );
        if let Some(listener) = self.listener() {
            listener.on_reader_changed(self.schema, &self.key, readers);
        }
    }

    fn arm_idle(&self, readers: usize) {
        let aggregate = self.aggregate_reader_count();
        self.idle.lock().on_reader_changed(readers, aggregate, Instant::now());
    }

    fn check_no_reader(&self) {
        let aggregate = self.aggregate_reader_count();
        let fire = self
            .idle
            .lock()
            .on_write(aggregate, Instant::now(), self.config.none_reader_delay);
        if !fire {
            return;
        }

        tracing::info!(
            schema = %self.schema,
            stream = %self.key,
            delay_ms = self.config.none_reader_delay.as_millis() as u64,
            "No readers"
        );
        match self.listener() {
            Some(listener) => listener.on_no_reader(self.schema, &self.key),
            None => tracing::debug!(stream = %self.key, "No listener for idle notification"),
        }
    }

    fn try_register(&self) {
        let mut registration = self.registration.lock();
        if *registration != Registration::Pending {
            return;
        }

        if let Some(registry) = &self.registry {
            let weak: Weak<dyn Any + Send + Sync> = self.weak_self.clone();
            if let Err(e) = registry.register(self.schema, &self.key, weak) {
                tracing::warn!(
                    schema = %self.schema,
                    stream = %self.key,
                    error = %e,
                    "Source rejected; packets are still fanned out but it cannot be found"
                );
                *registration = Registration::Rejected;
                return;
            }
        }
        *registration = Registration::Registered;
        drop(registration);

        if let Some(listener) = self.listener() {
            listener.on_registered(self.schema, &self.key, true);
        }
    }
}

impl<P: MediaPacket> Drop for MediaSource<P> {
    fn drop(&mut self) {
        if *self.registration.get_mut() != Registration::Registered {
            return;
        }
        if let Some(registry) = &self.registry {
            let weak: Weak<dyn Any + Send + Sync> = self.weak_self.clone();
            registry.unregister(self.schema, &self.key, &weak);
        }
        if let Some(listener) = self.listener() {
            listener.on_registered(self.schema, &self.key, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::media::{sdp, CodecId, RtpPacket, Track};

    fn packet(track_type: TrackType, sequence: u16, timestamp: u32) -> RtpPacket {
        RtpPacket {
            track_type,
            payload_type: 96,
            sequence,
            timestamp,
            ssrc: 0xBEEF,
            marker: true,
            payload: Bytes::from_static(&[0x00]),
        }
    }

    fn av_sdp() -> String {
        sdp::build(0.0, &[Track::new(CodecId::H264), Track::new(CodecId::Aac)])
    }

    fn source(registry: Option<Arc<SourceRegistry>>) -> Arc<MediaSource<RtpPacket>> {
        MediaSource::new(
            Schema::Rtsp,
            SourceKey::new("vhost", "live", "cam"),
            SourceConfig::default(),
            registry,
        )
    }

    #[derive(Default)]
    struct EventLog {
        no_reader: AtomicUsize,
        changed: parking_lot::Mutex<Vec<usize>>,
        registered: parking_lot::Mutex<Vec<bool>>,
    }

    impl MediaSourceEvent for EventLog {
        fn on_no_reader(&self, _schema: Schema, _key: &SourceKey) {
            self.no_reader.fetch_add(1, Ordering::SeqCst);
        }

        fn on_reader_changed(&self, _schema: Schema, _key: &SourceKey, readers: usize) {
            self.changed.lock().push(readers);
        }

        fn on_registered(&self, _schema: Schema, _key: &SourceKey, registered: bool) {
            self.registered.lock().push(registered);
        }
    }

    #[test]
    fn test_ring_is_lazy() {
        let source = source(None);
        assert!(source.ring().is_none());
        assert!(source.attach_reader().is_none());
        assert_eq!(source.reader_count(), 0);

        source.write(packet(TrackType::Video, 1, 0), true);
        assert!(source.ring().is_some());
    }

    #[test]
    fn test_registration_waits_for_descriptor_and_ring() {
        let registry = Arc::new(SourceRegistry::new());
        let source = source(Some(registry.clone()));
        let key = source.key().clone();

        source.set_track_info(&av_sdp()).unwrap();
        assert!(!source.is_registered());
        assert!(!registry.contains(Schema::Rtsp, &key));

        source.write(packet(TrackType::Video, 1, 0), true);
        assert!(source.is_registered());

        let found = registry.find::<RtpPacket>(Schema::Rtsp, &key).unwrap();
        assert!(Arc::ptr_eq(&found, &source));
        drop(found);

        drop(source);
        assert!(!registry.contains(Schema::Rtsp, &key));
    }

    #[test]
    fn test_registration_after_first_write() {
        let registry = Arc::new(SourceRegistry::new());
        let source = source(Some(registry.clone()));

        source.write(packet(TrackType::Video, 1, 0), true);
        assert!(!source.is_registered());

        source.set_track_info(&av_sdp()).unwrap();
        assert!(source.is_registered());
    }

    #[test]
    fn test_conflicting_source_is_not_registered() {
        let registry = Arc::new(SourceRegistry::new());
        let first = source(Some(registry.clone()));
        let second = source(Some(registry.clone()));

        for s in [&first, &second] {
            s.set_track_info(&av_sdp()).unwrap();
            s.write(packet(TrackType::Video, 1, 0), true);
        }

        assert!(first.is_registered());
        assert!(!second.is_registered());
        assert!(second.is_rejected());
        assert!(!first.is_rejected());
        drop(second);
        assert!(registry.contains(Schema::Rtsp, first.key()));
    }

    #[test]
    fn test_invalid_descriptor() {
        let source = source(None);
        assert!(source.set_track_info("garbage").is_err());
        assert!(source.track_info().is_none());
    }

    #[test]
    fn test_track_state_follows_packets() {
        let source = source(None);
        source.set_track_info(&av_sdp()).unwrap();

        source.write(packet(TrackType::Video, 10, 9000), true);
        source.write(packet(TrackType::Audio, 3, 4410), false);

        assert_eq!(source.sequence(TrackType::Video), 10);
        assert_eq!(source.sequence(TrackType::Audio), 3);
        assert_eq!(source.ssrc(TrackType::Video), 0xBEEF);
        assert_eq!(source.timestamp(Some(TrackType::Video)), 9000);
        assert_eq!(source.timestamp(Some(TrackType::Audio)), 4410);
    }

    #[test]
    fn test_track_state_ignored_before_descriptor() {
        let source = source(None);
        source.write(packet(TrackType::Video, 10, 9000), true);

        assert_eq!(source.sequence(TrackType::Video), 0);
        assert_eq!(source.timestamp(None), 0);
    }

    #[test]
    fn test_timestamp_aggregate() {
        let source = source(None);
        assert_eq!(source.timestamp(None), 0);

        source.set_track_info(&av_sdp()).unwrap();
        source.write(packet(TrackType::Video, 1, 100), true);
        source.write(packet(TrackType::Audio, 1, 250), false);

        assert_eq!(source.timestamp(None), 250);

        source.set_timestamp(7);
        assert_eq!(source.timestamp(Some(TrackType::Video)), 7);
        assert_eq!(source.timestamp(Some(TrackType::Audio)), 7);
    }

    #[test]
    fn test_timestamp_unknown_track_falls_back() {
        let source = source(None);
        let video_only = sdp::build(0.0, &[Track::new(CodecId::H264)]);
        source.set_track_info(&video_only).unwrap();
        source.write(packet(TrackType::Video, 1, 500), true);

        assert_eq!(source.timestamp(Some(TrackType::Audio)), 500);
    }

    #[test]
    fn test_descriptor_reassignment_keeps_known_tracks() {
        let source = source(None);
        let video_only = sdp::build(0.0, &[Track::new(CodecId::H264)]);
        source.set_track_info(&video_only).unwrap();
        source.write(packet(TrackType::Video, 42, 500), true);

        source.set_track_info(&av_sdp()).unwrap();
        assert_eq!(source.with_descriptor(|sdp| sdp.media.len()), Some(2));
        assert_eq!(source.sequence(TrackType::Video), 42);
        assert_eq!(source.track_types(), vec![TrackType::Video, TrackType::Audio]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reader_fires_after_grace() {
        let source = source(None);
        let listener = Arc::new(EventLog::default());
        source.set_listener(Arc::downgrade(&listener) as Weak<dyn MediaSourceEvent>);

        source.write(packet(TrackType::Video, 1, 0), true);
        let reader = source.attach_reader().unwrap();
        drop(reader);
        assert!(source.idle_state().is_pending());

        tokio::time::advance(Duration::from_millis(4000)).await;
        source.write(packet(TrackType::Video, 2, 0), false);
        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(2000)).await;
        source.write(packet(TrackType::Video, 3, 0), false);
        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 1);

        source.write(packet(TrackType::Video, 4, 0), false);
        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 1);
        assert_eq!(*listener.changed.lock(), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_before_grace_suppresses_notification() {
        let source = source(None);
        let listener = Arc::new(EventLog::default());
        source.set_listener(Arc::downgrade(&listener) as Weak<dyn MediaSourceEvent>);

        source.write(packet(TrackType::Video, 1, 0), true);
        tokio::time::advance(Duration::from_millis(3000)).await;
        let _reader = source.attach_reader().unwrap();

        tokio::time::advance(Duration::from_millis(10_000)).await;
        source.write(packet(TrackType::Video, 2, 0), false);

        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 0);
        assert_eq!(source.idle_state(), IdleState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_readers_hold_off_idle() {
        struct Fixed(usize);
        impl ReaderCounter for Fixed {
            fn total_reader_count(&self) -> usize {
                self.0
            }
        }

        let source = source(None);
        let counter = Arc::new(Fixed(2));
        source.set_reader_counter(Arc::downgrade(&counter) as Weak<dyn ReaderCounter>);
        let listener = Arc::new(EventLog::default());
        source.set_listener(Arc::downgrade(&listener) as Weak<dyn MediaSourceEvent>);

        source.write(packet(TrackType::Video, 1, 0), true);
        tokio::time::advance(Duration::from_millis(6000)).await;
        source.write(packet(TrackType::Video, 2, 0), false);

        assert_eq!(listener.no_reader.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registration_events() {
        let registry = Arc::new(SourceRegistry::new());
        let source = source(Some(registry));
        let listener = Arc::new(EventLog::default());
        source.set_listener(Arc::downgrade(&listener) as Weak<dyn MediaSourceEvent>);

        source.set_track_info(&av_sdp()).unwrap();
        source.write(packet(TrackType::Video, 1, 0), true);
        drop(source);

        assert_eq!(*listener.registered.lock(), vec![true, false]);
    }

    #[test]
    fn test_reader_detaching_after_source_drop_is_harmless() {
        let source = source(None);
        source.write(packet(TrackType::Video, 1, 0), true);
        let mut reader = source.attach_reader().unwrap();
        assert!(reader.try_recv().is_ok());

        drop(source);
        assert!(reader.try_recv().is_err());
        drop(reader);
    }
}

//! Broadcast ring implementation

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::config::RingConfig;
use super::error::{RecvError, TryRecvError};

type ReaderChanged = Box<dyn Fn(usize) + Send + Sync>;

/// Slots and cursors, guarded by one lock
struct RingState<T> {
    /// Retained items, `slots[0]` has sequence `head_seq`
    slots: VecDeque<T>,
    /// Sequence of the oldest retained item
    head_seq: u64,
    /// Sequence the next write gets
    next_seq: u64,
    /// Sequence of the most recent key point
    key_seq: Option<u64>,
    /// Reader id -> next sequence that reader will read
    cursors: HashMap<u64, u64>,
    next_reader_id: u64,
}

impl<T> RingState<T> {
    fn new() -> Self {
        Self {
            slots: VecDeque::new(),
            head_seq: 0,
            next_seq: 0,
            key_seq: None,
            cursors: HashMap::new(),
            next_reader_id: 0,
        }
    }

    fn pop_front(&mut self) {
        if self.slots.pop_front().is_some() {
            self.head_seq += 1;
        }
    }

    /// Drop what no reader needs anymore, then enforce the capacity
    fn trim(&mut self, config: &RingConfig) {
        let mut floor = self.cursors.values().copied().min().unwrap_or(self.next_seq);
        if config.cache_gop {
            if let Some(key) = self.key_seq {
                floor = floor.min(key);
            }
        }
        while self.head_seq < floor && !self.slots.is_empty() {
            self.pop_front();
        }

        if let Some(capacity) = config.capacity {
            while self.slots.len() > capacity {
                self.pop_front();
            }
        }
    }

    fn attach_position(&self, config: &RingConfig) -> u64 {
        match self.key_seq {
            Some(key) if config.cache_gop && key >= self.head_seq => key,
            _ => self.next_seq,
        }
    }
}

struct Shared<T> {
    state: Mutex<RingState<T>>,
    readers: AtomicUsize,
    closed: AtomicBool,
    notify: Notify,
    /// Whether the last reported reader count was zero
    reported_empty: Mutex<bool>,
    on_reader_changed: ReaderChanged,
    config: RingConfig,
}

impl<T> Shared<T> {
    /// Report an empty <-> non-empty transition that has not been reported yet
    ///
    /// Serialized so transitions are delivered in the order they happened;
    /// intermediate changes (1 -> 2 -> 1) collapse into nothing.
    fn dispatch_transition(&self) {
        let mut reported_empty = self.reported_empty.lock();
        let count = self.readers.load(Ordering::Acquire);
        let empty = count == 0;
        if *reported_empty != empty {
            *reported_empty = empty;
            tracing::trace!(readers = count, "Ring reader transition");
            (self.on_reader_changed)(count);
        }
    }
}

/// One writer, many independent readers
///
/// The writer never waits on readers: each reader keeps its own cursor and
/// copies items out under a short lock. Dropping the ring closes it.
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring
    ///
    /// `on_reader_changed` runs inline whenever the reader count goes from
    /// zero to non-zero or back, with the new count. It must not attach or
    /// detach readers on this ring.
    pub fn new(config: RingConfig, on_reader_changed: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RingState::new()),
                readers: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                notify: Notify::new(),
                reported_empty: Mutex::new(true),
                on_reader_changed: Box::new(on_reader_changed),
                config,
            }),
        }
    }

    /// Publish an item to every reader
    pub fn write(&self, item: T, is_key: bool) {
        {
            let mut state = self.shared.state.lock();
            let seq = state.next_seq;
            if is_key {
                state.key_seq = Some(seq);
            }
            state.slots.push_back(item);
            state.next_seq += 1;
            state.trim(&self.shared.config);
        }

        self.shared.notify.notify_waiters();
        self.shared.dispatch_transition();
    }

    /// Attach a new reader
    ///
    /// The reader starts at the most recent key point when the GOP cache is
    /// enabled and that point is still retained, otherwise at the head.
    pub fn attach(&self) -> RingReader<T> {
        let (id, cursor) = {
            let mut state = self.shared.state.lock();
            let cursor = state.attach_position(&self.shared.config);
            let id = state.next_reader_id;
            state.next_reader_id += 1;
            state.cursors.insert(id, cursor);
            self.shared.readers.fetch_add(1, Ordering::AcqRel);
            (id, cursor)
        };

        self.shared.dispatch_transition();

        RingReader {
            id,
            cursor,
            lagged: 0,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of attached readers
    pub fn reader_count(&self) -> usize {
        self.shared.readers.load(Ordering::Acquire)
    }

    /// Number of retained items
    pub fn len(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of items ever written
    pub fn written(&self) -> u64 {
        self.shared.state.lock().next_seq
    }

    pub fn config(&self) -> &RingConfig {
        &self.shared.config
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
    }
}

/// A reader cursor on a [`RingBuffer`]
///
/// Dropping the reader detaches it.
pub struct RingReader<T> {
    id: u64,
    cursor: u64,
    lagged: u64,
    shared: Arc<Shared<T>>,
}

impl<T: Clone> RingReader<T> {
    /// Take the next item without waiting
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let mut state = self.shared.state.lock();

        if self.cursor < state.head_seq {
            let skipped = state.head_seq - self.cursor;
            self.cursor = state.head_seq;
            self.lagged += skipped;
            state.cursors.insert(self.id, self.cursor);
            return Err(TryRecvError::Lagged(skipped));
        }

        if self.cursor < state.next_seq {
            let index = (self.cursor - state.head_seq) as usize;
            let item = state.slots[index].clone();
            self.cursor += 1;
            state.cursors.insert(self.id, self.cursor);
            return Ok(item);
        }

        if self.shared.closed.load(Ordering::Acquire) {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Wait for the next item
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        loop {
            let shared = Arc::clone(&self.shared);
            // Registered before checking so a write in between is not missed
            let notified = shared.notify.notified();

            match self.try_recv() {
                Ok(item) => return Ok(item),
                Err(TryRecvError::Empty) => notified.await,
                Err(TryRecvError::Lagged(n)) => return Err(RecvError::Lagged(n)),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }

    /// Items written but not read yet by this reader
    pub fn pending(&self) -> u64 {
        let state = self.shared.state.lock();
        state.next_seq.saturating_sub(self.cursor.max(state.head_seq))
    }

    /// Total items this reader skipped because it fell behind
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Detach from the ring
    pub fn detach(self) {}
}

impl<T> Drop for RingReader<T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.cursors.remove(&self.id);
            self.shared.readers.fetch_sub(1, Ordering::AcqRel);
        }
        self.shared.dispatch_transition();
    }
}

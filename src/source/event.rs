//! Listener interfaces of a media source

use crate::media::{Schema, SourceKey};

/// Receives lifecycle and reader events of media sources
///
/// Held weakly by the sources; a listener that has been dropped simply
/// stops receiving events. Callbacks run inline on the thread that caused
/// the event (the writer, or whoever attached/detached a reader), so they
/// must be cheap and must not attach or detach readers themselves.
pub trait MediaSourceEvent: Send + Sync {
    /// The grace period elapsed without any reader
    fn on_no_reader(&self, _schema: Schema, _key: &SourceKey) {}

    /// The reader count went from zero to non-zero or back
    fn on_reader_changed(&self, _schema: Schema, _key: &SourceKey, _readers: usize) {}

    /// The source became discoverable (`true`) or was withdrawn (`false`)
    fn on_registered(&self, _schema: Schema, _key: &SourceKey, _registered: bool) {}
}

/// Something that knows the total reader count across sibling sources
///
/// Idle detection of a source consults this aggregate so one protocol
/// losing its last reader does not mark the stream idle while another
/// protocol still has readers.
pub trait ReaderCounter: Send + Sync {
    fn total_reader_count(&self) -> usize;
}

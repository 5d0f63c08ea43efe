//! Ring reader error types

/// Error returned by [`RingReader::try_recv`](super::RingReader::try_recv)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing new has been written yet
    Empty,
    /// The reader fell behind a bounded ring and skipped this many items
    Lagged(u64),
    /// The ring was dropped and every remaining item has been read
    Closed,
}

/// Error returned by [`RingReader::recv`](super::RingReader::recv)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The reader fell behind a bounded ring and skipped this many items
    Lagged(u64),
    /// The ring was dropped and every remaining item has been read
    Closed,
}

impl std::fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "Ring empty"),
            TryRecvError::Lagged(n) => write!(f, "Reader lagged, {} items skipped", n),
            TryRecvError::Closed => write!(f, "Ring closed"),
        }
    }
}

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvError::Lagged(n) => write!(f, "Reader lagged, {} items skipped", n),
            RecvError::Closed => write!(f, "Ring closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}

impl std::error::Error for RecvError {}

//! Media sources
//!
//! A media source is one protocol's view of a live stream: it owns the
//! broadcast ring the protocol's packets are fanned out on, tracks the
//! latest sequence/timestamp/ssrc of every track, and reports when nobody
//! has been reading it for longer than the configured grace period.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<MediaSource<P>>
//!                 ┌──────────────────────────┐
//!   write(P) ───► │ tracks: descriptor +     │
//!                 │         TrackState       │      ┌──────────────┐
//!                 │ ring: OnceLock<Ring> ────┼────► │ RingReader   │ ─► session
//!                 │ idle: IdleState          │      └──────────────┘
//!                 └──────┬───────────▲───────┘
//!                        │ register  │ Weak (reader-count callback)
//!                        ▼           │
//!                  SourceRegistry    RingBuffer
//! ```
//!
//! The ring's reader-count callback only holds a `Weak` back to its source,
//! so a callback arriving after the source was torn down does nothing.

pub mod config;
pub mod error;
pub mod event;
pub mod idle;
pub mod media_source;
pub mod registry;
pub mod track;

pub use config::SourceConfig;
pub use error::{DescriptorError, RegistryError};
pub use event::{MediaSourceEvent, ReaderCounter};
pub use idle::IdleState;
pub use media_source::MediaSource;
pub use registry::SourceRegistry;
pub use track::{MediaPacket, SessionDescriptor, TrackState};

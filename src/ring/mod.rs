//! Broadcast ring for one-writer, many-reader fan-out
//!
//! Every media source publishes its packets into a ring. Transport sessions
//! attach readers, each with an independent cursor, and pull packets at
//! their own pace. The writer is never blocked by a slow reader.
//!
//! ```text
//!                       write(item, is_key)
//!                              │
//!                              ▼
//!   head_seq ┌───┬───┬───┬───┬───┬───┐ next_seq
//!            │ 0 │ 1 │ K │ 3 │ 4 │ 5 │
//!            └───┴───┴───┴───┴───┴───┘
//!                  ▲   ▲           ▲
//!           reader B   new readers  reader A
//!                      start at K
//! ```
//!
//! # Retention
//!
//! A bounded ring drops its oldest items; a reader that was still behind
//! them gets `Lagged(n)` once and continues from the oldest retained item.
//! An unbounded ring keeps every item some reader has not consumed yet.
//! With the GOP cache enabled, the items since the last key point are kept
//! so a late joiner can start decoding from a clean point.
//!
//! # Reader count notifications
//!
//! The callback given at construction fires on the 0 -> N and N -> 0
//! transitions only, synchronously on the thread that caused them.

pub mod buffer;
pub mod config;
pub mod error;

pub use buffer::{RingBuffer, RingReader};
pub use config::RingConfig;
pub use error::{RecvError, TryRecvError};

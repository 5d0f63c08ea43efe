//! Delayed "no readers" detection
//!
//! ```text
//!            readers -> 0 (aggregate 0)
//!   Active ─────────────────────────────► Pending { since }
//!     ▲  ◄─────────────────────────────────   │
//!     │     readers > 0, or a write sees      │ write after grace period
//!     │     aggregate readers > 0             ▼
//!     └────────── behaves like Active ──── Fired
//! ```
//!
//! There is no timer: expiry is evaluated by the writer on every write. A
//! stream that is not being written has no outbound traffic to protect.

use std::time::Duration;

use tokio::time::Instant;

/// Idle detection state of a media source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Readers present, or nothing to report
    Active,
    /// No readers since `since`; fires once the grace period has elapsed
    Pending { since: Instant },
    /// The notification fired for the current episode
    Fired,
}

impl Default for IdleState {
    fn default() -> Self {
        IdleState::Active
    }
}

impl IdleState {
    /// Handle a reader count transition
    ///
    /// `readers` is the source's own count, `aggregate` the count across
    /// sibling sources.
    pub fn on_reader_changed(&mut self, readers: usize, aggregate: usize, now: Instant) {
        if readers != 0 || aggregate != 0 {
            *self = IdleState::Active;
        } else {
            *self = IdleState::Pending { since: now };
        }
    }

    /// Evaluate on a write; returns `true` exactly once per pending episode
    /// when the notification must fire
    pub fn on_write(&mut self, aggregate: usize, now: Instant, grace: Duration) -> bool {
        let IdleState::Pending { since } = *self else {
            return false;
        };

        if aggregate != 0 {
            *self = IdleState::Active;
            return false;
        }

        if now.saturating_duration_since(since) > grace {
            *self = IdleState::Fired;
            return true;
        }
        false
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, IdleState::Pending { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(5000);

    #[test]
    fn test_zero_readers_enters_pending() {
        let now = Instant::now();
        let mut state = IdleState::default();

        state.on_reader_changed(0, 0, now);
        assert_eq!(state, IdleState::Pending { since: now });
    }

    #[test]
    fn test_aggregate_readers_keep_active() {
        let mut state = IdleState::default();
        state.on_reader_changed(0, 2, Instant::now());
        assert_eq!(state, IdleState::Active);
    }

    #[test]
    fn test_fires_once_after_grace() {
        let start = Instant::now();
        let mut state = IdleState::default();
        state.on_reader_changed(0, 0, start);

        assert!(!state.on_write(0, start + Duration::from_millis(4000), GRACE));
        assert!(state.is_pending());
        assert!(state.on_write(0, start + Duration::from_millis(6000), GRACE));
        assert_eq!(state, IdleState::Fired);
        assert!(!state.on_write(0, start + Duration::from_millis(9000), GRACE));
    }

    #[test]
    fn test_exactly_grace_does_not_fire() {
        let start = Instant::now();
        let mut state = IdleState::default();
        state.on_reader_changed(0, 0, start);

        assert!(!state.on_write(0, start + GRACE, GRACE));
    }

    #[test]
    fn test_reader_attach_cancels_pending() {
        let start = Instant::now();
        let mut state = IdleState::default();
        state.on_reader_changed(0, 0, start);
        state.on_reader_changed(1, 1, start + Duration::from_millis(1000));

        assert_eq!(state, IdleState::Active);
        assert!(!state.on_write(1, start + Duration::from_millis(9000), GRACE));
    }

    #[test]
    fn test_write_with_aggregate_readers_cancels_pending() {
        let start = Instant::now();
        let mut state = IdleState::default();
        state.on_reader_changed(0, 0, start);

        assert!(!state.on_write(3, start + Duration::from_millis(9000), GRACE));
        assert_eq!(state, IdleState::Active);
    }

    #[test]
    fn test_fired_rearms() {
        let start = Instant::now();
        let mut state = IdleState::Fired;

        state.on_reader_changed(0, 0, start);
        assert!(state.is_pending());
        assert!(state.on_write(0, start + Duration::from_millis(5001), GRACE));
    }
}

//! Request-id counter for RPC calls.
//!
//! # How request ids are used (for beginners)
//!
//! Every request carries an integer id, and the daemon echoes that id in the
//! matching response or error.  The client sends one request at a time, so
//! the id mostly serves as a sanity check: a reply carrying a different id
//! means the stream is out of step and the session cannot be trusted.
//!
//! Ids are never reused within one client, not even across reconnects, so
//! a late reply to a request from an earlier connection cannot be mistaken
//! for a reply to the current one.

use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonically increasing source of request ids.
///
/// The counter starts at 1 and is incremented *before* use, so the first id
/// handed out is 2.
///
/// # Examples
///
/// ```rust
/// use deluge_core::protocol::RequestIdCounter;
///
/// let ids = RequestIdCounter::new();
/// assert_eq!(ids.next(), 2);
/// assert_eq!(ids.next(), 3);
/// assert_eq!(ids.current(), 3);
/// ```
#[derive(Debug)]
pub struct RequestIdCounter {
    inner: AtomicI64,
}

impl RequestIdCounter {
    /// Value the counter holds before any request is sent.
    pub const INITIAL: i64 = 1;

    pub fn new() -> Self {
        Self {
            inner: AtomicI64::new(Self::INITIAL),
        }
    }

    /// Increments the counter and returns the new value.
    ///
    /// `Ordering::Relaxed` is enough: the id orders nothing but itself.
    pub fn next(&self) -> i64 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// The id most recently handed out (or [`Self::INITIAL`] if none was).
    pub fn current(&self) -> i64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

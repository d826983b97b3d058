//! Commit acknowledgement and the visibility watermark.
//!
//! Writers reserve disjoint row windows, fill columns, then acknowledge the
//! window here. The watermark is the largest contiguous acked prefix: rows
//! below it are fully written in every column and safe to read. Windows may
//! ack out of order; a hole keeps the watermark parked until it fills.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks acked windows and publishes the contiguous-prefix watermark.
///
/// `watermark()` is a single atomic load, safe to call on every read path.
/// The release store under the lock pairs with that acquire load, so a
/// reader that observes watermark `w` also observes every column write made
/// before the acks covering `[0, w)`.
#[derive(Debug, Default)]
pub struct AckResponder {
    state: Mutex<AckState>,
    watermark: AtomicUsize,
}

#[derive(Debug, Default)]
struct AckState {
    watermark: usize,
    /// Acked windows above the watermark, keyed by begin. Disjoint by the
    /// reservation contract.
    pending: BTreeMap<usize, usize>,
}

impl AckResponder {
    /// Creates a tracker with an empty prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledges the window `[begin, end)` as fully written.
    ///
    /// # Panics
    ///
    /// Panics if the window is inverted, overlaps the already-acked prefix,
    /// or was acked before. All of these are reservation-contract breaches.
    pub fn ack(&self, begin: usize, end: usize) {
        assert!(begin <= end, "inverted ack window [{begin}, {end})");
        if begin == end {
            return;
        }
        let mut state = self.state.lock();
        assert!(
            begin >= state.watermark,
            "window [{begin}, {end}) acked twice or overlaps the watermark {}",
            state.watermark
        );
        let displaced = state.pending.insert(begin, end);
        assert!(
            displaced.is_none(),
            "window starting at {begin} acked twice"
        );
        while let Some((&b, &e)) = state.pending.first_key_value() {
            if b != state.watermark {
                break;
            }
            state.pending.remove(&b);
            state.watermark = e;
        }
        self.watermark.store(state.watermark, Ordering::Release);
    }

    /// The largest contiguous acked prefix.
    #[must_use]
    pub fn watermark(&self) -> usize {
        self.watermark.load(Ordering::Acquire)
    }
}

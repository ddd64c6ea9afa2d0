use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::TraceEventId;

/// Allocates event ids from a shared counter.
///
/// Ids increase monotonically in the order the counter is incremented
/// and are never 0, as that is used to indicate "no event" in the protocol.
/// Share one allocator (via `Arc`) between all logs that must not reuse ids.
#[derive(Debug)]
pub struct EventIdAllocator {
    next: AtomicU64,
}

impl Default for EventIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an allocator whose first returned id is `first`
    /// (or 1, if `first` is 0).
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Returns the next event id.
    #[inline]
    pub fn next_id(&self) -> TraceEventId {
        let mut id = self.next.fetch_add(1, Ordering::SeqCst);
        if id == 0 {
            // The counter wrapped around; draw again.
            id = self.next.fetch_add(1, Ordering::SeqCst);
        }
        TraceEventId(id)
    }
}

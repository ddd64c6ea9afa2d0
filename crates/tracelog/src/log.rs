use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use serde::Deserialize;

use crate::eventbuf::{signed_to_unsigned_i64, EventBuffer};
use crate::eventid::EventIdAllocator;
use crate::model::{SpanKey, TraceEventId};
use crate::protocol::{EventType, HEADER_SIZE};
use crate::time_anchor::TimeAnchor;

/// Controls how the log's buffer storage is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// The unit, in bytes, that the capacity limits are expressed in.
    pub growth_unit: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            growth_unit: 10 << 20,
        }
    }
}

impl BufferConfig {
    pub fn with_growth_unit(growth_unit: usize) -> Self {
        Self { growth_unit }
    }

    /// Buffers whose capacity exceeds this are replaced when cleared.
    pub fn max_capacity(&self) -> usize {
        self.growth_unit.saturating_mul(100)
    }

    /// Capacity of a buffer allocated to replace an oversized one.
    pub fn initial_capacity(&self) -> usize {
        self.growth_unit.saturating_mul(10)
    }
}

/// A finished trace event, ready to be added to a [`Log`].
#[derive(Debug)]
pub struct Event {
    pub typ: EventType,
    pub span: SpanKey,
    pub data: EventBuffer,
}

/// The producer-facing side of a trace log.
pub trait Logger: Send + Sync {
    /// Adds an event to the log, returning its id.
    /// Returns [`TraceEventId::NONE`] if the event was dropped.
    fn add(&self, event: Event) -> TraceEventId;

    /// Marks the log as done. No more data is expected after this.
    fn mark_done(&self);
}

#[derive(Debug)]
struct LogState {
    data: BytesMut,
    done: bool,
}

/// An append-only buffer of encoded trace events.
///
/// Any number of producers can [`add`](Log::add) events concurrently,
/// while a consumer drains the buffer using
/// [`wait_and_clear`](Log::wait_and_clear) or [`get_and_clear`](Log::get_and_clear).
#[derive(Debug)]
pub struct Log {
    state: Mutex<LogState>,
    cond: Condvar,
    ids: Arc<EventIdAllocator>,
    anchor: TimeAnchor,
    config: BufferConfig,

    /// Largest payload accepted by `add`. Bounded by the header's length field.
    max_payload_len: u32,
}

impl Default for Log {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

impl Log {
    pub fn new(config: BufferConfig) -> Self {
        Self::with_event_ids(config, Arc::new(EventIdAllocator::new()))
    }

    /// Creates a log that allocates event ids from `ids`,
    /// which may be shared with other logs.
    pub fn with_event_ids(config: BufferConfig, ids: Arc<EventIdAllocator>) -> Self {
        Self {
            state: Mutex::new(LogState {
                data: BytesMut::new(),
                done: false,
            }),
            cond: Condvar::new(),
            ids,
            anchor: TimeAnchor::new(),
            config,
            max_payload_len: u32::MAX,
        }
    }

    /// Lowers the payload limit so the drop path can run without huge payloads.
    #[cfg(test)]
    pub(crate) fn with_max_payload_len(mut self, max: u32) -> Self {
        self.max_payload_len = max;
        self
    }

    /// The anchor that event timestamps are relative to.
    pub fn time_anchor(&self) -> &TimeAnchor {
        &self.anchor
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Adds a new event to the log.
    pub fn add(&self, event: Event) -> TraceEventId {
        let data = event.data.as_ref();
        let Some(ln) = payload_len(data.len(), self.max_payload_len) else {
            log::error!(
                "trace event too large ({} bytes), dropping (type={:?})",
                data.len(),
                event.typ
            );
            return TraceEventId::NONE;
        };

        let id = self.ids.next_id();
        let ts = signed_to_unsigned_i64(self.anchor.nanotime(Instant::now()));

        let mut record = Vec::with_capacity(HEADER_SIZE + data.len());
        record.extend_from_slice(&header(event.typ, id, ts, event.span, ln));
        record.extend_from_slice(data);

        self.lock().data.extend_from_slice(&record);
        self.cond.notify_all();

        id
    }

    /// Blocks until the log is marked as done.
    pub fn wait_until_done(&self) {
        let mut state = self.lock();
        while !state.done {
            state = self.wait(state);
        }
    }

    /// Waits for at least `dur` to pass or for the log to be done.
    ///
    /// The elapsed time is only checked when the log is written to,
    /// so if no trace data is being written it can block for longer than `dur`.
    /// It reports whether the log is done at the time of returning.
    pub fn wait_at_least(&self, dur: Duration) -> bool {
        let start = Instant::now();
        let mut state = self.lock();
        while !state.done && start.elapsed() < dur {
            state = self.wait(state);
        }
        state.done
    }

    /// Blocks for data to arrive and then returns the data
    /// and whether the log has been completed. It also clears the log from
    /// any data it returns.
    pub fn wait_and_clear(&self) -> (Bytes, bool) {
        let mut state = self.lock();
        while state.data.is_empty() && !state.done {
            state = self.wait(state);
        }
        let done = state.done;
        let data = self.clear_data_buf(&mut state);
        (data, done)
    }

    /// Gets the data and clears the buffer without blocking.
    pub fn get_and_clear(&self) -> (Bytes, bool) {
        let mut state = self.lock();
        let done = state.done;
        let data = self.clear_data_buf(&mut state);
        (data, done)
    }

    /// Marks the log as done, waking up all waiters.
    pub fn mark_done(&self) {
        self.lock().done = true;
        self.cond.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Number of bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.lock().data.len()
    }

    /// Capacity of the current buffer storage.
    pub fn capacity(&self) -> usize {
        self.lock().data.capacity()
    }

    /// Takes the buffered data, either allocating a new buffer
    /// or by detaching the data from the current one (keeping its remaining capacity).
    fn clear_data_buf(&self, state: &mut LogState) -> Bytes {
        // Replace the buffer if it has grown too large,
        // so its storage is released once the caller drops the data.
        let max = self.config.max_capacity();
        if state.data.capacity() > max {
            log::debug!(
                "trace log buffer capacity {} exceeds {}, reallocating",
                state.data.capacity(),
                max
            );
            let fresh = BytesMut::with_capacity(self.config.initial_capacity());
            std::mem::replace(&mut state.data, fresh).freeze()
        } else {
            state.data.split().freeze()
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // The state is only ever mutated with complete records,
        // so it's consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LogState>) -> MutexGuard<'a, LogState> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

impl Logger for Log {
    fn add(&self, event: Event) -> TraceEventId {
        Log::add(self, event)
    }

    fn mark_done(&self) {
        Log::mark_done(self)
    }
}

/// A handle to a log that may be absent.
///
/// All operations on an absent log are no-ops returning neutral values,
/// so callers never need to check whether tracing is enabled.
#[derive(Debug, Clone, Default)]
pub struct LogHandle {
    log: Option<Arc<Log>>,
}

impl From<Arc<Log>> for LogHandle {
    fn from(log: Arc<Log>) -> Self {
        Self { log: Some(log) }
    }
}

impl LogHandle {
    pub fn new(log: Arc<Log>) -> Self {
        log.into()
    }

    pub fn noop() -> Self {
        Self { log: None }
    }

    pub fn log(&self) -> Option<&Arc<Log>> {
        self.log.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    pub fn add(&self, event: Event) -> TraceEventId {
        match &self.log {
            Some(log) => log.add(event),
            None => TraceEventId::NONE,
        }
    }

    pub fn mark_done(&self) {
        if let Some(log) = &self.log {
            log.mark_done();
        }
    }

    pub fn wait_until_done(&self) {
        if let Some(log) = &self.log {
            log.wait_until_done();
        }
    }

    pub fn wait_at_least(&self, dur: Duration) -> bool {
        match &self.log {
            Some(log) => log.wait_at_least(dur),
            None => false,
        }
    }

    pub fn wait_and_clear(&self) -> (Bytes, bool) {
        match &self.log {
            Some(log) => log.wait_and_clear(),
            None => (Bytes::new(), false),
        }
    }

    pub fn get_and_clear(&self) -> (Bytes, bool) {
        match &self.log {
            Some(log) => log.get_and_clear(),
            None => (Bytes::new(), false),
        }
    }
}

impl Logger for LogHandle {
    fn add(&self, event: Event) -> TraceEventId {
        LogHandle::add(self, event)
    }

    fn mark_done(&self) {
        LogHandle::mark_done(self)
    }
}

/// Returns the payload length as stored in the header,
/// or `None` if it exceeds `max`.
#[inline]
pub(crate) fn payload_len(len: usize, max: u32) -> Option<u32> {
    u32::try_from(len).ok().filter(|&n| n <= max)
}

/// Encodes the fixed-size header that precedes each event's payload.
fn header(
    typ: EventType,
    id: TraceEventId,
    ts: u64,
    span: SpanKey,
    data_len: u32,
) -> [u8; HEADER_SIZE] {
    let mut h = [0u8; HEADER_SIZE];

    // Event type, 1 byte
    h[0] = typ as u8;
    // Event ID, 8 bytes
    h[1..9].copy_from_slice(&id.0.to_le_bytes());
    // Timestamp, 8 bytes
    h[9..17].copy_from_slice(&ts.to_le_bytes());
    // Trace ID, 16 bytes
    h[17..33].copy_from_slice(&span.0 .0);
    // Span ID, 8 bytes
    h[33..41].copy_from_slice(&span.1 .0);
    // Event data length, 4 bytes
    h[41..45].copy_from_slice(&data_len.to_le_bytes());

    h
}

//! In-memory trace event log for Encore's binary trace protocol.
//!
//! Producers encode event payloads with an [`EventBuffer`] and add them to a
//! shared [`Log`], which frames each payload with a fixed-size header and
//! appends it to a single buffer. A consumer drains the buffer with
//! [`Log::wait_and_clear`] or [`Log::get_and_clear`] and forwards the bytes.
//!
//! # Protocol
//!
//! Each trace event is encoded as a 45-byte header followed by a variable-length body:
//!
//! | Offset | Size | Field       |
//! |--------|------|-------------|
//! | 0      | 1    | Event type  |
//! | 1      | 8    | Event ID    |
//! | 9      | 8    | Nanotime    |
//! | 17     | 16   | Trace ID    |
//! | 33     | 8    | Span ID     |
//! | 41     | 4    | Data length |
//! | 45     | N    | Event data  |
//!
//! All integers are little-endian. The nanotime is zigzag-encoded and
//! relative to the log's [`TimeAnchor`].
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use encore_tracelog::{BufferConfig, Event, EventBuffer, EventType, Log, SpanId, TraceId};
//!
//! let log = Arc::new(Log::new(BufferConfig::default()));
//!
//! let mut data = EventBuffer::with_capacity(16);
//! data.str("hello");
//! let id = log.add(Event {
//!     typ: EventType::LogMessage,
//!     span: TraceId([1; 16]).with_span(SpanId([2; 8])),
//!     data,
//! });
//! assert!(!id.is_none());
//!
//! log.mark_done();
//! let (bytes, done) = log.wait_and_clear();
//! assert_eq!(bytes.len(), 45 + 6);
//! assert!(done);
//! ```

mod eventbuf;
mod eventid;
mod log;
pub mod model;
pub mod protocol;
pub mod record;
pub mod stack;
mod time_anchor;

#[cfg(test)]
mod log_tests;

pub use eventbuf::EventBuffer;
pub use eventid::EventIdAllocator;
pub use log::{BufferConfig, Event, Log, LogHandle, Logger};
pub use model::{SpanId, SpanKey, TraceEventId, TraceId};
pub use protocol::EventType;
pub use time_anchor::TimeAnchor;

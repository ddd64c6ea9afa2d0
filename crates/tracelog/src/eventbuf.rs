use std::fmt::Display;

use bytes::{BufMut, Bytes, BytesMut};

use crate::model::{SpanKey, TraceEventId};
use crate::stack::{Frame, Stack};

/// Message written in place of errors whose message is empty.
const UNKNOWN_ERROR: &str = "unknown error";

/// Maximum number of frames encoded for a stack, as the count is a single byte.
const MAX_ENCODED_FRAMES: usize = 0xFF;

/// A buffer for encoding trace events.
///
/// Every write appends to the buffer and none of them fail:
/// out-of-range values are clamped or truncated instead.
#[derive(Debug, Default)]
pub struct EventBuffer {
    scratch: [u8; 10],
    buf: BytesMut,
}

impl AsRef<[u8]> for EventBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(size: usize) -> Self {
        EventBuffer {
            scratch: [0; 10],
            buf: BytesMut::with_capacity(size),
        }
    }

    /// Consumes the buffer, returning the encoded bytes.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards the encoded data, keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Writes a single byte.
    #[inline]
    pub fn byte(&mut self, byte: u8) {
        self.buf.reserve(1);
        self.buf.put_u8(byte);
    }

    /// Writes a known number of bytes.
    #[inline]
    pub fn bytes<const N: usize>(&mut self, bytes: &[u8; N]) {
        self.buf.reserve(N);
        self.buf.put_slice(bytes);
    }

    /// Writes a byte slice as-is, without a length prefix.
    #[inline]
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Ensures the buffer has enough capacity for `additional` bytes.
    /// Used to avoid additional allocations.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    /// Writes a variable-length string.
    #[inline]
    pub fn str<S: AsRef<str>>(&mut self, str: S) {
        self.byte_string(str.as_ref().as_bytes());
    }

    /// Writes a variable-length byte string.
    #[inline]
    pub fn byte_string(&mut self, bytes: &[u8]) {
        // 10 bytes is the maximum length of a uvarint.
        self.buf.reserve(10 + bytes.len());

        self.uvarint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a variable-length truncated byte string.
    /// If truncation is necessary, the `truncation_suffix` is appended to the end of the string,
    /// leading to the final length being `max_len + truncation_suffix.len()`.
    #[inline]
    pub fn truncated_byte_string(
        &mut self,
        bytes: &[u8],
        max_len: usize,
        truncation_suffix: &[u8],
    ) {
        if bytes.len() <= max_len {
            self.byte_string(bytes);
        } else {
            let combined_len = max_len + truncation_suffix.len();
            self.uvarint(combined_len as u64);
            self.buf.reserve(combined_len);
            self.buf.put_slice(&bytes[..max_len]);
            self.buf.put_slice(truncation_suffix);
        }
    }

    /// Writes a boolean as a single byte.
    #[inline]
    pub fn bool(&mut self, b: bool) {
        self.byte(if b { 1 } else { 0 });
    }

    /// Writes the current system time.
    #[inline]
    pub fn now(&mut self) {
        self.time(&chrono::Utc::now());
    }

    /// Writes a system time. Times before the Unix epoch are encoded
    /// with negative seconds.
    #[inline]
    pub fn system_time(&mut self, time: std::time::SystemTime) {
        self.time(&chrono::DateTime::<chrono::Utc>::from(time));
    }

    /// Writes an UTC timestamp as Unix seconds followed by the nanosecond fraction.
    #[inline]
    pub fn time(&mut self, time: &chrono::DateTime<chrono::Utc>) {
        self.buf.reserve(8 + 4);
        self.i64(time.timestamp());
        // Leap seconds are represented as nanos >= 1e9, which still fits an i32.
        self.i32(time.timestamp_subsec_nanos() as i32);
    }

    /// Writes a variable-length signed integer.
    #[inline]
    pub fn ivarint<I: Into<i64>>(&mut self, i: I) {
        self.uvarint(signed_to_unsigned_i64(i.into()));
    }

    /// Writes a variable-length unsigned integer.
    #[inline]
    pub fn uvarint<U: Into<u64>>(&mut self, u: U) {
        let mut u: u64 = u.into();
        let mut i = 0;
        while u >= 0x80 {
            self.scratch[i] = (u as u8) | 0x80;
            u >>= 7;
            i += 1;
        }
        self.scratch[i] = u as u8;
        i += 1;
        self.buf.extend_from_slice(&self.scratch[..i]);
    }

    /// Writes a float, always as 4 bytes.
    #[inline]
    pub fn f32(&mut self, f: f32) {
        self.u32(f.to_bits());
    }

    /// Writes a float, always as 8 bytes.
    #[inline]
    pub fn f64(&mut self, f: f64) {
        self.u64(f.to_bits());
    }

    /// Writes a signed integer, always as 8 bytes.
    #[inline]
    pub fn i64(&mut self, i: i64) {
        self.u64(signed_to_unsigned_i64(i));
    }

    /// Writes an unsigned integer, always as 8 bytes.
    #[inline]
    pub fn u64(&mut self, u: u64) {
        let data: [u8; 8] = u.to_le_bytes();
        self.buf.extend_from_slice(&data);
    }

    /// Writes a signed integer, always as 4 bytes.
    #[inline]
    pub fn i32(&mut self, i: i32) {
        self.u32(signed_to_unsigned_i32(i));
    }

    /// Writes an unsigned integer, always as 4 bytes.
    #[inline]
    pub fn u32(&mut self, u: u32) {
        let data: [u8; 4] = u.to_le_bytes();
        self.buf.extend_from_slice(&data);
    }

    /// Writes a duration.
    #[inline]
    pub fn duration(&mut self, duration: std::time::Duration) {
        // The trace protocol only supports durations that fit in an i64.
        // If the duration exceeds that, truncate it to the maximum value.
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.ivarint(nanos);
    }

    /// Writes a signed duration, clamped to the i64 nanosecond range.
    #[inline]
    pub fn signed_duration(&mut self, duration: chrono::Duration) {
        let nanos = match duration.num_nanoseconds() {
            Some(nanos) => nanos,
            None if duration < chrono::Duration::zero() => i64::MIN,
            None => i64::MAX,
        };
        self.ivarint(nanos);
    }

    /// Writes an error message. `None` is written as the empty string.
    #[inline]
    pub fn err<E: Display + ?Sized>(&mut self, err: Option<&E>) {
        match err {
            Some(err) => self.err_msg(err),
            None => self.str(""),
        }
    }

    /// Writes an error message followed by its stack.
    /// If the stack is not available an empty stack is written.
    #[inline]
    pub fn err_with_stack<E: Display + ?Sized>(
        &mut self,
        err: Option<&E>,
        stack: Option<&Stack>,
    ) {
        match err {
            Some(err) => {
                self.err_msg(err);
                match stack {
                    Some(stack) => self.stack(stack),
                    None => self.byte(0),
                }
            }
            None => self.str(""),
        }
    }

    fn err_msg<E: Display + ?Sized>(&mut self, err: &E) {
        let msg = err.to_string();
        if msg.is_empty() {
            self.str(UNKNOWN_ERROR);
        } else {
            self.str(&msg);
        }
    }

    /// Writes an event id.
    #[inline]
    pub fn event_id(&mut self, id: TraceEventId) {
        self.uvarint(id.0);
    }

    /// Writes an optional event id, using 0 for "no event".
    #[inline]
    pub fn opt_event_id(&mut self, id: Option<TraceEventId>) {
        self.event_id(id.unwrap_or(TraceEventId::NONE));
    }

    /// Writes an optional string. Absent strings are written as the empty string.
    #[inline]
    pub fn opt_str(&mut self, s: Option<&str>) {
        self.str(s.unwrap_or(""));
    }

    /// Writes an optional byte string. Absent byte strings are written as empty.
    #[inline]
    pub fn opt_byte_string(&mut self, s: Option<&[u8]>) {
        self.byte_string(s.unwrap_or(&[]));
    }

    /// Writes an optional unsigned integer. Absent values are written as 0.
    #[inline]
    pub fn opt_uvarint(&mut self, u: Option<u64>) {
        self.uvarint(u.unwrap_or(0));
    }

    /// Writes a span key, or all zeroes if the key is absent.
    pub fn span_key(&mut self, key: Option<SpanKey>) {
        self.reserve(16 + 8);
        match key {
            Some(key) => {
                self.bytes(&key.0 .0);
                self.bytes(&key.1 .0);
            }
            None => {
                self.bytes(&[0; 16]);
                self.bytes(&[0; 8]);
            }
        }
    }

    /// Writes a stack in program counter form.
    ///
    /// Each frame is written as the difference to the previous frame's
    /// offset-adjusted program counter, as consecutive frames tend to be close.
    pub fn stack(&mut self, stack: &Stack) {
        let n = stack.frames.len().min(MAX_ENCODED_FRAMES);
        self.byte(n as u8);
        if n == 0 {
            return;
        }

        self.reserve(n * 3);
        let mut prev: i64 = 0;
        for &pc in &stack.frames[..n] {
            let p = pc.wrapping_sub(stack.off) as i64;
            self.ivarint(p.wrapping_sub(prev));
            prev = p;
        }
    }

    /// Writes a stack in symbolized form.
    pub fn formatted_stack(&mut self, frames: &[Frame]) {
        let n = frames.len().min(MAX_ENCODED_FRAMES);
        self.byte(n as u8);

        for f in &frames[..n] {
            self.str(&f.file);
            self.uvarint(f.line);
            self.str(&f.func);
        }
    }
}

#[inline]
pub(crate) fn signed_to_unsigned_i64(i: i64) -> u64 {
    if i < 0 {
        ((!(i as u64)) << 1) | 1 // complement i, bit 0 is 1
    } else {
        (i as u64) << 1 // do not complement i, bit 0 is 0
    }
}

#[inline]
pub(crate) fn signed_to_unsigned_i32(i: i32) -> u32 {
    if i < 0 {
        ((!(i as u32)) << 1) | 1 // complement i, bit 0 is 1
    } else {
        (i as u32) << 1 // do not complement i, bit 0 is 0
    }
}

#[inline]
pub(crate) fn unsigned_to_signed_i64(u: u64) -> i64 {
    if u & 1 == 0 {
        (u >> 1) as i64
    } else {
        !((u >> 1) as i64)
    }
}

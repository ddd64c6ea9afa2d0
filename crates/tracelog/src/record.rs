//! Splits drained log data back into event records.
//!
//! Only the framing is decoded; payloads are returned as-is.

use crate::eventbuf::unsigned_to_signed_i64;
use crate::model::{SpanId, SpanKey, TraceEventId, TraceId};
use crate::protocol::HEADER_SIZE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("truncated event header: {available} of 45 bytes")]
    TruncatedHeader { available: usize },

    #[error("truncated event payload: {available} of {expected} bytes")]
    TruncatedPayload { expected: usize, available: usize },
}

/// A single event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    pub event_type: u8,
    pub event_id: TraceEventId,

    /// Nanoseconds relative to the log's time anchor.
    pub nanotime: i64,
    pub span: SpanKey,
    pub data: &'a [u8],
}

impl Record<'_> {
    /// Size of the record in its encoded form.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }
}

/// Iterates over the records in a buffer of log data.
///
/// Iteration stops after the first error.
pub struct RecordReader<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            failed: false,
        }
    }

    /// The bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    fn read_record(&mut self) -> Result<Record<'a>, ParseError> {
        let data = self.data;
        if data.len() < HEADER_SIZE {
            return Err(ParseError::TruncatedHeader {
                available: data.len(),
            });
        }
        let (h, rest) = data.split_at(HEADER_SIZE);

        let data_len = u32::from_le_bytes([h[41], h[42], h[43], h[44]]) as usize;
        if rest.len() < data_len {
            return Err(ParseError::TruncatedPayload {
                expected: data_len,
                available: rest.len(),
            });
        }

        let mut event_id = [0u8; 8];
        event_id.copy_from_slice(&h[1..9]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&h[9..17]);
        let mut trace_id = [0u8; 16];
        trace_id.copy_from_slice(&h[17..33]);
        let mut span_id = [0u8; 8];
        span_id.copy_from_slice(&h[33..41]);

        let (payload, rest) = rest.split_at(data_len);
        self.data = rest;

        Ok(Record {
            event_type: h[0],
            event_id: TraceEventId(u64::from_le_bytes(event_id)),
            nanotime: unsigned_to_signed_i64(u64::from_le_bytes(ts)),
            span: SpanKey(TraceId(trace_id), SpanId(span_id)),
            data: payload,
        })
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = Result<Record<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        let res = self.read_record();
        self.failed = res.is_err();
        Some(res)
    }
}

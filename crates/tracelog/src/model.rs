#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct TraceId(pub [u8; 16]);

#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct SpanId(pub [u8; 8]);

/// Uniquely identifies a span.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct SpanKey(pub TraceId, pub SpanId);

/// Uniquely identifies an event within the process.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[must_use]
pub struct TraceEventId(pub u64);

impl TraceEventId {
    /// Indicates "no event". Never assigned to a logged event.
    pub const NONE: TraceEventId = TraceEventId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl TraceId {
    pub fn with_span(&self, span_id: SpanId) -> SpanKey {
        SpanKey(*self, span_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_none() {
        assert!(TraceEventId::NONE.is_none());
        assert!(TraceEventId::default().is_none());
        assert!(!TraceEventId(1).is_none());
    }

    #[test]
    fn test_with_span() {
        let trace = TraceId([3; 16]);
        let span = SpanId([4; 8]);
        let key = trace.with_span(span);
        assert_eq!(key, SpanKey(trace, span));
    }
}

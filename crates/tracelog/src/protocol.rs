//! Constants and types shared between producers and consumers of the trace log.

/// Size of the fixed header preceding each event payload.
///
/// 1 (type) + 8 (event id) + 8 (timestamp) + 16 (trace id) + 8 (span id) + 4 (data length)
pub const HEADER_SIZE: usize = 45;

/// Represents a type of trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    RequestSpanStart = 0x01,
    RequestSpanEnd = 0x02,
    AuthSpanStart = 0x03,
    AuthSpanEnd = 0x04,
    PubsubMessageSpanStart = 0x05,
    PubsubMessageSpanEnd = 0x06,
    DBTransactionStart = 0x07,
    DBTransactionEnd = 0x08,
    DBQueryStart = 0x09,
    DBQueryEnd = 0x0A,
    RPCCallStart = 0x0B,
    RPCCallEnd = 0x0C,
    HTTPCallStart = 0x0D,
    HTTPCallEnd = 0x0E,
    LogMessage = 0x0F,
    PubsubPublishStart = 0x10,
    PubsubPublishEnd = 0x11,
    ServiceInitStart = 0x12,
    ServiceInitEnd = 0x13,
    CacheCallStart = 0x14,
    CacheCallEnd = 0x15,
    BodyStream = 0x16,
    TestStart = 0x17,
    TestEnd = 0x18,
    BucketObjectUploadStart = 0x19,
    BucketObjectUploadEnd = 0x1A,
    BucketObjectDownloadStart = 0x1B,
    BucketObjectDownloadEnd = 0x1C,
    BucketObjectGetAttrsStart = 0x1D,
    BucketObjectGetAttrsEnd = 0x1E,
    BucketListObjectsStart = 0x1F,
    BucketListObjectsEnd = 0x20,
    BucketDeleteObjectsStart = 0x21,
    BucketDeleteObjectsEnd = 0x22,
}

impl EventType {
    const ALL: [EventType; 34] = [
        EventType::RequestSpanStart,
        EventType::RequestSpanEnd,
        EventType::AuthSpanStart,
        EventType::AuthSpanEnd,
        EventType::PubsubMessageSpanStart,
        EventType::PubsubMessageSpanEnd,
        EventType::DBTransactionStart,
        EventType::DBTransactionEnd,
        EventType::DBQueryStart,
        EventType::DBQueryEnd,
        EventType::RPCCallStart,
        EventType::RPCCallEnd,
        EventType::HTTPCallStart,
        EventType::HTTPCallEnd,
        EventType::LogMessage,
        EventType::PubsubPublishStart,
        EventType::PubsubPublishEnd,
        EventType::ServiceInitStart,
        EventType::ServiceInitEnd,
        EventType::CacheCallStart,
        EventType::CacheCallEnd,
        EventType::BodyStream,
        EventType::TestStart,
        EventType::TestEnd,
        EventType::BucketObjectUploadStart,
        EventType::BucketObjectUploadEnd,
        EventType::BucketObjectDownloadStart,
        EventType::BucketObjectDownloadEnd,
        EventType::BucketObjectGetAttrsStart,
        EventType::BucketObjectGetAttrsEnd,
        EventType::BucketListObjectsStart,
        EventType::BucketListObjectsEnd,
        EventType::BucketDeleteObjectsStart,
        EventType::BucketDeleteObjectsEnd,
    ];
}

/// The byte did not correspond to a known event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: 0x{0:02x}")]
pub struct UnknownEventType(pub u8);

impl TryFrom<u8> for EventType {
    type Error = UnknownEventType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        // The discriminants are contiguous, starting at 0x01.
        match value {
            0x01..=0x22 => Ok(EventType::ALL[(value - 1) as usize]),
            other => Err(UnknownEventType(other)),
        }
    }
}

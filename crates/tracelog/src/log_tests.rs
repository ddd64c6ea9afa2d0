use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crate::eventbuf::EventBuffer;
use crate::log::{BufferConfig, Event, Log, LogHandle};
use crate::model::{SpanId, SpanKey, TraceEventId, TraceId};
use crate::protocol::{EventType, HEADER_SIZE};
use crate::record::RecordReader;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds an event whose payload identifies the producer and sequence number.
fn producer_event(producer: u8, seq: u32) -> Event {
    let mut data = EventBuffer::with_capacity(32);
    data.byte(producer);
    data.u32(seq);
    // Vary the payload length between events.
    data.str("x".repeat((seq % 7) as usize));

    Event {
        typ: EventType::LogMessage,
        span: SpanKey(TraceId([producer; 16]), SpanId([producer; 8])),
        data,
    }
}

fn sized_event(payload_len: usize) -> Event {
    let mut data = EventBuffer::with_capacity(payload_len);
    data.raw(&vec![0xAA; payload_len]);
    Event {
        typ: EventType::BodyStream,
        span: SpanKey::default(),
        data,
    }
}

#[test]
fn test_concurrent_add_and_drain() {
    init_logger();

    const PRODUCERS: u8 = 8;
    const EVENTS: u32 = 500;

    let log = Arc::new(Log::new(BufferConfig::with_growth_unit(64)));

    let consumer = {
        let log = log.clone();
        thread::spawn(move || {
            let mut chunks = Vec::new();
            loop {
                let (data, done) = log.wait_and_clear();
                if !data.is_empty() {
                    chunks.push(data);
                }
                if done {
                    // Pick up anything added between the last drain and completion.
                    let (rest, _) = log.get_and_clear();
                    if !rest.is_empty() {
                        chunks.push(rest);
                    }
                    return chunks;
                }
            }
        })
    };

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let log = log.clone();
            thread::spawn(move || {
                let mut expected_bytes = 0;
                let mut ids = Vec::with_capacity(EVENTS as usize);
                for seq in 0..EVENTS {
                    let event = producer_event(p, seq);
                    expected_bytes += HEADER_SIZE + event.data.len();
                    ids.push(log.add(event));
                }
                (expected_bytes, ids)
            })
        })
        .collect();

    let mut expected_bytes = 0;
    let mut all_ids = HashSet::new();
    for h in producers {
        let (bytes, ids) = h.join().unwrap();
        expected_bytes += bytes;

        // Ids are monotonic from each producer's point of view.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(!id.is_none());
            assert!(all_ids.insert(id));
        }
    }
    log.mark_done();

    let chunks = consumer.join().unwrap();
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, expected_bytes);

    let mut next_seq = vec![0u32; PRODUCERS as usize];
    let mut seen_ids = HashSet::new();
    for chunk in &chunks {
        // Every drained chunk holds complete records only.
        for record in RecordReader::new(chunk) {
            let record = record.unwrap();
            assert_eq!(record.event_type, EventType::LogMessage as u8);
            assert!(seen_ids.insert(record.event_id));

            let producer = record.data[0];
            let seq = u32::from_le_bytes(record.data[1..5].try_into().unwrap());
            assert_eq!(record.span.0, TraceId([producer; 16]));
            assert_eq!(record.span.1, SpanId([producer; 8]));
            assert_eq!(record.data.len(), 5 + 1 + (seq % 7) as usize);

            // Each producer's events appear in the order they were added.
            assert_eq!(seq, next_seq[producer as usize]);
            next_seq[producer as usize] += 1;
        }
    }
    assert!(next_seq.iter().all(|&n| n == EVENTS));
    assert_eq!(seen_ids, all_ids);
}

#[test]
fn test_wait_and_clear_wakes_on_data() {
    let log = Arc::new(Log::default());

    let consumer = {
        let log = log.clone();
        thread::spawn(move || log.wait_and_clear())
    };

    thread::sleep(Duration::from_millis(20));
    let id = log.add(sized_event(3));

    let (data, done) = consumer.join().unwrap();
    assert!(!done);
    let records: Vec<_> = RecordReader::new(&data).map(Result::unwrap).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_id, id);
    assert_eq!(records[0].data, &[0xAA; 3]);
}

#[test]
fn test_wait_until_done_ignores_new_data() {
    let log = Arc::new(Log::default());

    let waiter = {
        let log = log.clone();
        thread::spawn(move || log.wait_until_done())
    };

    for _ in 0..10 {
        _ = log.add(sized_event(1));
        thread::sleep(Duration::from_millis(2));
    }
    assert!(!waiter.is_finished());

    log.mark_done();
    waiter.join().unwrap();
}

#[test]
fn test_wait_at_least_with_activity() {
    let log = Arc::new(Log::default());

    let producer = {
        let log = log.clone();
        thread::spawn(move || {
            while !log.is_done() {
                _ = log.add(sized_event(1));
                thread::sleep(Duration::from_millis(2));
            }
        })
    };

    let start = Instant::now();
    let done = log.wait_at_least(Duration::from_millis(30));
    assert!(!done);
    assert!(start.elapsed() >= Duration::from_millis(30));

    log.mark_done();
    producer.join().unwrap();
}

#[test]
fn test_wait_at_least_has_no_upper_bound() {
    let log = Arc::new(Log::default());
    let barrier = Arc::new(Barrier::new(2));

    let waiter = {
        let log = log.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            let start = Instant::now();
            let done = log.wait_at_least(Duration::from_millis(10));
            (done, start.elapsed())
        })
    };

    barrier.wait();
    // Nothing is written, so the waiter isn't woken when the duration passes.
    thread::sleep(Duration::from_millis(60));
    log.mark_done();

    let (done, elapsed) = waiter.join().unwrap();
    assert!(done);
    assert!(elapsed >= Duration::from_millis(40), "elapsed: {elapsed:?}");
}

#[test]
fn test_mark_done_releases_all_waiters() {
    let log = Arc::new(Log::default());

    let until_done = {
        let log = log.clone();
        thread::spawn(move || log.wait_until_done())
    };
    let at_least = {
        let log = log.clone();
        thread::spawn(move || log.wait_at_least(Duration::from_secs(3600)))
    };
    let and_clear = {
        let log = log.clone();
        thread::spawn(move || log.wait_and_clear())
    };

    thread::sleep(Duration::from_millis(20));
    log.mark_done();

    until_done.join().unwrap();
    assert!(at_least.join().unwrap());
    let (data, done) = and_clear.join().unwrap();
    assert!(data.is_empty());
    assert!(done);

    // Future callers return immediately too.
    log.wait_until_done();
    assert!(log.get_and_clear().1);
}

#[test]
fn test_capacity_is_reclaimed_after_burst() {
    init_logger();

    let config = BufferConfig::with_growth_unit(16);
    let log = Log::new(config);

    // First burst grows the buffer past the ceiling.
    for _ in 0..40 {
        _ = log.add(sized_event(10));
    }
    assert!(log.capacity() > config.max_capacity());

    let (data, _) = log.get_and_clear();
    assert_eq!(data.len(), 40 * (HEADER_SIZE + 10));
    assert_eq!(log.capacity(), config.initial_capacity());
    assert_eq!(log.buffered_len(), 0);

    // A small burst stays below the ceiling and keeps the remaining storage.
    for _ in 0..2 {
        _ = log.add(sized_event(10));
    }
    let before = log.capacity();
    assert!(before <= config.max_capacity());
    let (data, _) = log.wait_and_clear();
    assert_eq!(data.len(), 2 * (HEADER_SIZE + 10));
    assert_eq!(log.capacity(), before - data.len());

    // Second large burst is reclaimed again.
    drop(data);
    for _ in 0..40 {
        _ = log.add(sized_event(10));
    }
    assert!(log.capacity() > config.max_capacity());
    _ = log.wait_and_clear();
    assert_eq!(log.capacity(), config.initial_capacity());
}

#[test]
fn test_handles_across_threads() {
    let log = Arc::new(Log::default());
    let handle = LogHandle::new(log.clone());
    let noop = LogHandle::noop();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            let noop = noop.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    assert!(!handle.add(sized_event(2)).is_none());
                    assert_eq!(noop.add(sized_event(2)), TraceEventId::NONE);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    handle.mark_done();
    let (data, done) = handle.wait_and_clear();
    assert!(done);
    assert_eq!(RecordReader::new(&data).count(), 40);
}

//! End-to-end codec tests: frames serialized by the framer are fed
//! back through the streaming parser under hostile fragmentation, and
//! decoded header fields run through message verification.

use bytes::{Bytes, BytesMut};
use protocol_h3::frame::{self, PushId};
use protocol_h3::{
    CodecError, Directive, ErrorCode, FrameParser, FrameVisitor, HeaderObserver, MessageDecoder,
    PriorityUpdate, SettingId, SettingPair, StreamRole,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Header { raw_type: u64, length: u64 },
    Data(Vec<u8>),
    Headers(Vec<u8>),
    Priority(PriorityUpdate),
    CancelPush(PushId),
    Settings(Vec<SettingPair>),
    PushPromise(PushId, Vec<u8>),
    Goaway(u64),
    MaxPushId(PushId),
    Error(ErrorCode),
}

#[derive(Default)]
struct Collector {
    events: Vec<Event>,
}

impl FrameVisitor for Collector {
    fn on_frame_header(
        &mut self,
        _stream_id: u64,
        _flags: u8,
        length: u64,
        raw_type: u64,
    ) -> Directive {
        self.events.push(Event::Header { raw_type, length });
        Directive::Continue
    }

    fn on_data_chunk(&mut self, _stream_id: u64, chunk: Bytes) -> Directive {
        self.events.push(Event::Data(chunk.to_vec()));
        Directive::Continue
    }

    fn on_headers(&mut self, _stream_id: u64, block: Bytes) -> Directive {
        self.events.push(Event::Headers(block.to_vec()));
        Directive::Continue
    }

    fn on_priority(&mut self, _stream_id: u64, priority: PriorityUpdate) -> Directive {
        self.events.push(Event::Priority(priority));
        Directive::Continue
    }

    fn on_cancel_push(&mut self, push_id: PushId) -> Directive {
        self.events.push(Event::CancelPush(push_id));
        Directive::Continue
    }

    fn on_settings(&mut self, settings: Vec<SettingPair>) -> Directive {
        self.events.push(Event::Settings(settings));
        Directive::Continue
    }

    fn on_push_promise(&mut self, _stream_id: u64, push_id: PushId, block: Bytes) -> Directive {
        self.events.push(Event::PushPromise(push_id, block.to_vec()));
        Directive::Continue
    }

    fn on_goaway(&mut self, last_stream_id: u64) -> Directive {
        self.events.push(Event::Goaway(last_stream_id));
        Directive::Continue
    }

    fn on_max_push_id(&mut self, push_id: PushId) -> Directive {
        self.events.push(Event::MaxPushId(push_id));
        Directive::Continue
    }

    fn on_error(&mut self, _stream_id: u64, error: &CodecError, _new_stream: bool) {
        self.events.push(Event::Error(error.code));
    }
}

/// Feed `chunks` in order, accumulating unconsumed tails the way a
/// transport buffer would.
fn feed_chunks(parser: &mut FrameParser, chunks: &[&[u8]], collector: &mut Collector) {
    let mut pending = BytesMut::new();
    for chunk in chunks {
        pending.extend_from_slice(chunk);
        loop {
            let buf = pending.clone().freeze();
            let consumed = parser.on_ingress(&buf, collector);
            if consumed == 0 {
                break;
            }
            let _ = pending.split_to(consumed);
            if pending.is_empty() {
                break;
            }
        }
    }
}

/// Coalesce consecutive DATA chunk events so event sequences can be
/// compared across different input partitions.
fn coalesce(events: &[Event]) -> Vec<Event> {
    let mut out: Vec<Event> = Vec::new();
    for event in events {
        match (out.last_mut(), event) {
            (Some(Event::Data(acc)), Event::Data(chunk)) => acc.extend_from_slice(chunk),
            _ => out.push(event.clone()),
        }
    }
    out
}

#[test]
fn settings_round_trip_byte_at_a_time() {
    let settings = vec![
        (SettingId::HeaderTableSize, 4096),
        (SettingId::QpackBlockedStreams, 100),
    ];
    let mut wire = BytesMut::new();
    frame::write_settings(&mut wire, &settings).unwrap();

    let mut parser = FrameParser::new(3, StreamRole::Control);
    let mut collector = Collector::default();
    let bytes: Vec<&[u8]> = wire.chunks(1).collect();
    feed_chunks(&mut parser, &bytes, &mut collector);

    let payload_len = wire.len() as u64 - 2; // 1-byte type + 1-byte length varints
    assert_eq!(
        collector.events,
        vec![
            Event::Header {
                raw_type: 0x04,
                length: payload_len
            },
            Event::Settings(settings),
        ]
    );
}

#[test]
fn fragmented_data_frame() {
    let mut wire = BytesMut::new();
    frame::write_data(&mut wire, &[0x61, 0x62, 0x63, 0x64]).unwrap();
    // header is [0x00, 0x04]: split it across the first two chunks
    let chunks: &[&[u8]] = &[&wire[0..1], &wire[1..3], &wire[3..5], &wire[5..6]];

    let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
    let mut collector = Collector::default();
    feed_chunks(&mut parser, chunks, &mut collector);

    assert_eq!(
        collector.events[0],
        Event::Header {
            raw_type: 0x00,
            length: 4
        }
    );
    let payload: Vec<u8> = collector.events[1..]
        .iter()
        .flat_map(|e| match e {
            Event::Data(chunk) => {
                assert!(!chunk.is_empty());
                chunk.clone()
            }
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(payload, b"abcd");
}

#[test]
fn unknown_frame_type_skipped_silently() {
    let mut wire = BytesMut::new();
    frame::write_frame_header(&mut wire, 0x9999, 5).unwrap();
    wire.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05]);
    frame::write_frame_header(&mut wire, 0x01, 0).unwrap();

    let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
    let mut collector = Collector::default();
    let consumed = parser.on_ingress(&wire.freeze(), &mut collector);
    assert!(consumed > 0);
    assert_eq!(
        collector.events,
        vec![Event::Header {
            raw_type: 0x01,
            length: 0
        }]
    );
}

#[test]
fn unknown_frame_payload_resumes_across_buffers() {
    let mut wire = BytesMut::new();
    frame::write_frame_header(&mut wire, 0x21, 6).unwrap(); // grease
    wire.extend_from_slice(b"abcdef");
    frame::write_goaway(&mut wire, 8).unwrap();

    let mut parser = FrameParser::new(3, StreamRole::Control);
    let mut collector = Collector::default();
    // split mid-payload of the grease frame
    let chunks: &[&[u8]] = &[&wire[..4], &wire[4..]];
    feed_chunks(&mut parser, chunks, &mut collector);

    assert_eq!(
        collector.events,
        vec![
            Event::Header {
                raw_type: 0x07,
                length: 1
            },
            Event::Goaway(8),
        ]
    );
}

#[test]
fn malformed_priority_kills_the_connection_once() {
    let mut wire = BytesMut::new();
    frame::write_frame_header(&mut wire, 0x02, 4).unwrap();
    // reserved low bits set in the flag byte
    wire.extend_from_slice(&[0x07, 0x00, 0x00, 0x10]);
    let wire = wire.freeze();

    let mut parser = FrameParser::new(3, StreamRole::Control);
    let mut collector = Collector::default();
    parser.on_ingress(&wire, &mut collector);

    assert_eq!(
        collector.events,
        vec![
            Event::Header {
                raw_type: 0x02,
                length: 4
            },
            Event::Error(ErrorCode::MalformedFramePriority),
        ]
    );
    assert_eq!(parser.connection_error(), Some(ErrorCode::MalformedFramePriority));

    // the dead parser consumes nothing and stays silent
    assert_eq!(parser.on_ingress(&wire, &mut collector), 0);
    assert_eq!(collector.events.len(), 2);
}

#[test]
fn chunked_feeding_matches_whole_buffer() {
    let mut wire = BytesMut::new();
    frame::write_headers(&mut wire, b"qpack block bytes").unwrap();
    frame::write_data(&mut wire, b"hello world body").unwrap();
    frame::write_frame_header(&mut wire, 0x40, 3).unwrap(); // grease, skipped
    wire.extend_from_slice(&[9, 9, 9]);
    frame::write_data(&mut wire, b"tail").unwrap();
    let wire = wire.freeze();

    let mut whole = Collector::default();
    let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
    assert_eq!(parser.on_ingress(&wire, &mut whole), wire.len());

    for chunk_size in [1, 2, 3, 7, wire.len()] {
        let chunks: Vec<&[u8]> = wire.chunks(chunk_size).collect();
        let mut collector = Collector::default();
        let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
        feed_chunks(&mut parser, &chunks, &mut collector);
        assert_eq!(
            coalesce(&collector.events),
            coalesce(&whole.events),
            "chunk_size={chunk_size}"
        );
    }
}

#[test]
fn control_stream_frames_round_trip() {
    let priority = PriorityUpdate {
        prioritized_type: protocol_h3::ElementType::RequestStream,
        dependency_type: protocol_h3::ElementType::TreeRoot,
        exclusive: false,
        prioritized_element_id: 4,
        element_dependency_id: 0,
        weight: 16,
    };
    let mut wire = BytesMut::new();
    frame::write_settings(&mut wire, &[(SettingId::MaxHeaderListSize, 1 << 20)]).unwrap();
    frame::write_priority(&mut wire, &priority).unwrap();
    frame::write_cancel_push(&mut wire, PushId::internal(9)).unwrap();
    frame::write_max_push_id(&mut wire, PushId::internal(64)).unwrap();
    frame::write_goaway(&mut wire, 120).unwrap();
    let wire = wire.freeze();

    let mut parser = FrameParser::new(3, StreamRole::Control);
    let mut collector = Collector::default();
    assert_eq!(parser.on_ingress(&wire, &mut collector), wire.len());

    let structured: Vec<&Event> = collector
        .events
        .iter()
        .filter(|e| !matches!(e, Event::Header { .. }))
        .collect();
    assert_eq!(
        structured,
        vec![
            &Event::Settings(vec![(SettingId::MaxHeaderListSize, 1 << 20)]),
            &Event::Priority(priority),
            &Event::CancelPush(PushId::internal(9)),
            &Event::MaxPushId(PushId::internal(64)),
            &Event::Goaway(120),
        ]
    );
}

#[test]
fn push_promise_reaches_clients_only() {
    let mut wire = BytesMut::new();
    frame::write_push_promise(&mut wire, PushId::internal(2), b"promised headers").unwrap();
    let wire = wire.freeze();

    let mut parser = FrameParser::new(0, StreamRole::ClientRequest);
    let mut collector = Collector::default();
    assert_eq!(parser.on_ingress(&wire, &mut collector), wire.len());
    assert_eq!(
        collector.events[1],
        Event::PushPromise(PushId::internal(2), b"promised headers".to_vec())
    );

    let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
    let mut collector = Collector::default();
    parser.on_ingress(&wire, &mut collector);
    assert_eq!(
        collector.events,
        vec![Event::Error(ErrorCode::WrongStreamDirection)]
    );
}

#[test]
fn settings_rejected_on_request_stream() {
    let mut wire = BytesMut::new();
    frame::write_settings(&mut wire, &[(SettingId::HeaderTableSize, 4096)]).unwrap();
    let wire = wire.freeze();

    let mut parser = FrameParser::new(0, StreamRole::ClientRequest);
    let mut collector = Collector::default();
    parser.on_ingress(&wire, &mut collector);
    assert_eq!(collector.events, vec![Event::Error(ErrorCode::WrongStream)]);
}

// ── Header verification scenarios ───────────────────────────────────

#[test]
fn duplicate_status_rejected() {
    let mut decoder = MessageDecoder::new_response();
    decoder.on_header(":status", "200");
    decoder.on_header(":status", "204");
    decoder.on_headers_complete(16, false);
    assert_eq!(decoder.parsing_error(), Some("Duplicate status"));
}

#[test]
fn content_length_must_agree() {
    let mut decoder = MessageDecoder::new_response();
    decoder.on_header(":status", "200");
    assert!(decoder.on_header("content-length", "42"));
    assert!(decoder.on_header("content-length", "42"));
    assert!(!decoder.on_header("content-length", "7"));
    assert_eq!(
        decoder.parsing_error(),
        Some("Multiple content-length headers")
    );
}

#[test]
fn headers_frame_payload_feeds_verification() {
    // HEADERS payload is opaque to the parser; simulate the QPACK
    // decoder replaying its fields into the verifier afterwards.
    let mut wire = BytesMut::new();
    frame::write_headers(&mut wire, b"opaque").unwrap();
    let wire = wire.freeze();

    let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
    let mut collector = Collector::default();
    parser.on_ingress(&wire, &mut collector);
    assert_eq!(collector.events[1], Event::Headers(b"opaque".to_vec()));

    let mut decoder = MessageDecoder::new_request();
    for (name, value) in [
        (":method", "GET"),
        (":scheme", "https"),
        (":authority", "example.com"),
        (":path", "/"),
        ("user-agent", "protocol-h3-test"),
    ] {
        assert!(decoder.on_header(name, value));
    }
    decoder.on_headers_complete(6, false);
    let msg = decoder.into_message().unwrap();
    assert_eq!(msg.method(), Some("GET"));
    assert_eq!(msg.version(), (1, 1));
    assert_eq!(msg.ingress_header_size(), 6);
}

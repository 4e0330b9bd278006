//! Resumable streaming frame parser.
//!
//! [`FrameParser`] consumes arbitrary byte chunks from one QUIC stream
//! and emits typed frame events through a caller-supplied
//! [`FrameVisitor`]. Only the state tag and the current frame header
//! persist across calls; cursor positions never do. The caller retains
//! whatever tail `on_ingress` did not consume and re-presents it,
//! extended, on the next call.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{CodecError, ErrorCode};
use crate::frame::{self, FrameHeader, FrameKind, PriorityUpdate, PushId, UNFRAMED_DATA_FRAME_LEN};
use crate::settings::SettingPair;
use crate::varint;

/// Stream id reported with connection-level errors.
pub const SESSION_STREAM_ID: u64 = u64::MAX;

/// What the parser should do after a visitor callback returns.
///
/// Returning [`Directive::Pause`] from inside a callback halts
/// dispatch before the next byte is processed; the caller resumes with
/// [`FrameParser::set_parser_paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Pause,
}

/// Consumer of parsed frame events.
///
/// `on_frame_header` fires exactly once per defined frame after type
/// and length are parsed, before any payload event. Unknown frame
/// types produce no events at all; their payloads are discarded.
pub trait FrameVisitor {
    fn on_frame_header(
        &mut self,
        _stream_id: u64,
        _flags: u8,
        _length: u64,
        _raw_type: u64,
    ) -> Directive {
        Directive::Continue
    }

    /// One chunk of a streamed DATA payload, in byte order. Chunk
    /// lengths sum to the declared frame length.
    fn on_data_chunk(&mut self, _stream_id: u64, _chunk: Bytes) -> Directive {
        Directive::Continue
    }

    /// The opaque compressed block of a HEADERS frame.
    fn on_headers(&mut self, _stream_id: u64, _block: Bytes) -> Directive {
        Directive::Continue
    }

    fn on_priority(&mut self, _stream_id: u64, _priority: PriorityUpdate) -> Directive {
        Directive::Continue
    }

    fn on_cancel_push(&mut self, _push_id: PushId) -> Directive {
        Directive::Continue
    }

    /// Known settings pairs in wire order; unknown ids were discarded.
    fn on_settings(&mut self, _settings: Vec<SettingPair>) -> Directive {
        Directive::Continue
    }

    fn on_push_promise(&mut self, _stream_id: u64, _push_id: PushId, _block: Bytes) -> Directive {
        Directive::Continue
    }

    fn on_goaway(&mut self, _last_stream_id: u64) -> Directive {
        Directive::Continue
    }

    fn on_max_push_id(&mut self, _push_id: PushId) -> Directive {
        Directive::Continue
    }

    /// Fired at most once per connection; the parser is paused before
    /// this is invoked and stays dead afterwards.
    fn on_error(&mut self, _stream_id: u64, _error: &CodecError, _new_stream: bool) {}
}

/// Hook for the experimental partially reliable DATA mode.
///
/// A DATA frame whose length equals
/// [`UNFRAMED_DATA_FRAME_LEN`](crate::frame::UNFRAMED_DATA_FRAME_LEN)
/// hands the rest of the stream to this hook when the transport
/// supports it.
pub trait PartialReliabilityHook {
    /// Whether the transport negotiated partial reliability. With the
    /// default `false` the unframed path is unreachable.
    fn transport_supports_partial_reliability(&self) -> bool {
        false
    }

    /// An unframed DATA body begins at this ingress stream offset.
    fn on_body_started(&mut self, _stream_offset: u64) {}

    /// Consume unframed body bytes; returns how many were taken.
    fn parse_partially_reliable_data(&mut self, _buf: &Bytes) -> Result<usize, ErrorCode> {
        Ok(0)
    }
}

/// Hook for transports without partial reliability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPartialReliability;

impl PartialReliabilityHook for NoPartialReliability {}

/// Role of the stream feeding the parser; decides which frame kinds
/// are legal before their length is even read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    /// The connection control stream.
    Control,
    /// Bidirectional request stream, client side: may receive
    /// PUSH_PROMISE from the server.
    ClientRequest,
    /// Bidirectional request stream, server side.
    ServerRequest,
    /// Server-initiated push stream: response frames only.
    Push,
}

impl StreamRole {
    fn check_frame_allowed(self, kind: FrameKind) -> Option<ErrorCode> {
        match self {
            Self::Control => match kind {
                FrameKind::Data | FrameKind::Headers | FrameKind::PushPromise => {
                    Some(ErrorCode::WrongStream)
                }
                _ => None,
            },
            Self::ClientRequest => match kind {
                FrameKind::Settings
                | FrameKind::Goaway
                | FrameKind::CancelPush
                | FrameKind::MaxPushId => Some(ErrorCode::WrongStream),
                _ => None,
            },
            Self::ServerRequest => match kind {
                FrameKind::Settings
                | FrameKind::Goaway
                | FrameKind::CancelPush
                | FrameKind::MaxPushId => Some(ErrorCode::WrongStream),
                // Pushes are promised by servers, never to them.
                FrameKind::PushPromise => Some(ErrorCode::WrongStreamDirection),
                _ => None,
            },
            Self::Push => match kind {
                FrameKind::Data | FrameKind::Headers | FrameKind::Unknown(_) => None,
                _ => Some(ErrorCode::WrongStream),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    HeaderType,
    HeaderLength,
    /// Whole-payload frames: dispatch once the full payload is buffered.
    Payload,
    /// DATA payloads, emitted chunk by chunk.
    PayloadStreaming,
    /// Unknown-type payloads, discarded chunk by chunk.
    PayloadSkipping,
    /// Unframed DATA delegated to the partial-reliability hook.
    PayloadPrStreaming,
}

/// Streaming HTTP/3 frame parser for a single stream.
pub struct FrameParser<P = NoPartialReliability> {
    stream_id: u64,
    role: StreamRole,
    state: FrameState,
    cur_header: FrameHeader,
    pending_data_frame_bytes: u64,
    total_bytes_parsed: u64,
    conn_error: Option<ErrorCode>,
    paused: bool,
    hook: P,
}

impl FrameParser<NoPartialReliability> {
    pub fn new(stream_id: u64, role: StreamRole) -> Self {
        Self::with_partial_reliability(stream_id, role, NoPartialReliability)
    }
}

impl<P: PartialReliabilityHook> FrameParser<P> {
    pub fn with_partial_reliability(stream_id: u64, role: StreamRole, hook: P) -> Self {
        Self {
            stream_id,
            role,
            state: FrameState::HeaderType,
            cur_header: FrameHeader::default(),
            pending_data_frame_bytes: 0,
            total_bytes_parsed: 0,
            conn_error: None,
            paused: false,
            hook,
        }
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// The connection-fatal error, once one has been surfaced.
    pub fn connection_error(&self) -> Option<ErrorCode> {
        self.conn_error
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Halt or resume dispatch between `on_ingress` calls. While
    /// paused, `on_ingress` is a no-op returning 0.
    pub fn set_parser_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Total ingress bytes consumed over the parser's lifetime.
    pub fn total_bytes_parsed(&self) -> u64 {
        self.total_bytes_parsed
    }

    /// The partial-reliability hook supplied at construction.
    pub fn hook(&self) -> &P {
        &self.hook
    }

    /// Best-effort reset signal from the transport. Drops any frame in
    /// progress on this stream; QPACK reference counts are the
    /// session's concern.
    pub fn on_stream_reset(&mut self, stream_id: u64) {
        trace!(stream_id, "stream reset");
        if stream_id == self.stream_id {
            self.state = FrameState::HeaderType;
            self.pending_data_frame_bytes = 0;
        }
    }

    /// Consume as much of `buf` as the current state allows, invoking
    /// visitor callbacks inline, and return the consumed byte count.
    /// The caller keeps the tail and re-presents it with more data.
    ///
    /// Safe under arbitrary fragmentation; a no-op returning 0 once a
    /// connection error has been surfaced or while paused.
    pub fn on_ingress<V: FrameVisitor>(&mut self, buf: &Bytes, visitor: &mut V) -> usize {
        if self.conn_error.is_some() || self.paused {
            return 0;
        }

        let mut consumed = 0usize;
        let mut err: Option<ErrorCode> = None;

        while err.is_none() && !self.paused && consumed < buf.len() {
            let rest = &buf[consumed..];
            match self.state {
                FrameState::HeaderType => {
                    let Some((raw_type, n)) = varint::decode(rest) else {
                        break;
                    };
                    consumed += n;
                    self.cur_header = FrameHeader {
                        raw_type,
                        length: 0,
                    };
                    if let Some(code) = self.role.check_frame_allowed(self.cur_header.kind()) {
                        debug!(
                            raw_type,
                            stream_id = self.stream_id,
                            "frame not allowed on this stream"
                        );
                        err = Some(code);
                        break;
                    }
                    self.state = FrameState::HeaderLength;
                }
                FrameState::HeaderLength => {
                    let Some((length, n)) = varint::decode(rest) else {
                        break;
                    };
                    consumed += n;
                    self.cur_header.length = length;
                    self.pending_data_frame_bytes = length;

                    let kind = self.cur_header.kind();
                    if let FrameKind::Unknown(raw) = kind {
                        // Ignore and discard, resuming across buffers
                        // if the payload is not fully here yet.
                        trace!(raw_type = raw, length, "skipping unknown frame");
                        self.state = if length == 0 {
                            FrameState::HeaderType
                        } else {
                            FrameState::PayloadSkipping
                        };
                        continue;
                    }

                    let directive = visitor.on_frame_header(
                        self.stream_id,
                        0, // no flags in HTTP/3
                        length,
                        self.cur_header.raw_type,
                    );

                    match kind {
                        FrameKind::Data => {
                            if self.hook.transport_supports_partial_reliability()
                                && length == UNFRAMED_DATA_FRAME_LEN
                            {
                                self.state = FrameState::PayloadPrStreaming;
                                self.hook
                                    .on_body_started(self.total_bytes_parsed + consumed as u64);
                            } else if length == 0 {
                                err = Some(ErrorCode::MalformedFrameData);
                            } else {
                                self.state = FrameState::PayloadStreaming;
                            }
                        }
                        _ => self.state = FrameState::Payload,
                    }
                    if directive == Directive::Pause {
                        self.paused = true;
                    }
                }
                FrameState::Payload => {
                    if (rest.len() as u64) < self.cur_header.length {
                        break;
                    }
                    let frame_len = self.cur_header.length as usize;
                    let payload = buf.slice(consumed..consumed + frame_len);
                    let result = self.dispatch_frame(&payload, visitor);
                    consumed += frame_len;
                    self.state = FrameState::HeaderType;
                    match result {
                        Ok(Directive::Continue) => {}
                        Ok(Directive::Pause) => self.paused = true,
                        Err(code) => err = Some(code),
                    }
                }
                FrameState::PayloadStreaming => {
                    let take = self.pending_data_frame_bytes.min(rest.len() as u64) as usize;
                    let chunk = buf.slice(consumed..consumed + take);
                    match frame::parse_data(&chunk) {
                        Ok(chunk) => {
                            consumed += take;
                            self.pending_data_frame_bytes -= take as u64;
                            if self.pending_data_frame_bytes == 0 {
                                self.state = FrameState::HeaderType;
                            }
                            if visitor.on_data_chunk(self.stream_id, chunk) == Directive::Pause {
                                self.paused = true;
                            }
                        }
                        Err(code) => err = Some(code),
                    }
                }
                FrameState::PayloadSkipping => {
                    let take = self.pending_data_frame_bytes.min(rest.len() as u64) as usize;
                    consumed += take;
                    self.pending_data_frame_bytes -= take as u64;
                    if self.pending_data_frame_bytes == 0 {
                        self.state = FrameState::HeaderType;
                    }
                }
                FrameState::PayloadPrStreaming => {
                    let tail = buf.slice(consumed..);
                    match self.hook.parse_partially_reliable_data(&tail) {
                        Ok(taken) => {
                            consumed += taken;
                            if taken < tail.len() {
                                break;
                            }
                        }
                        Err(code) => err = Some(code),
                    }
                }
            }
        }

        self.total_bytes_parsed += consumed as u64;
        if let Some(code) = err {
            debug!(
                stream_id = self.stream_id,
                ingress_len = buf.len(),
                consumed,
                "ingress at connection error"
            );
            self.handle_connection_error(code, visitor);
        }
        consumed
    }

    fn dispatch_frame<V: FrameVisitor>(
        &mut self,
        payload: &Bytes,
        visitor: &mut V,
    ) -> Result<Directive, ErrorCode> {
        match self.cur_header.kind() {
            FrameKind::Headers => {
                Ok(visitor.on_headers(self.stream_id, frame::parse_headers(payload)?))
            }
            FrameKind::Priority => {
                Ok(visitor.on_priority(self.stream_id, frame::parse_priority(payload)?))
            }
            FrameKind::CancelPush => Ok(visitor.on_cancel_push(frame::parse_cancel_push(payload)?)),
            FrameKind::Settings => Ok(visitor.on_settings(frame::parse_settings(payload)?)),
            FrameKind::PushPromise => {
                let (push_id, block) = frame::parse_push_promise(payload)?;
                Ok(visitor.on_push_promise(self.stream_id, push_id, block))
            }
            FrameKind::Goaway => Ok(visitor.on_goaway(frame::parse_goaway(payload)?)),
            FrameKind::MaxPushId => Ok(visitor.on_max_push_id(frame::parse_max_push_id(payload)?)),
            // DATA streams and unknown kinds are skipped; neither
            // reaches the buffered-payload path.
            FrameKind::Data | FrameKind::Unknown(_) => Ok(Directive::Continue),
        }
    }

    fn handle_connection_error<V: FrameVisitor>(&mut self, code: ErrorCode, visitor: &mut V) {
        debug!(
            stream_id = self.stream_id,
            code = code.as_u32(),
            "connection error on ingress"
        );
        self.conn_error = Some(code);
        self.paused = true;
        let error = CodecError::connection(code);
        visitor.on_error(SESSION_STREAM_ID, &error, false);
    }
}

//! HTTP/3 frame model and codec.
//!
//! Frames are `[varint type][varint length][payload]`. This module
//! holds the typed frame model (kinds, priority updates, push ids,
//! grease identifiers), the per-type payload parsers used by the
//! streaming parser once a full payload is buffered, and the framer
//! that serializes each kind byte-exactly.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ErrorCode, TooLarge};
use crate::settings::{SettingId, SettingPair};
use crate::varint;

// ── Frame type constants (draft numbering) ──────────────────────────

pub const FRAME_DATA: u64 = 0x00;
pub const FRAME_HEADERS: u64 = 0x01;
pub const FRAME_PRIORITY: u64 = 0x02;
pub const FRAME_CANCEL_PUSH: u64 = 0x03;
pub const FRAME_SETTINGS: u64 = 0x04;
pub const FRAME_PUSH_PROMISE: u64 = 0x05;
pub const FRAME_GOAWAY: u64 = 0x07;
pub const FRAME_MAX_PUSH_ID: u64 = 0x0d;

/// Largest possible frame header: two 8-byte varints.
pub const MAX_FRAME_HEADER_SIZE: usize = 16;

/// Sentinel DATA length selecting the partially reliable path. A DATA
/// frame with this length is malformed unless the transport negotiated
/// partial reliability.
pub const UNFRAMED_DATA_FRAME_LEN: u64 = 0;

/// High-order sentinel bit marking a push id as normalized for
/// internal use. Never crosses the wire.
pub const PUSH_ID_MASK: u64 = 1 << 63;

/// Largest `n` for which `grease_id(n)` stays below 2^62.
pub const MAX_GREASE_ID_INDEX: u64 = 148_764_065_110_560_899;

// ── Frame kinds ─────────────────────────────────────────────────────

/// The defined HTTP/3 frame kinds plus a forward-compatibility
/// sentinel carrying the raw wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    Headers,
    Priority,
    CancelPush,
    Settings,
    PushPromise,
    Goaway,
    MaxPushId,
    /// Any other wire type. Must be ignored and its payload discarded.
    Unknown(u64),
}

impl FrameKind {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            FRAME_DATA => Self::Data,
            FRAME_HEADERS => Self::Headers,
            FRAME_PRIORITY => Self::Priority,
            FRAME_CANCEL_PUSH => Self::CancelPush,
            FRAME_SETTINGS => Self::Settings,
            FRAME_PUSH_PROMISE => Self::PushPromise,
            FRAME_GOAWAY => Self::Goaway,
            FRAME_MAX_PUSH_ID => Self::MaxPushId,
            other => Self::Unknown(other),
        }
    }

    /// The wire type this kind encodes as.
    pub fn raw(self) -> u64 {
        match self {
            Self::Data => FRAME_DATA,
            Self::Headers => FRAME_HEADERS,
            Self::Priority => FRAME_PRIORITY,
            Self::CancelPush => FRAME_CANCEL_PUSH,
            Self::Settings => FRAME_SETTINGS,
            Self::PushPromise => FRAME_PUSH_PROMISE,
            Self::Goaway => FRAME_GOAWAY,
            Self::MaxPushId => FRAME_MAX_PUSH_ID,
            Self::Unknown(raw) => raw,
        }
    }

    /// Human-readable name for traces.
    pub fn name(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Headers => "HEADERS",
            Self::Priority => "PRIORITY",
            Self::CancelPush => "CANCEL_PUSH",
            Self::Settings => "SETTINGS",
            Self::PushPromise => "PUSH_PROMISE",
            Self::Goaway => "GOAWAY",
            Self::MaxPushId => "MAX_PUSH_ID",
            Self::Unknown(raw) if is_grease_id(raw) => "GREASE",
            Self::Unknown(_) => "Unknown",
        }
    }
}

/// True for the frame kinds whose payloads feed the header compressor.
pub fn frame_affects_compression(kind: FrameKind) -> bool {
    matches!(kind, FrameKind::Headers | FrameKind::PushPromise)
}

/// Parsed common frame header. The raw wire type is kept alongside the
/// kind so grease and unknown types survive the typed boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub raw_type: u64,
    pub length: u64,
}

impl FrameHeader {
    pub fn kind(&self) -> FrameKind {
        FrameKind::from_raw(self.raw_type)
    }
}

// ── Grease identifiers ──────────────────────────────────────────────

/// Reserved ignorable identifier: `0x21 + 0x1F * n` up to the varint
/// limit.
pub fn is_grease_id(id: u64) -> bool {
    if id < 0x21 || id > varint::VARINT_MAX {
        return false;
    }
    (id - 0x21) % 0x1f == 0
}

/// The `n`-th grease identifier, or `None` past the varint limit.
pub fn grease_id(n: u64) -> Option<u64> {
    if n > MAX_GREASE_ID_INDEX {
        return None;
    }
    Some(0x1f * n + 0x21)
}

// ── Push ids ────────────────────────────────────────────────────────

/// Identifier for a server-initiated push stream.
///
/// The external form is what the wire carries; the internal form sets
/// [`PUSH_ID_MASK`] to mark an id already normalized by the codec.
/// Parsers produce internal ids, serializers take internal ids and
/// clear the mask before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushId(u64);

impl PushId {
    /// An id as seen on the wire, mask clear.
    pub fn external(id: u64) -> Self {
        Self(id & !PUSH_ID_MASK)
    }

    /// An id normalized for internal bookkeeping, mask set.
    pub fn internal(id: u64) -> Self {
        Self(id | PUSH_ID_MASK)
    }

    pub fn is_internal(self) -> bool {
        self.0 & PUSH_ID_MASK != 0
    }

    pub fn is_external(self) -> bool {
        !self.is_internal()
    }

    /// Raw value including the sentinel bit.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Value with the sentinel bit cleared, as encoded on the wire.
    pub fn wire_value(self) -> u64 {
        self.0 & !PUSH_ID_MASK
    }
}

// ── Priority updates ────────────────────────────────────────────────

/// What a PRIORITY frame element refers to. Two bits on the wire, so
/// every bit pattern is a valid element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    RequestStream,
    PushStream,
    Placeholder,
    /// The origin of the priority tree. Legal only as a dependency.
    TreeRoot,
}

impl ElementType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::RequestStream,
            1 => Self::PushStream,
            2 => Self::Placeholder,
            _ => Self::TreeRoot,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::RequestStream => 0,
            Self::PushStream => 1,
            Self::Placeholder => 2,
            Self::TreeRoot => 3,
        }
    }
}

/// Flag-byte layout: prioritized type at bits 7-6, dependency type at
/// bits 5-4, exclusive at bit 3, bits 2-0 reserved and must be zero.
pub const PRIORITIZED_TYPE_POS: u8 = 6;
pub const DEPENDENCY_TYPE_POS: u8 = 4;
pub const PRIORITY_EXCLUSIVE_MASK: u8 = 0x08;
pub const PRIORITY_EMPTY_POS: u8 = 0;

/// A parsed PRIORITY frame.
///
/// `element_dependency_id` is meaningful only when `dependency_type`
/// is not [`ElementType::TreeRoot`]; it is omitted from the wire
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityUpdate {
    pub prioritized_type: ElementType,
    pub dependency_type: ElementType,
    pub exclusive: bool,
    pub prioritized_element_id: u64,
    pub element_dependency_id: u64,
    pub weight: u8,
}

/// Pack the priority flag byte.
pub fn encode_priority_flags(priority: &PriorityUpdate) -> u8 {
    let mut flags = 0u8;
    flags |= priority.prioritized_type.bits() << PRIORITIZED_TYPE_POS;
    flags |= priority.dependency_type.bits() << DEPENDENCY_TYPE_POS;
    if priority.exclusive {
        flags |= PRIORITY_EXCLUSIVE_MASK;
    }
    flags
}

/// Unpack the priority flag byte. `None` if any reserved bit is set.
pub fn decode_priority_flags(flags: u8) -> Option<(ElementType, ElementType, bool)> {
    if flags & (0x07 << PRIORITY_EMPTY_POS) != 0 {
        return None;
    }
    let prioritized = ElementType::from_bits(flags >> PRIORITIZED_TYPE_POS);
    let dependency = ElementType::from_bits(flags >> DEPENDENCY_TYPE_POS);
    let exclusive = flags & PRIORITY_EXCLUSIVE_MASK != 0;
    Some((prioritized, dependency, exclusive))
}

// ── Per-type payload parsers ────────────────────────────────────────
//
// Each takes the complete declared payload; the streaming parser only
// dispatches here once that many bytes are buffered. DATA is the
// exception: it streams, and `parse_data` validates each chunk.

/// DATA payload (or streamed chunk). Zero-length DATA is malformed.
pub fn parse_data(payload: &Bytes) -> Result<Bytes, ErrorCode> {
    if payload.is_empty() {
        return Err(ErrorCode::MalformedFrameData);
    }
    Ok(payload.clone())
}

/// HEADERS payload: the opaque compressed block. Zero length allowed.
pub fn parse_headers(payload: &Bytes) -> Result<Bytes, ErrorCode> {
    Ok(payload.clone())
}

pub fn parse_priority(payload: &[u8]) -> Result<PriorityUpdate, ErrorCode> {
    let mut remaining = payload.len() as u64;
    let mut pos = 0usize;

    if remaining == 0 {
        return Err(ErrorCode::MalformedFramePriority);
    }
    let flags = payload[pos];
    pos += 1;
    remaining -= 1;

    let (prioritized_type, dependency_type, exclusive) =
        decode_priority_flags(flags).ok_or(ErrorCode::MalformedFramePriority)?;

    // Prioritizing the root of the tree is not allowed.
    if prioritized_type == ElementType::TreeRoot {
        return Err(ErrorCode::MalformedFramePriority);
    }

    let (prioritized_element_id, consumed) =
        varint::decode_bounded(&payload[pos..], &mut remaining)
            .ok_or(ErrorCode::MalformedFramePriority)?;
    pos += consumed;

    let mut element_dependency_id = 0;
    if dependency_type != ElementType::TreeRoot {
        let (id, consumed) = varint::decode_bounded(&payload[pos..], &mut remaining)
            .ok_or(ErrorCode::MalformedFramePriority)?;
        element_dependency_id = id;
        pos += consumed;
    }

    if remaining == 0 {
        return Err(ErrorCode::MalformedFramePriority);
    }
    let weight = payload[pos];
    remaining -= 1;

    if remaining != 0 {
        return Err(ErrorCode::MalformedFramePriority);
    }
    Ok(PriorityUpdate {
        prioritized_type,
        dependency_type,
        exclusive,
        prioritized_element_id,
        element_dependency_id,
        weight,
    })
}

pub fn parse_cancel_push(payload: &[u8]) -> Result<PushId, ErrorCode> {
    let mut remaining = payload.len() as u64;
    let (push_id, _) = varint::decode_bounded(payload, &mut remaining)
        .ok_or(ErrorCode::MalformedFrameCancelPush)?;
    if remaining != 0 {
        return Err(ErrorCode::MalformedFrameCancelPush);
    }
    Ok(PushId::internal(push_id))
}

/// SETTINGS payload: `(id, value)` varint pairs until exhaustion.
/// Unknown identifiers are consumed and discarded.
pub fn parse_settings(payload: &[u8]) -> Result<Vec<SettingPair>, ErrorCode> {
    let mut settings = Vec::new();
    let mut remaining = payload.len() as u64;
    let mut pos = 0usize;

    while remaining > 0 {
        let (raw_id, consumed) = varint::decode_bounded(&payload[pos..], &mut remaining)
            .ok_or(ErrorCode::MalformedFrameSettings)?;
        pos += consumed;
        let (value, consumed) = varint::decode_bounded(&payload[pos..], &mut remaining)
            .ok_or(ErrorCode::MalformedFrameSettings)?;
        pos += consumed;
        if let Some(id) = SettingId::from_raw(raw_id) {
            settings.push((id, value));
        }
    }
    Ok(settings)
}

pub fn parse_push_promise(payload: &Bytes) -> Result<(PushId, Bytes), ErrorCode> {
    let mut remaining = payload.len() as u64;
    let (push_id, consumed) = varint::decode_bounded(payload, &mut remaining)
        .ok_or(ErrorCode::MalformedFramePushPromise)?;
    Ok((PushId::internal(push_id), payload.slice(consumed..)))
}

pub fn parse_goaway(payload: &[u8]) -> Result<u64, ErrorCode> {
    let mut remaining = payload.len() as u64;
    let (stream_id, _) =
        varint::decode_bounded(payload, &mut remaining).ok_or(ErrorCode::MalformedFrameGoaway)?;
    if remaining != 0 {
        return Err(ErrorCode::MalformedFrameGoaway);
    }
    Ok(stream_id)
}

pub fn parse_max_push_id(payload: &[u8]) -> Result<PushId, ErrorCode> {
    let mut remaining = payload.len() as u64;
    let (push_id, _) = varint::decode_bounded(payload, &mut remaining)
        .ok_or(ErrorCode::MalformedFrameMaxPushId)?;
    if remaining != 0 {
        return Err(ErrorCode::MalformedFrameMaxPushId);
    }
    Ok(PushId::internal(push_id))
}

// ── Framer ──────────────────────────────────────────────────────────
//
// Every writer computes all varint sizes before appending the first
// byte, so a TooLarge failure leaves the output queue untouched.

/// Append `[varint type][varint length]`. Returns the header size.
pub fn write_frame_header(
    out: &mut BytesMut,
    raw_type: u64,
    length: u64,
) -> Result<usize, TooLarge> {
    let size = varint::size_of(raw_type)? + varint::size_of(length)?;
    varint::encode(out, raw_type)?;
    varint::encode(out, length)?;
    Ok(size)
}

fn write_simple_frame(
    out: &mut BytesMut,
    raw_type: u64,
    payload: &[u8],
) -> Result<usize, TooLarge> {
    let header = write_frame_header(out, raw_type, payload.len() as u64)?;
    out.put_slice(payload);
    Ok(header + payload.len())
}

pub fn write_data(out: &mut BytesMut, payload: &[u8]) -> Result<usize, TooLarge> {
    write_simple_frame(out, FRAME_DATA, payload)
}

/// Append raw bytes with no frame header (partially reliable DATA).
pub fn write_unframed_bytes(out: &mut BytesMut, payload: &[u8]) -> usize {
    out.put_slice(payload);
    payload.len()
}

pub fn write_headers(out: &mut BytesMut, block: &[u8]) -> Result<usize, TooLarge> {
    write_simple_frame(out, FRAME_HEADERS, block)
}

pub fn write_priority(out: &mut BytesMut, priority: &PriorityUpdate) -> Result<usize, TooLarge> {
    let flags = encode_priority_flags(priority);

    // flags byte + weight byte + element id varints
    let mut payload_size = 2 + varint::size_of(priority.prioritized_element_id)?;
    if priority.dependency_type != ElementType::TreeRoot {
        payload_size += varint::size_of(priority.element_dependency_id)?;
    }

    let header = write_frame_header(out, FRAME_PRIORITY, payload_size as u64)?;
    out.put_u8(flags);
    varint::encode(out, priority.prioritized_element_id)?;
    if priority.dependency_type != ElementType::TreeRoot {
        varint::encode(out, priority.element_dependency_id)?;
    }
    out.put_u8(priority.weight);
    Ok(header + payload_size)
}

pub fn write_cancel_push(out: &mut BytesMut, push_id: PushId) -> Result<usize, TooLarge> {
    debug_assert!(push_id.is_internal(), "CANCEL_PUSH takes an internal push id");
    let id = push_id.wire_value();
    let id_size = varint::size_of(id)?;
    let header = write_frame_header(out, FRAME_CANCEL_PUSH, id_size as u64)?;
    varint::encode(out, id)?;
    Ok(header + id_size)
}

pub fn write_settings(out: &mut BytesMut, settings: &[SettingPair]) -> Result<usize, TooLarge> {
    let mut payload_size = 0usize;
    for (id, value) in settings {
        payload_size += varint::size_of(id.raw())? + varint::size_of(*value)?;
    }
    let header = write_frame_header(out, FRAME_SETTINGS, payload_size as u64)?;
    for (id, value) in settings {
        varint::encode(out, id.raw())?;
        varint::encode(out, *value)?;
    }
    Ok(header + payload_size)
}

pub fn write_push_promise(
    out: &mut BytesMut,
    push_id: PushId,
    block: &[u8],
) -> Result<usize, TooLarge> {
    debug_assert!(
        push_id.is_internal(),
        "PUSH_PROMISE takes an internal push id"
    );
    let id = push_id.wire_value();
    let payload_size = varint::size_of(id)? + block.len();
    let header = write_frame_header(out, FRAME_PUSH_PROMISE, payload_size as u64)?;
    varint::encode(out, id)?;
    out.put_slice(block);
    Ok(header + payload_size)
}

pub fn write_goaway(out: &mut BytesMut, last_stream_id: u64) -> Result<usize, TooLarge> {
    let id_size = varint::size_of(last_stream_id)?;
    let header = write_frame_header(out, FRAME_GOAWAY, id_size as u64)?;
    varint::encode(out, last_stream_id)?;
    Ok(header + id_size)
}

pub fn write_max_push_id(out: &mut BytesMut, max_push_id: PushId) -> Result<usize, TooLarge> {
    debug_assert!(
        max_push_id.is_internal(),
        "MAX_PUSH_ID takes an internal push id"
    );
    let id = max_push_id.wire_value();
    let id_size = varint::size_of(id)?;
    let header = write_frame_header(out, FRAME_MAX_PUSH_ID, id_size as u64)?;
    varint::encode(out, id)?;
    Ok(header + id_size)
}

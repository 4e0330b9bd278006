//! Sans-IO HTTP/3 framing codec.
//!
//! This crate converts the ordered byte stream of a QUIC stream into
//! typed HTTP/3 frame events and back. It handles:
//!
//! - QUIC variable-length integer encoding/decoding
//! - Byte-exact frame serialization (DATA, HEADERS, PRIORITY,
//!   CANCEL_PUSH, SETTINGS, PUSH_PROMISE, GOAWAY, MAX_PUSH_ID)
//! - Resumable streaming frame parsing under arbitrary fragmentation,
//!   with per-frame-type validity rules and frame-type-specific error
//!   codes
//! - Verification of QPACK-decoded header fields into a validated HTTP
//!   message
//!
//! # Architecture
//!
//! ```text
//!   QUIC stream bytes
//!        │ on_ingress()
//!   ┌────▼────────┐
//!   │ FrameParser │  frame headers, DATA chunks, payload events
//!   └────┬────────┘
//!        │ HEADERS / PUSH_PROMISE blocks
//!   ┌────▼────────┐      ┌───────────────┐
//!   │    QPACK    │─────▶│ MessageDecoder │──▶ validated Message
//!   │  (external) │      └───────────────┘
//!   └─────────────┘
//! ```
//!
//! The transport is out of scope: the parser consumes caller-provided
//! chunks and reports how much it took, and the framer appends to a
//! caller-provided queue. Each codec instance belongs to one
//! connection and is single-threaded.
//!
//! # Example
//!
//! ```rust,ignore
//! use bytes::BytesMut;
//! use protocol_h3::{frame, FrameParser, FrameVisitor, StreamRole};
//!
//! let mut out = BytesMut::new();
//! frame::write_data(&mut out, b"hello")?;
//!
//! let mut parser = FrameParser::new(0, StreamRole::ServerRequest);
//! let consumed = parser.on_ingress(&out.freeze(), &mut visitor);
//! ```

pub mod error;
pub mod frame;
pub mod headers;
pub mod message;
pub mod parser;
pub mod settings;
pub mod varint;

pub use error::{CodecError, DecodeError, Direction, ErrorCode, HeaderError, TooLarge};
pub use frame::{ElementType, FrameHeader, FrameKind, PriorityUpdate, PushId};
pub use headers::{HeaderObserver, MessageDecoder, RequestVerifier};
pub use message::{HeaderName, Headers, Message};
pub use parser::{
    Directive, FrameParser, FrameVisitor, NoPartialReliability, PartialReliabilityHook, StreamRole,
};
pub use settings::{SettingId, SettingPair};

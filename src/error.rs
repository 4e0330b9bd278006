//! Error taxonomy for the HTTP/3 framing codec.
//!
//! Parsing errors are connection-fatal and carry a wire error code;
//! header-decode failures stay on the affected message; the framer can
//! only fail on varint overflow.

/// HTTP/3 connection error codes (pre-RFC draft numbering).
///
/// The malformed-frame family lives at `0x0100 + frame type`, so every
/// frame kind rejects with its own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x00,
    WrongSettingDirection = 0x01,
    PushRefused = 0x02,
    InternalError = 0x03,
    PushAlreadyInCache = 0x04,
    RequestCancelled = 0x05,
    IncompleteRequest = 0x06,
    ConnectError = 0x07,
    ExcessiveLoad = 0x08,
    VersionFallback = 0x09,
    /// Frame received on a stream class where it is never legal.
    WrongStream = 0x0a,
    PushLimitExceeded = 0x0b,
    DuplicatePush = 0x0c,
    UnknownStreamType = 0x0d,
    WrongStreamCount = 0x0e,
    ClosedCriticalStream = 0x0f,
    /// Frame legal on this stream class but not in this direction.
    WrongStreamDirection = 0x10,
    EarlyResponse = 0x11,
    MissingSettings = 0x12,
    UnexpectedFrame = 0x13,
    RequestRejected = 0x14,
    GeneralProtocolError = 0xff,
    MalformedFrameData = 0x0100,
    MalformedFrameHeaders = 0x0101,
    MalformedFramePriority = 0x0102,
    MalformedFrameCancelPush = 0x0103,
    MalformedFrameSettings = 0x0104,
    MalformedFramePushPromise = 0x0105,
    MalformedFrameGoaway = 0x0107,
    MalformedFrameMaxPushId = 0x010d,
}

impl ErrorCode {
    /// The integer carried on the wire and in [`CodecError::errno`].
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Which direction of the stream an error applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
    IngressAndEgress,
}

/// Connection-fatal codec error, surfaced at most once per connection
/// through [`FrameVisitor::on_error`](crate::parser::FrameVisitor::on_error).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (errno={})", self.errno())]
pub struct CodecError {
    pub direction: Direction,
    pub code: ErrorCode,
    pub message: &'static str,
}

impl CodecError {
    /// A connection error affecting both directions, as every ingress
    /// parse failure does.
    pub fn connection(code: ErrorCode) -> Self {
        Self {
            direction: Direction::IngressAndEgress,
            code,
            message: "Connection error",
        }
    }

    /// The HTTP/3 error code as an integer errno.
    pub fn errno(&self) -> u32 {
        self.code.as_u32()
    }
}

/// Varint encode failure: the value does not fit in 62 bits.
///
/// The only error the framer can produce; the output queue is left
/// untouched when it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value exceeds the 62-bit varint range")]
pub struct TooLarge;

/// Failure codes reported by the external QPACK decoder.
///
/// `None` is the resting state; anything else poisons the in-progress
/// message without tearing down the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeError {
    #[default]
    None,
    CompressionError,
    BufferUnderflow,
    HeaderTooLarge,
    BadSequenceNumber,
    InvalidIndex,
}

/// Why a decoded header block was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// Semantic validation failed; the text matches the first rule the
    /// block violated.
    #[error("{0}")]
    Invalid(String),
    /// The QPACK decoder itself failed before validation could finish.
    #[error("header block decode failed: {0:?}")]
    Decode(DecodeError),
}

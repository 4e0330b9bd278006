//! Header-decode verification.
//!
//! The QPACK decoder is external; it reports decoded fields through a
//! streaming callback surface. [`MessageDecoder`] consumes that stream
//! and builds a validated [`Message`], enforcing pseudo-header
//! ordering, request/response shape, content-length consistency, and
//! forbidden headers. Failures land on the message as a parsing error;
//! they are not connection-fatal.

use tracing::trace;

use crate::error::{DecodeError, HeaderError};
use crate::message::{HeaderName, Message};

/// Streaming callback surface of the QPACK decoder.
///
/// One `on_header` per field, then exactly one of
/// `on_headers_complete` or `on_decode_error`.
pub trait HeaderObserver {
    /// Returns false when the field was rejected; the decoder may stop
    /// early, but delivering further fields is harmless.
    fn on_header(&mut self, name: &str, value: &str) -> bool;

    /// `decoded_size` is the compressed block size; `acknowledge`
    /// tells the session whether the decoder wants a QPACK ack.
    fn on_headers_complete(&mut self, decoded_size: usize, acknowledge: bool);

    fn on_decode_error(&mut self, error: DecodeError);
}

// ── Field validation ────────────────────────────────────────────────

/// RFC 7230 token check for header names the codec does not recognize.
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_byte)
}

/// Strict field-value check: HTAB, SP, and visible ASCII only. CR, LF,
/// NUL, and the rest of the control range are rejected.
pub fn is_valid_header_value(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (0x20..=0x7e).contains(&b))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

fn is_valid_method(method: &str) -> bool {
    !method.is_empty() && method.bytes().all(is_token_byte)
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty() && (path.starts_with('/') || path == "*")
}

// ── Request pseudo-header verifier ──────────────────────────────────

/// Enforces single occurrence and well-formedness of request
/// pseudo-headers, then the overall request shape at `validate`.
///
/// Setter failures park their message in [`error`](Self::error); the
/// decoder surfaces it when the block completes.
#[derive(Debug, Default)]
pub struct RequestVerifier {
    pub error: String,
    has_method: bool,
    has_scheme: bool,
    has_authority: bool,
    has_path: bool,
    has_protocol: bool,
}

impl RequestVerifier {
    pub fn set_method(&mut self, msg: &mut Message, value: &str) -> bool {
        if self.has_method {
            self.error = "Duplicate method".to_string();
            return false;
        }
        if !is_valid_method(value) {
            self.error = format!("Invalid method: {value}");
            return false;
        }
        self.has_method = true;
        msg.set_method(value);
        true
    }

    pub fn set_scheme(&mut self, msg: &mut Message, value: &str) -> bool {
        if self.has_scheme {
            self.error = "Duplicate scheme".to_string();
            return false;
        }
        if !value.eq_ignore_ascii_case("http") && !value.eq_ignore_ascii_case("https") {
            self.error = format!("Invalid scheme: {value}");
            return false;
        }
        self.has_scheme = true;
        msg.set_scheme(value);
        true
    }

    pub fn set_authority(&mut self, msg: &mut Message, value: &str) -> bool {
        if self.has_authority {
            self.error = "Duplicate authority".to_string();
            return false;
        }
        if !is_valid_header_value(value) {
            self.error = format!("Invalid authority: {value}");
            return false;
        }
        self.has_authority = true;
        msg.set_authority(value);
        true
    }

    pub fn set_path(&mut self, msg: &mut Message, value: &str) -> bool {
        if self.has_path {
            self.error = "Duplicate path".to_string();
            return false;
        }
        if !is_valid_path(value) {
            self.error = format!("Invalid url: {value}");
            return false;
        }
        self.has_path = true;
        msg.set_path(value);
        true
    }

    pub fn set_upgrade_protocol(&mut self, msg: &mut Message, value: &str) -> bool {
        if self.has_protocol {
            self.error = "Duplicate protocol".to_string();
            return false;
        }
        if !is_valid_header_value(value) {
            self.error = format!("Invalid protocol: {value}");
            return false;
        }
        self.has_protocol = true;
        msg.set_upgrade_protocol(value);
        true
    }

    /// Check the overall request shape once all fields are in.
    ///
    /// CONNECT without `:protocol` takes authority-form: authority
    /// required, scheme and path forbidden. Everything else requires
    /// method, scheme, and path.
    pub fn validate(&mut self, msg: &Message) -> bool {
        if !self.error.is_empty() {
            return false;
        }
        let plain_connect = msg.method() == Some("CONNECT") && !self.has_protocol;
        if plain_connect {
            if self.has_scheme || self.has_path || !self.has_authority {
                self.error = "Malformed CONNECT request".to_string();
                return false;
            }
        } else if !self.has_method || !self.has_scheme || !self.has_path {
            self.error = "Malformed request".to_string();
            return false;
        }
        true
    }
}

// ── Message decoder ─────────────────────────────────────────────────

/// Builds a validated [`Message`] from a QPACK decoder's field stream.
pub struct MessageDecoder {
    msg: Message,
    is_request: bool,
    is_request_trailers: bool,
    pseudo_header_seen: bool,
    regular_header_seen: bool,
    has_status: bool,
    content_length: Option<u32>,
    decode_error: DecodeError,
    parsing_error: String,
    verifier: RequestVerifier,
}

impl MessageDecoder {
    fn new(is_request: bool, is_request_trailers: bool) -> Self {
        Self {
            msg: Message::default(),
            is_request,
            is_request_trailers,
            pseudo_header_seen: false,
            regular_header_seen: false,
            has_status: false,
            content_length: None,
            decode_error: DecodeError::None,
            parsing_error: String::new(),
            verifier: RequestVerifier::default(),
        }
    }

    /// Decode a request header block.
    pub fn new_request() -> Self {
        Self::new(true, false)
    }

    /// Decode a response header block (or response trailers: a block
    /// with no `:status` is treated as trailers at completion).
    pub fn new_response() -> Self {
        Self::new(false, false)
    }

    /// Decode request trailers, where pseudo-headers are forbidden.
    pub fn new_request_trailers() -> Self {
        Self::new(true, true)
    }

    /// The validation failure, if any.
    pub fn parsing_error(&self) -> Option<&str> {
        (!self.parsing_error.is_empty()).then_some(self.parsing_error.as_str())
    }

    /// The upstream QPACK failure, if any.
    pub fn decode_error(&self) -> DecodeError {
        self.decode_error
    }

    pub fn has_status(&self) -> bool {
        self.has_status
    }

    /// The message as populated so far.
    pub fn message(&self) -> &Message {
        &self.msg
    }

    /// The validated message, or why there is none.
    pub fn into_message(self) -> Result<Message, HeaderError> {
        if self.decode_error != DecodeError::None {
            return Err(HeaderError::Decode(self.decode_error));
        }
        if !self.parsing_error.is_empty() {
            return Err(HeaderError::Invalid(self.parsing_error));
        }
        Ok(self.msg)
    }

    fn on_pseudo_header(&mut self, name: &str, value: &str) -> bool {
        self.pseudo_header_seen = true;
        if self.regular_header_seen {
            self.parsing_error = format!("Illegal pseudo header name={name}");
            return false;
        }
        if self.is_request {
            let ok = match name {
                ":method" => self.verifier.set_method(&mut self.msg, value),
                ":scheme" => self.verifier.set_scheme(&mut self.msg, value),
                ":authority" => self.verifier.set_authority(&mut self.msg, value),
                ":path" => self.verifier.set_path(&mut self.msg, value),
                ":protocol" => self.verifier.set_upgrade_protocol(&mut self.msg, value),
                _ => {
                    self.parsing_error = format!("Invalid req header name={name}");
                    return false;
                }
            };
            // A setter failure stays in the verifier until the block
            // completes; it does not stop field delivery.
            ok
        } else if name == ":status" {
            if self.has_status {
                self.parsing_error = "Duplicate status".to_string();
                return false;
            }
            self.has_status = true;
            let code = value.parse::<i32>().unwrap_or(-1);
            if (100..=999).contains(&code) {
                self.msg.set_status(code as u16);
                true
            } else {
                self.parsing_error = format!("Malformed status code={value}");
                false
            }
        } else {
            self.parsing_error = format!("Invalid resp header name={name}");
            false
        }
    }

    fn on_regular_header(&mut self, name: &str, value: &str) -> bool {
        self.regular_header_seen = true;
        let code = HeaderName::parse(name);
        if code == HeaderName::Connection {
            self.parsing_error = "HTTP/2 Message with Connection header".to_string();
            return false;
        }
        if code == HeaderName::ContentLength {
            let content_length = value.parse::<u32>().unwrap_or(0);
            if let Some(previous) = self.content_length
                && previous != content_length
            {
                self.parsing_error = "Multiple content-length headers".to_string();
                return false;
            }
            self.content_length = Some(content_length);
        }
        let name_ok = !matches!(code, HeaderName::Other(_)) || is_valid_header_name(name);
        let value_ok = is_valid_header_value(value);
        if !name_ok || !value_ok {
            self.parsing_error = format!("Bad header value: name={name} value={value}");
            return false;
        }
        self.msg.headers_mut().add(code, value);
        true
    }
}

impl HeaderObserver for MessageDecoder {
    fn on_header(&mut self, name: &str, value: &str) -> bool {
        // Refuse further fields once an error is recorded.
        if self.decode_error != DecodeError::None || !self.parsing_error.is_empty() {
            trace!(name, value, "ignoring header after error");
            return true;
        }
        if name.starts_with(':') {
            self.on_pseudo_header(name, value)
        } else {
            self.on_regular_header(name, value)
        }
    }

    fn on_headers_complete(&mut self, decoded_size: usize, _acknowledge: bool) {
        if self.is_request && !self.is_request_trailers {
            let combined = self.msg.headers().combine(&HeaderName::Cookie, "; ");
            if !combined.is_empty() {
                self.msg.headers_mut().set(HeaderName::Cookie, combined);
            }
            if !self.verifier.validate(&self.msg) {
                self.parsing_error = self.verifier.error.clone();
                return;
            }
        }

        let is_response_trailers = !self.is_request && !self.has_status;
        if (self.is_request_trailers || is_response_trailers) && self.pseudo_header_seen {
            self.parsing_error = "Pseudo headers forbidden in trailers.".to_string();
            return;
        }

        self.msg.set_version(1, 1);
        self.msg.set_ingress_header_size(decoded_size);
    }

    fn on_decode_error(&mut self, error: DecodeError) {
        self.decode_error = error;
    }
}

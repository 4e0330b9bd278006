//! HTTP message assembled from decoded header fields.

use std::fmt;

/// Header names the codec recognizes and keys on, plus a catch-all
/// that keeps the original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderName {
    Connection,
    ContentLength,
    Cookie,
    Other(String),
}

impl HeaderName {
    /// Case-insensitive recognition.
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("connection") {
            Self::Connection
        } else if name.eq_ignore_ascii_case("content-length") {
            Self::ContentLength
        } else if name.eq_ignore_ascii_case("cookie") {
            Self::Cookie
        } else {
            Self::Other(name.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Connection => "connection",
            Self::ContentLength => "content-length",
            Self::Cookie => "cookie",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of header fields. Names may repeat.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(HeaderName, String)>,
}

impl Headers {
    pub fn add(&mut self, name: HeaderName, value: impl Into<String>) {
        self.fields.push((name, value.into()));
    }

    /// First value under `name`, if any.
    pub fn get(&self, name: &HeaderName) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replace every field under `name` with a single value.
    pub fn set(&mut self, name: HeaderName, value: impl Into<String>) {
        self.fields.retain(|(n, _)| *n != name);
        self.fields.push((name, value.into()));
    }

    /// Join all values under `name` with `sep`. Empty when absent.
    pub fn combine(&self, name: &HeaderName, sep: &str) -> String {
        self.get_all(name).collect::<Vec<_>>().join(sep)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, String)> {
        self.fields.iter()
    }
}

/// An HTTP request or response under construction.
///
/// Request and response fields coexist; which side is populated is
/// decided by the decoder that fills it in.
#[derive(Debug, Clone, Default)]
pub struct Message {
    method: Option<String>,
    scheme: Option<String>,
    authority: Option<String>,
    path: Option<String>,
    upgrade_protocol: Option<String>,
    status: Option<u16>,
    reason: Option<String>,
    version: (u8, u8),
    headers: Headers,
    ingress_header_size: usize,
}

impl Message {
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = Some(method.into());
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn set_scheme(&mut self, scheme: impl Into<String>) {
        self.scheme = Some(scheme.into());
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn set_authority(&mut self, authority: impl Into<String>) {
        self.authority = Some(authority.into());
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
    }

    /// The `:protocol` pseudo-header of an extended CONNECT.
    pub fn upgrade_protocol(&self) -> Option<&str> {
        self.upgrade_protocol.as_deref()
    }

    pub fn set_upgrade_protocol(&mut self, protocol: impl Into<String>) {
        self.upgrade_protocol = Some(protocol.into());
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Set the status code along with its default reason phrase.
    pub fn set_status(&mut self, code: u16) {
        self.status = Some(code);
        self.reason = Some(status_reason(code).to_string());
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn set_version(&mut self, major: u8, minor: u8) {
        self.version = (major, minor);
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Compressed size of the header block this message came from.
    pub fn ingress_header_size(&self) -> usize {
        self.ingress_header_size
    }

    pub fn set_ingress_header_size(&mut self, size: usize) {
        self.ingress_header_size = size;
    }
}

/// Default reason phrase for a status code. Empty when unassigned.
pub fn status_reason(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        103 => "Early Hints",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        421 => "Misdirected Request",
        425 => "Too Early",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

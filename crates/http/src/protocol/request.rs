//! HTTP request header handling.
//!
//! [`RequestHeader`] wraps an `http::Request<()>` produced by the header decoder and
//! answers the one framing question the connection asks after each response:
//! whether the connection stays open.

use http::header::CONNECTION;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the connection should stay open after this exchange.
    ///
    /// HTTP/1.1 is persistent unless the client sends `Connection: close`,
    /// HTTP/1.0 closes unless the client sends `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.version(), self.headers())
    }
}

/// Keep-alive decision shared by the connection loop and [`RequestHeader::keep_alive`].
pub fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers.get(CONNECTION).map(|value| value.as_bytes());
    match connection {
        Some(value) if value.eq_ignore_ascii_case(b"close") => false,
        Some(value) if value.eq_ignore_ascii_case(b"keep-alive") => true,
        _ => version == Version::HTTP_11,
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

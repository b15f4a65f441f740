//! HTTP request decoder module
//!
//! Decodes complete HTTP requests: the head through [`HeaderDecoder`], then the
//! `Content-Length` delimited body, buffered in full.
//!
//! # Example
//!
//! ```no_run
//! use micro_api_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET /users HTTP/1.1\r\n\r\n");
//! let request = decoder.decode(&mut buffer);
//! ```

use crate::codec::header_decoder::HeaderDecoder;
use crate::protocol::{ParseError, RequestHeader};
use bytes::{Bytes, BytesMut};
use http::Request;
use tokio_util::codec::Decoder;
use tracing::trace;

/// A decoder for whole HTTP requests.
///
/// # State Machine
///
/// The decoder keeps its state in the `pending` field:
/// - `None`: currently parsing headers
/// - `Some((header, length))`: header parsed, waiting for `length` body bytes
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    pending: Option<(RequestHeader, usize)>,
}

impl RequestDecoder {
    /// Creates a new `RequestDecoder` instance
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Request<Bytes>;
    type Error = ParseError;

    /// Attempts to decode one HTTP request from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(request))`: a complete request, body included
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            match self.header_decoder.decode(src)? {
                Some((header, payload_size)) => {
                    // the header decoder caps the declared length, so it always fits in usize
                    let length = usize::try_from(payload_size.len())
                        .map_err(|_e| ParseError::invalid_content_length("length overflows usize"))?;
                    self.pending = Some((header, length));
                }
                None => return Ok(None),
            }
        }

        let length = match &self.pending {
            Some((_, length)) => *length,
            None => return Ok(None),
        };

        if src.len() < length {
            src.reserve(length - src.len());
            trace!(expected = length, received = src.len(), "waiting for request body");
            return Ok(None);
        }

        let body = src.split_to(length).freeze();
        Ok(self.pending.take().map(|(header, _)| header.body(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    #[test]
    fn decode_request_without_body() {
        let mut buf = BytesMut::from("GET /users/42 HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let request = RequestDecoder::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.uri().path(), "/users/42");
        assert!(request.body().is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_body_across_reads() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from("POST /users HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello");

        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b" world");
        let request = decoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(&request.body()[..], b"hello world");
    }

    #[test]
    fn decode_pipelined_requests() {
        let str = indoc! {r##"
        PUT /users/1 HTTP/1.1
        Content-Length: 2

        {}GET /users HTTP/1.1

        "##};

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(str);

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.method(), Method::PUT);
        assert_eq!(&first.body()[..], b"{}");

        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.method(), Method::GET);
        assert_eq!(second.uri().path(), "/users");

        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }
}

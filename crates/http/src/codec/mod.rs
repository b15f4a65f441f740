//! HTTP codec module for decoding requests and encoding responses
//!
//! - [`RequestDecoder`]: decodes one complete request (head and `Content-Length` body) at a time
//! - [`HeaderDecoder`]: the head-only stage used by the request decoder
//! - [`ResponseEncoder`]: writes a complete response
//!
//! # Example
//!
//! ```no_run
//! use micro_api_http::codec::{RequestDecoder, ResponseEncoder};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut decoder = RequestDecoder::new();
//! let mut request_buffer = BytesMut::new();
//! let request = decoder.decode(&mut request_buffer);
//!
//! let mut encoder = ResponseEncoder::new();
//! let mut response_buffer = BytesMut::new();
//! encoder.encode(http::Response::new(Bytes::new()), &mut response_buffer).unwrap();
//! ```

mod header_decoder;
mod request_decoder;
mod response_encoder;

pub use header_decoder::{HeaderDecoder, MAX_BODY_BYTES, MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;

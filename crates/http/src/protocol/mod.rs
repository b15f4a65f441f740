//! Core HTTP protocol abstractions.
//!
//! - [`RequestHeader`]: a decoded request head with the framing helpers the connection needs
//! - [`PayloadSize`]: how the body of a decoded request is delimited
//! - [`HttpError`], [`ParseError`], [`SendError`]: transport error types
//!
//! Request bodies are buffered in full before the request is handed to a handler,
//! so the handler side only ever sees `http::Request<bytes::Bytes>`.

mod message;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;
pub use request::keep_alive;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

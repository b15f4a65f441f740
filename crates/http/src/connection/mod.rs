//! HTTP connection handling module
//!
//! - [`HttpConnection`]: reads complete requests off one connection, hands them to a
//!   [`Handler`](crate::handler::Handler) and writes back the responses, keeping the
//!   connection alive while the client allows it.

mod http_connection;

pub use http_connection::HttpConnection;

//! The buffered HTTP/1.1 transport under `micro-api`
//!
//! This crate turns bytes on a connection into complete `http::Request<Bytes>` values
//! and complete `http::Response<Bytes>` values back into bytes. Request bodies are
//! buffered in full (bounded by `Content-Length`), which keeps everything above the
//! transport synchronous and free of streaming concerns.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use micro_api_http::connection::HttpConnection;
//! use micro_api_http::handler::make_handler;
//!
//! #[tokio::main]
//! async fn main() {
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer);
//!             if let Err(e) = connection.process(handler).await {
//!                 error!("service has error, cause {}, connection shutdown", e);
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(request: Request<Bytes>) -> Result<Response<Bytes>, Infallible> {
//!     info!(path = request.uri().path(), body_size = request.body().len(), "receiving request");
//!
//!     let mut response = Response::new(Bytes::from_static(b"Hello World!\r\n"));
//!     *response.status_mut() = StatusCode::OK;
//!     Ok(response)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the per-connection request/response loop
//! - [`protocol`]: request head, payload framing and error types
//! - [`codec`]: request decoding and response encoding
//! - [`handler`]: the [`handler::Handler`] trait the connection calls
//!
//! # Limitations
//!
//! - HTTP/1.1 and HTTP/1.0 only
//! - No chunked request bodies and no `Expect: 100-continue`
//! - Maximum header size: 8KB, maximum number of headers: 64
//! - Maximum request body: 1MB

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;

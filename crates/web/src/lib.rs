//! A minimal JSON API framework on top of `micro-api-http`.
//!
//! Requests are resolved against a [`RouteTable`], run through the named middleware of
//! the matched route and handed to its handler. Every response, including routing
//! misses and faults, is one of two JSON envelopes built by [`ResponseBuilder`].
//!
//! ```no_run
//! use http::StatusCode;
//! use micro_api::{Dispatcher, RouteTable, Server, handler_fn, logging};
//! use micro_api::middleware::AuthMiddleware;
//! use micro_api::token::SignedTokenValidator;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     logging::init(tracing::Level::INFO)?;
//!
//!     let mut routes = RouteTable::new();
//!     routes.get("/users/:id", "UserController@show", &[])?;
//!     routes.delete("/users/:id", "UserController@destroy", &["auth"])?;
//!
//!     let dispatcher = Dispatcher::builder(routes)
//!         .handler("UserController@show", handler_fn(|req, resp| {
//!             let id: u64 = req.path_param_as("id")?;
//!             resp.success(json!({ "id": id }), "User retrieved")?;
//!             Ok(())
//!         }))
//!         .handler("UserController@destroy", handler_fn(|_req, resp| {
//!             resp.success_with_status(json!(null), "User deleted", StatusCode::OK)?;
//!             Ok(())
//!         }))
//!         .middleware("auth", AuthMiddleware::new(SignedTokenValidator::new(), "change-me"))
//!         .build();
//!
//!     Server::builder().dispatcher(dispatcher).address("127.0.0.1:8080").build()?.start().await?;
//!     Ok(())
//! }
//! ```

mod handler;
mod request;
mod response;
mod server;

pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod middleware;
pub mod path;
pub mod router;
pub mod token;
pub mod validation;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherBuilder, Stage};
pub use handler::{FnHandler, HandlerError, HandlerRegistry, RequestHandler, handler_fn};
pub use request::{ParamError, PathParams, RequestContext, RequestError};
pub use response::{Envelope, ResponseBuilder, ResponseError, ValidationErrors};
pub use router::{HandlerRef, Resolution, Route, RouteTable};
pub use server::{Server, ServerBuildError, ServerBuilder};

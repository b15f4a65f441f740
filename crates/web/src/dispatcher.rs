//! The request pipeline: resolve, attach path parameters, run middleware, invoke the handler.
//!
//! [`Dispatcher::dispatch`] never fails. Every request ends in exactly one response:
//! routing misses become 404 or 405, configuration mistakes and faults become 500,
//! and a handler that returns without writing a response is a fault as well.

use crate::handler::{HandlerRegistry, RequestHandler};
use crate::middleware::{ChainOutcome, Middleware, MiddlewareChain, MiddlewareError, MiddlewareRegistry};
use crate::request::{ParamError, RequestError};
use crate::response::{ResponseError, error_response};
use crate::router::{HandlerRef, Resolution, RouteTable};
use crate::{RequestContext, ResponseBuilder};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http::header::{self, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use micro_api_http::handler::Handler;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use std::any::Any;
use std::convert::Infallible;
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Why a dispatch ended without the handler's own response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("no handler registered under '{name}'")]
    UnknownHandler { name: String },

    #[error("no middleware registered under '{name}'")]
    UnknownMiddleware { name: String },

    #[error("middleware '{name}' failed: {source}")]
    MiddlewareFault {
        name: String,
        #[source]
        source: MiddlewareError,
    },

    #[error("handler failed: {source}")]
    HandlerFault {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("handler panicked: {message}")]
    HandlerPanicked { message: String },

    #[error("middleware panicked: {message}")]
    MiddlewarePanicked { message: String },

    #[error("handler returned without writing a response")]
    NoResponse,

    #[error("dispatch exceeded {after:?}")]
    TimedOut { after: Duration },

    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl DispatchError {
    /// The status and client facing message this error is answered with.
    ///
    /// Faults keep their detail out of the response; configuration errors name what is missing.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::UnknownHandler { .. } | Self::UnknownMiddleware { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            Self::HandlerFault { source } => {
                if let Some(e) = source.downcast_ref::<ParamError>() {
                    (StatusCode::BAD_REQUEST, e.to_string())
                } else if let Some(e @ RequestError::InvalidBody { .. }) = source.downcast_ref::<RequestError>() {
                    (StatusCode::BAD_REQUEST, e.to_string())
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_owned())
                }
            }
            Self::MiddlewareFault { .. }
            | Self::HandlerPanicked { .. }
            | Self::MiddlewarePanicked { .. }
            | Self::Response(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_owned())
            }
            Self::NoResponse => (StatusCode::INTERNAL_SERVER_ERROR, "Handler produced no response".to_owned()),
            Self::TimedOut { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Request timed out".to_owned()),
        }
    }

    pub fn to_response(&self) -> Response<Bytes> {
        let (status, message) = self.status_and_message();
        error_response(status, &message)
    }
}

/// Where a dispatch is, traced at debug level.
///
/// `Start → Resolving → Matched → MiddlewarePassed → Handled` on success,
/// `Start → Resolving → Unmatched → Rejected` for routing misses. A request stopped
/// by middleware goes from `Matched` to `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Resolving,
    Matched,
    MiddlewarePassed,
    Handled,
    Unmatched,
    Rejected,
}

fn enter(stage: Stage, method: &Method, path: &str) {
    debug!(?stage, %method, path, "dispatch stage");
}

/// Routes requests through a [`RouteTable`]. Immutable once built, shared across connections.
pub struct Dispatcher {
    table: Arc<RouteTable>,
    handlers: HandlerRegistry,
    middleware: MiddlewareRegistry,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.table.len())
            .field("handlers", &self.handlers)
            .field("middleware", &self.middleware)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Dispatcher {
    pub fn builder(table: RouteTable) -> DispatcherBuilder {
        DispatcherBuilder::new(table)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    pub async fn dispatch(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        enter(Stage::Start, &method, &path);

        let outcome = match self.timeout {
            Some(after) => tokio::time::timeout(after, self.run(request))
                .await
                .unwrap_or(Err(DispatchError::TimedOut { after })),
            None => self.run(request).await,
        };

        match outcome {
            Ok(response) => {
                debug!(%method, path, status = response.status().as_u16(), "request dispatched");
                response
            }
            Err(e) => {
                let response = e.to_response();
                if response.status().is_server_error() {
                    error!(%method, path, cause = %e, "dispatch failed");
                } else {
                    warn!(%method, path, cause = %e, "request rejected");
                }
                response
            }
        }
    }

    async fn run(&self, request: Request<Bytes>) -> Result<Response<Bytes>, DispatchError> {
        let req = RequestContext::from_request(request)?;
        enter(Stage::Resolving, req.method(), req.path());

        let (route, params) = match self.table.resolve(req.method(), req.path()) {
            Resolution::Matched { route, params } => (route, params),
            Resolution::MethodNotAllowed { allowed } => {
                enter(Stage::Unmatched, req.method(), req.path());
                enter(Stage::Rejected, req.method(), req.path());
                return Ok(method_not_allowed(&allowed));
            }
            Resolution::NotFound => {
                enter(Stage::Unmatched, req.method(), req.path());
                enter(Stage::Rejected, req.method(), req.path());
                return Ok(error_response(StatusCode::NOT_FOUND, "Route not found"));
            }
        };

        enter(Stage::Matched, req.method(), req.path());
        debug!(template = route.template(), ?params, "route matched");
        req.attach_path_params(params)?;

        let handler = self.resolve_handler(route.handler())?;
        let chain = MiddlewareChain::resolve(route.middleware(), &self.middleware)?;

        let mut resp = ResponseBuilder::new();
        let ran = AssertUnwindSafe(chain.run(&req, &mut resp)).catch_unwind().await;
        let outcome = match ran {
            Ok(outcome) => outcome?,
            Err(panic) => return Err(DispatchError::MiddlewarePanicked { message: panic_message(panic.as_ref()) }),
        };
        if let ChainOutcome::ShortCircuited { by } = outcome {
            enter(Stage::Rejected, req.method(), req.path());
            debug!(middleware = %by, "handler skipped");
            return Ok(resp.send()?);
        }
        enter(Stage::MiddlewarePassed, req.method(), req.path());

        let invoked = AssertUnwindSafe(handler.invoke(&req, &mut resp)).catch_unwind().await;
        match invoked {
            Ok(Ok(())) => {}
            // a rejected second write leaves the first response in place
            Ok(Err(source)) if is_second_write(source.as_ref()) && resp.is_finalized() => {
                warn!(template = route.template(), "handler propagated a second write, sending the first response");
            }
            Ok(Err(source)) => return Err(DispatchError::HandlerFault { source }),
            Err(panic) => return Err(DispatchError::HandlerPanicked { message: panic_message(panic.as_ref()) }),
        }

        if !resp.is_finalized() {
            return Err(DispatchError::NoResponse);
        }
        enter(Stage::Handled, req.method(), req.path());
        Ok(resp.send()?)
    }

    fn resolve_handler(&self, handler: &HandlerRef) -> Result<Arc<dyn RequestHandler>, DispatchError> {
        match handler {
            HandlerRef::Bound(handler) => Ok(Arc::clone(handler)),
            HandlerRef::Named(name) => {
                self.handlers.get(name).ok_or_else(|| DispatchError::UnknownHandler { name: name.clone() })
            }
        }
    }
}

#[async_trait]
impl Handler for Dispatcher {
    type Error = Infallible;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Self::Error> {
        Ok(self.dispatch(req).await)
    }
}

fn method_not_allowed(allowed: &[Method]) -> Response<Bytes> {
    let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}

fn is_second_write(source: &(dyn Error + Send + Sync + 'static)) -> bool {
    matches!(source.downcast_ref::<ResponseError>(), Some(ResponseError::AlreadyFinalized))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

pub struct DispatcherBuilder {
    table: RouteTable,
    handlers: HandlerRegistry,
    middleware: MiddlewareRegistry,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder").field("routes", &self.table.len()).finish_non_exhaustive()
    }
}

impl DispatcherBuilder {
    fn new(table: RouteTable) -> Self {
        Self { table, handlers: HandlerRegistry::new(), middleware: MiddlewareRegistry::new(), timeout: None }
    }

    /// Registers a handler that routes can refer to by `name`.
    pub fn handler<H: RequestHandler + 'static>(mut self, name: impl Into<String>, handler: H) -> Self {
        self.handlers.register(name, handler);
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Registers a middleware that routes can refer to by `name`.
    pub fn middleware<M: Middleware + 'static>(mut self, name: impl Into<String>, middleware: M) -> Self {
        self.middleware.register(name, middleware);
        self
    }

    /// A deadline around resolve, middleware and handler of every request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Dispatcher {
        for method in self.table.methods() {
            for route in self.table.find_all(method) {
                if let HandlerRef::Named(name) = route.handler()
                    && !self.handlers.contains(name)
                {
                    warn!(%method, template = route.template(), handler = %name, "route refers to an unregistered handler");
                }
                for name in route.middleware().iter().filter(|name| !self.middleware.contains(name)) {
                    warn!(%method, template = route.template(), middleware = %name, "route refers to an unregistered middleware");
                }
            }
        }
        info!(routes = self.table.len(), handlers = self.handlers.len(), timeout = ?self.timeout, "dispatcher built");

        Dispatcher { table: Arc::new(self.table), handlers: self.handlers, middleware: self.middleware, timeout: self.timeout }
    }
}

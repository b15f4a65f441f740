use crate::{RequestContext, ResponseBuilder};
use async_trait::async_trait;

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Any failure a handler can't answer itself; the dispatcher turns it into a 500.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// The endpoint of a route.
///
/// A handler receives the request with its path parameters attached and must
/// finalize the response builder exactly once.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    async fn invoke(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), HandlerError> {
        self.as_ref().invoke(req, resp).await
    }
}

/// a synchronous closure holder which represents a handler
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseBuilder) -> Result<(), HandlerError> + Send + Sync,
{
    fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseBuilder) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler::new(f)
}

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: Fn(&RequestContext, &mut ResponseBuilder) -> Result<(), HandlerError> + Send + Sync,
{
    async fn invoke(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), HandlerError> {
        (self.f)(req, resp)
    }
}

/// Handlers registered by name, looked up when a route refers to one by name.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any handler of the same name.
    pub fn register<H: RequestHandler + 'static>(&mut self, name: impl Into<String>, handler: H) -> &mut Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}

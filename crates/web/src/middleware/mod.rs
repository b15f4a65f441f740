//! Named middleware run in order before a route's handler.
//!
//! A middleware either leaves the response untouched, and the request proceeds, or
//! finalizes it, and the request stops right there: neither later middleware nor the
//! handler run. Routes refer to middleware by name; the names are resolved against a
//! [`MiddlewareRegistry`] on every dispatch.

mod auth;

pub use auth::AuthMiddleware;

use crate::dispatcher::DispatchError;
use crate::{RequestContext, ResponseBuilder};
use async_trait::async_trait;
use tracing::debug;

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// An internal fault raised by a middleware, answered with a 500.
pub type MiddlewareError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), MiddlewareError>;
}

#[async_trait]
impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    async fn handle(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), MiddlewareError> {
        self.as_ref().handle(req, resp).await
    }
}

pub struct FnMiddleware<F> {
    f: F,
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&RequestContext, &mut ResponseBuilder) -> Result<(), MiddlewareError> + Send + Sync,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&RequestContext, &mut ResponseBuilder) -> Result<(), MiddlewareError> + Send + Sync,
{
    async fn handle(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), MiddlewareError> {
        (self.f)(req, resp)
    }
}

#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    inner: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Middleware + 'static>(&mut self, name: impl Into<String>, middleware: M) -> &mut Self {
        self.inner.insert(name.into(), Arc::new(middleware));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("MiddlewareRegistry").field("middleware", &names).finish()
    }
}

/// How a chain run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every middleware ran and none wrote a response.
    Proceed,
    /// The named middleware finalized the response.
    ShortCircuited { by: String },
}

/// The middleware of one route, resolved for one dispatch.
pub struct MiddlewareChain {
    inner: Vec<(String, Arc<dyn Middleware>)>,
}

impl MiddlewareChain {
    /// Resolves every name in order; the first unknown name fails the whole chain.
    pub fn resolve<S: AsRef<str>>(names: &[S], registry: &MiddlewareRegistry) -> Result<Self, DispatchError> {
        let inner = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                registry
                    .get(name)
                    .map(|middleware| (name.to_owned(), middleware))
                    .ok_or_else(|| DispatchError::UnknownMiddleware { name: name.to_owned() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.iter().map(|(name, _)| name.as_str())
    }

    pub async fn run(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<ChainOutcome, DispatchError> {
        for (name, middleware) in &self.inner {
            middleware
                .handle(req, resp)
                .await
                .map_err(|source| DispatchError::MiddlewareFault { name: name.clone(), source })?;

            if resp.is_finalized() {
                debug!(middleware = %name, status = resp.status().as_u16(), "middleware short-circuited the request");
                return Ok(ChainOutcome::ShortCircuited { by: name.clone() });
            }
        }
        Ok(ChainOutcome::Proceed)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request, StatusCode};
    use std::sync::Mutex;

    fn request() -> RequestContext {
        RequestContext::from_request(Request::builder().uri("/users").body(Bytes::new()).unwrap()).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl Middleware + 'static {
        let log = Arc::clone(log);
        middleware_fn(move |_req, _resp| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[tokio::test]
    async fn runs_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = MiddlewareRegistry::new();
        registry.register("first", recorder(&log, "first")).register("second", recorder(&log, "second"));

        let chain = MiddlewareChain::resolve(&["second", "first"], &registry).unwrap();
        let mut resp = ResponseBuilder::new();
        let outcome = chain.run(&request(), &mut resp).await.unwrap();

        assert_eq!(outcome, ChainOutcome::Proceed);
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
        assert!(!resp.is_finalized());
    }

    #[tokio::test]
    async fn finalized_response_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = MiddlewareRegistry::new();
        registry
            .register("deny", middleware_fn(|_req, resp| Ok(resp.error("Forbidden", StatusCode::FORBIDDEN)?)))
            .register("after", recorder(&log, "after"));

        let chain = MiddlewareChain::resolve(&["deny", "after"], &registry).unwrap();
        let mut resp = ResponseBuilder::new();
        let outcome = chain.run(&request(), &mut resp).await.unwrap();

        assert_eq!(outcome, ChainOutcome::ShortCircuited { by: "deny".into() });
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn middleware_error_is_a_fault() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("broken", middleware_fn(|_req, _resp| Err("storage unavailable".into())));

        let chain = MiddlewareChain::resolve(&["broken"], &registry).unwrap();
        let mut resp = ResponseBuilder::new();
        let result = chain.run(&request(), &mut resp).await;

        assert!(matches!(result, Err(DispatchError::MiddlewareFault { ref name, .. }) if name == "broken"));
    }

    #[test]
    fn unknown_name_fails_resolution() {
        let registry = MiddlewareRegistry::new();
        let result = MiddlewareChain::resolve(&["auth"], &registry);
        assert!(matches!(result, Err(DispatchError::UnknownMiddleware { ref name }) if name == "auth"));
    }

    #[test]
    fn empty_chain() {
        let chain = MiddlewareChain::resolve::<&str>(&[], &MiddlewareRegistry::new()).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }
}

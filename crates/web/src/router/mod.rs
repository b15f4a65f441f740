//! Route registration and resolution.
//!
//! Routes are kept per method in registration order. Resolution takes the first
//! route whose pattern matches, never the most specific one, so a literal route
//! that should win over a parametric sibling must be registered first:
//!
//! ```
//! use http::Method;
//! use micro_api::router::{Resolution, RouteTable};
//!
//! let mut table = RouteTable::new();
//! table.get("/users/new", "UserController@create_form", &[]).unwrap();
//! table.get("/users/:id", "UserController@show", &[]).unwrap();
//!
//! match table.resolve(&Method::GET, "/users/new") {
//!     Resolution::Matched { route, .. } => assert_eq!(route.template(), "/users/new"),
//!     _ => unreachable!(),
//! }
//! ```

mod pattern;

pub use pattern::{PatternError, RoutePattern};

use crate::handler::RequestHandler;
use crate::path::normalize;
use crate::request::PathParams;
use http::Method;
use thiserror::Error;
use tracing::info;

use std::fmt;
use std::sync::Arc;

const SUPPORTED_METHODS: [Method; 7] =
    [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::HEAD, Method::OPTIONS];

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unsupported method '{method}'")]
    UnsupportedMethod { method: Method },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// What a route dispatches to.
#[derive(Clone)]
pub enum HandlerRef {
    /// Looked up by name in the dispatcher's handler registry.
    Named(String),
    /// Called directly.
    Bound(Arc<dyn RequestHandler>),
}

impl HandlerRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn bound<H: RequestHandler + 'static>(handler: H) -> Self {
        Self::Bound(Arc::new(handler))
    }
}

impl From<&str> for HandlerRef {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for HandlerRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn RequestHandler>> for HandlerRef {
    fn from(handler: Arc<dyn RequestHandler>) -> Self {
        Self::Bound(handler)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Bound(_) => f.write_str("Bound(..)"),
        }
    }
}

/// A registered route. Never changes after registration.
#[derive(Debug)]
pub struct Route {
    method: Method,
    pattern: RoutePattern,
    handler: HandlerRef,
    middleware: Vec<String>,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// The normalized template, for diagnostics.
    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }
}

/// Outcome of resolving a method and path.
#[derive(Debug)]
pub enum Resolution<'table> {
    Matched { route: &'table Route, params: PathParams },
    /// The path exists under the `allowed` methods only.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Routes per method, in registration order.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<(Method, Vec<Route>)>,
}

macro_rules! method_registrar {
    ($name:ident, $method:expr) => {
        pub fn $name(
            &mut self,
            template: &str,
            handler: impl Into<HandlerRef>,
            middleware: &[&str],
        ) -> Result<&mut Self, RouteError> {
            self.register($method, template, handler, middleware)
        }
    };
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `template` and appends the route after every route already registered
    /// under `method`.
    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: impl Into<HandlerRef>,
        middleware: &[&str],
    ) -> Result<&mut Self, RouteError> {
        if !SUPPORTED_METHODS.contains(&method) {
            return Err(RouteError::UnsupportedMethod { method });
        }

        let pattern = RoutePattern::compile(template)?;
        let handler = handler.into();
        info!(%method, template = pattern.template(), handler = ?handler, ?middleware, "register route");

        let route = Route { method, pattern, handler, middleware: middleware.iter().map(|&name| name.to_owned()).collect() };
        match self.routes.iter_mut().find(|(method, _)| *method == route.method) {
            Some((_, routes)) => routes.push(route),
            None => self.routes.push((route.method.clone(), vec![route])),
        }
        Ok(self)
    }

    method_registrar!(get, Method::GET);
    method_registrar!(post, Method::POST);
    method_registrar!(put, Method::PUT);
    method_registrar!(patch, Method::PATCH);
    method_registrar!(delete, Method::DELETE);

    /// Routes registered under `method`, in registration order.
    pub fn find_all(&self, method: &Method) -> &[Route] {
        self.routes.iter().find(|(m, _)| m == method).map(|(_, routes)| routes.as_slice()).unwrap_or_default()
    }

    /// Methods with at least one route, in the order they were first registered.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.routes.iter().map(|(method, _)| method)
    }

    pub fn len(&self) -> usize {
        self.routes.iter().map(|(_, routes)| routes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First match under `method`; otherwise 405 when another method matches, 404 when none does.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let path = normalize(path);

        for route in self.find_all(method) {
            if let Some(params) = route.pattern.matches_normalized(&path) {
                return Resolution::Matched { route, params };
            }
        }

        let allowed: Vec<Method> = self
            .routes
            .iter()
            .filter(|(other, _)| other != method)
            .filter(|(_, routes)| routes.iter().any(|route| route.pattern.matches_normalized(&path).is_some()))
            .map(|(other, _)| other.clone())
            .collect();

        if allowed.is_empty() { Resolution::NotFound } else { Resolution::MethodNotAllowed { allowed } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched<'t>(resolution: Resolution<'t>) -> (&'t Route, PathParams) {
        match resolution {
            Resolution::Matched { route, params } => (route, params),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn registration_order_wins() {
        let mut table = RouteTable::new();
        table.get("/users/:id", "UserController@show", &[]).unwrap().get("/users/new", "UserController@create", &[]).unwrap();

        let (route, params) = matched(table.resolve(&Method::GET, "/users/new"));
        assert_eq!(route.template(), "/users/:id");
        assert_eq!(params.get("id"), Some("new"));
    }

    #[test]
    fn literal_first_takes_priority() {
        let mut table = RouteTable::new();
        table.get("/users/new", "new", &[]).unwrap().get("/users/:id", "show", &[]).unwrap();

        let (route, params) = matched(table.resolve(&Method::GET, "/users/new"));
        assert_eq!(route.template(), "/users/new");
        assert!(params.is_empty());
    }

    #[test]
    fn other_method_is_not_allowed() {
        let mut table = RouteTable::new();
        table.put("/users/:id", "update", &[]).unwrap();

        match table.resolve(&Method::DELETE, "/users/7") {
            Resolution::MethodNotAllowed { allowed } => assert_eq!(allowed, vec![Method::PUT]),
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn allowed_methods_keep_registration_order() {
        let mut table = RouteTable::new();
        table
            .delete("/users/:id", "destroy", &[])
            .unwrap()
            .get("/users/:id", "show", &[])
            .unwrap()
            .put("/users/:id", "update", &[])
            .unwrap();

        match table.resolve(&Method::POST, "/users/1/") {
            Resolution::MethodNotAllowed { allowed } => assert_eq!(allowed, vec![Method::DELETE, Method::GET, Method::PUT]),
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        let mut table = RouteTable::new();
        table.get("/users", "index", &[]).unwrap().post("/users", "store", &[]).unwrap();

        for method in [Method::GET, Method::POST, Method::DELETE] {
            assert!(matches!(table.resolve(&method, "/nonexistent"), Resolution::NotFound));
        }
    }

    #[test]
    fn find_all_keeps_order() {
        let mut table = RouteTable::new();
        table.get("/a", "a", &["auth"]).unwrap().post("/b", "b", &[]).unwrap().get("/c", "c", &[]).unwrap();

        let templates: Vec<_> = table.find_all(&Method::GET).iter().map(Route::template).collect();
        assert_eq!(templates, vec!["/a", "/c"]);
        assert_eq!(table.find_all(&Method::GET)[0].middleware(), ["auth"]);
        assert!(table.find_all(&Method::PATCH).is_empty());
        assert_eq!(table.methods().cloned().collect::<Vec<_>>(), vec![Method::GET, Method::POST]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let mut table = RouteTable::new();
        let result = table.register(Method::CONNECT, "/tunnel", "tunnel", &[]);
        assert!(matches!(result, Err(RouteError::UnsupportedMethod { .. })));
        assert!(table.is_empty());
    }

    #[test]
    fn empty_template_is_rejected() {
        let mut table = RouteTable::new();
        let result = table.get("", "index", &[]);
        assert!(matches!(result, Err(RouteError::Pattern(PatternError::Empty))));
    }

    #[test]
    fn trailing_slash_and_root() {
        let mut table = RouteTable::new();
        table.get("/", "home", &[]).unwrap().get("/users/", "index", &[]).unwrap();

        assert_eq!(matched(table.resolve(&Method::GET, "")).0.template(), "/");
        assert_eq!(matched(table.resolve(&Method::GET, "/users")).0.template(), "/users");
        assert_eq!(matched(table.resolve(&Method::GET, "//users/?page=2")).0.template(), "/users");
    }
}

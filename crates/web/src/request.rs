//! Request handling module that provides access to HTTP request information and path parameters.
//!
//! This module contains the core types for working with HTTP requests in the framework:
//! - `RequestContext`: the per-request view handed to middleware and handlers
//! - `PathParams`: the parameters captured from the URL path by the matched route

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri, header};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::normalize;

static EMPTY_PATH_PARAMS: PathParams = PathParams::empty();

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid request body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid query string: {reason}")]
    InvalidQuery { reason: String },

    #[error("path parameters have already been attached")]
    PathParamsAlreadyAttached,
}

impl RequestError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_query<S: ToString>(str: S) -> Self {
        Self::InvalidQuery { reason: str.to_string() }
    }
}

/// A path parameter that could not be read as the type a handler asked for.
///
/// Both variants are client errors and are answered with 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing path parameter '{name}'")]
    Missing { name: String },

    #[error("invalid path parameter '{name}': '{value}'")]
    Invalid { name: String, value: String },
}

/// Represents the context of an HTTP request.
///
/// Built once per request by [`RequestContext::from_request`]. Everything but the path
/// parameters is fixed at construction; the path parameters are attached exactly once
/// by the dispatcher after the route has matched.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Map<String, Value>,
    raw_body: Bytes,
    path_params: OnceCell<PathParams>,
}

impl RequestContext {
    /// Builds the context from a fully buffered request.
    ///
    /// The body is parsed according to `Content-Type`: JSON must be an object, url encoded
    /// forms become string fields, any other type leaves the parsed body empty.
    pub fn from_request(request: Request<Bytes>) -> Result<Self, RequestError> {
        let (parts, raw_body) = request.into_parts();

        let path = normalize(parts.uri.path());
        let query = parse_query(parts.uri.query())?;
        let body = parse_body(&parts.headers, &raw_body)?;

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            path,
            headers: parts.headers,
            query,
            body,
            raw_body,
            path_params: OnceCell::new(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the URI exactly as received
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the normalized request path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup; values that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// The parsed body, empty when the request carried none.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// A single field of the parsed body.
    pub fn input(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Deserializes the parsed body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        serde_json::from_value(Value::Object(self.body.clone())).map_err(RequestError::invalid_body)
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Path parameters of the matched route, empty until a route has matched.
    pub fn path_params(&self) -> &PathParams {
        self.path_params.get().unwrap_or(&EMPTY_PATH_PARAMS)
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params().get(name)
    }

    /// Reads a path parameter as `T`.
    ///
    /// ```
    /// # use bytes::Bytes;
    /// # use micro_api::{PathParams, RequestContext};
    /// let request = http::Request::builder().uri("/users/42").body(Bytes::new()).unwrap();
    /// let ctx = RequestContext::from_request(request).unwrap();
    /// ctx.attach_path_params(PathParams::from_iter([("id".to_string(), "42".to_string())])).unwrap();
    ///
    /// let id: u64 = ctx.path_param_as("id").unwrap();
    /// assert_eq!(id, 42);
    /// ```
    pub fn path_param_as<T: FromStr>(&self, name: &str) -> Result<T, ParamError> {
        let value = self.path_param(name).ok_or_else(|| ParamError::Missing { name: name.to_owned() })?;
        value.parse::<T>().map_err(|_e| ParamError::Invalid { name: name.to_owned(), value: value.to_owned() })
    }

    /// Attaches the parameters captured by the matched route.
    ///
    /// Succeeds once; later calls fail and leave the first parameters in place.
    pub fn attach_path_params(&self, params: PathParams) -> Result<(), RequestError> {
        self.path_params.set(params).map_err(|_rejected| RequestError::PathParamsAlreadyAttached)
    }
}

fn parse_query(query: Option<&str>) -> Result<HashMap<String, String>, RequestError> {
    match query {
        None | Some("") => Ok(HashMap::new()),
        Some(query) => {
            let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query).map_err(RequestError::invalid_query)?;
            Ok(pairs.into_iter().collect())
        }
    }
}

fn parse_body(headers: &HeaderMap, raw_body: &Bytes) -> Result<Map<String, Value>, RequestError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok());

    let Some(content_type) = content_type else {
        return Ok(Map::new());
    };

    if content_type.essence_str() == mime::APPLICATION_JSON.essence_str() {
        if raw_body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        return match serde_json::from_slice::<Value>(raw_body).map_err(RequestError::invalid_body)? {
            Value::Object(map) => Ok(map),
            _ => Err(RequestError::invalid_body("expected a JSON object")),
        };
    }

    if content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
        let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(raw_body).map_err(RequestError::invalid_body)?;
        return Ok(pairs.into_iter().map(|(key, value)| (key, Value::String(value))).collect());
    }

    Ok(Map::new())
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// Parameters keep the order in which the route template declares them. Values are
/// always the raw captured strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    pub const fn empty() -> Self {
        Self { params: Vec::new() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name.
    ///
    /// When a template repeats a name, the last occurrence wins.
    #[inline]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.params.iter().rfind(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl FromIterator<(String, String)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { params: iter.into_iter().collect() }
    }
}

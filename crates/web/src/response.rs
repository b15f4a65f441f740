//! Response building with the uniform JSON envelopes.
//!
//! Every response leaves the framework in one of two shapes:
//!
//! ```json
//! {"data": <any>, "message": "<string>"}
//! {"error": "<string>", "validation": {"<field>": ["<string>", ...]}}
//! ```
//!
//! `validation` is omitted when there are no field errors.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

/// Field name to the messages of every rule that field failed.
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response payload has already been written")]
    AlreadyFinalized,

    #[error("response was sent without a payload")]
    NotFinalized,

    #[error("response payload can't be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The two wire shapes of a response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success {
        data: Value,
        message: String,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        validation: ValidationErrors,
    },
}

/// Accumulates status, headers and exactly one payload for a single request.
///
/// The first payload write finalizes the builder. Any later write is rejected
/// with [`ResponseError::AlreadyFinalized`] and leaves the first one in place.
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    payload: Option<Envelope>,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self { status: StatusCode::OK, headers, payload: None }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> Option<&Envelope> {
        self.payload.as_ref()
    }

    /// Whether a payload has been written.
    pub fn is_finalized(&self) -> bool {
        self.payload.is_some()
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Writes a success envelope with status 200.
    pub fn success<T: Serialize>(&mut self, data: T, message: impl Into<String>) -> Result<(), ResponseError> {
        self.success_with_status(data, message, StatusCode::OK)
    }

    pub fn success_with_status<T: Serialize>(
        &mut self,
        data: T,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Result<(), ResponseError> {
        self.ensure_writable()?;
        let data = serde_json::to_value(data)?;
        self.finalize(status, Envelope::Success { data, message: message.into() });
        Ok(())
    }

    /// Writes an error envelope without field details.
    pub fn error(&mut self, message: impl Into<String>, status: StatusCode) -> Result<(), ResponseError> {
        self.error_with_validation(message, status, ValidationErrors::new())
    }

    pub fn error_with_validation(
        &mut self,
        message: impl Into<String>,
        status: StatusCode,
        validation: ValidationErrors,
    ) -> Result<(), ResponseError> {
        self.ensure_writable()?;
        self.finalize(status, Envelope::Error { error: message.into(), validation });
        Ok(())
    }

    /// Serializes the payload into the final response.
    pub fn send(self) -> Result<Response<Bytes>, ResponseError> {
        let payload = self.payload.ok_or(ResponseError::NotFinalized)?;
        let body = serde_json::to_vec(&payload)?;

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }

    fn ensure_writable(&self) -> Result<(), ResponseError> {
        if let Some(existing) = &self.payload {
            warn!(status = self.status.as_u16(), payload = ?existing, "response already finalized, second write rejected");
            return Err(ResponseError::AlreadyFinalized);
        }
        Ok(())
    }

    fn finalize(&mut self, status: StatusCode, payload: Envelope) {
        self.status = status;
        self.payload = Some(payload);
    }
}

/// Builds a complete error response in one step.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response<Bytes> {
    let mut builder = ResponseBuilder::new();
    let sent = builder.error(message, status).and_then(|()| builder.send());
    sent.unwrap_or_else(|e| {
        error!(cause = %e, "failed to build error response");
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

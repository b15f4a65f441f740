use super::{Middleware, MiddlewareError};
use crate::config::{ConfigError, ConfigLookup};
use crate::token::TokenValidator;
use crate::{RequestContext, ResponseBuilder};
use async_trait::async_trait;
use http::{StatusCode, header};
use tracing::warn;

use std::fmt;
use std::sync::Arc;

const SECRET_KEY: &str = "auth.secret";

/// Rejects requests without a valid `Authorization: Bearer <token>` header with a 401.
pub struct AuthMiddleware {
    validator: Arc<dyn TokenValidator>,
    secret: String,
}

impl AuthMiddleware {
    pub fn new<V: TokenValidator + 'static>(validator: V, secret: impl Into<String>) -> Self {
        Self { validator: Arc::new(validator), secret: secret.into() }
    }

    /// Reads the secret from `auth.secret`.
    pub fn from_config<V: TokenValidator + 'static>(config: &dyn ConfigLookup, validator: V) -> Result<Self, ConfigError> {
        let secret = config.get(SECRET_KEY).ok_or_else(|| ConfigError::missing(SECRET_KEY))?;
        Ok(Self::new(validator, secret))
    }

    fn reject(resp: &mut ResponseBuilder, message: &str) -> Result<(), MiddlewareError> {
        warn!(reason = message, "request rejected by auth middleware");
        resp.error(message, StatusCode::UNAUTHORIZED)?;
        Ok(())
    }
}

impl fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMiddleware").finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(&self, req: &RequestContext, resp: &mut ResponseBuilder) -> Result<(), MiddlewareError> {
        let Some(authorization) = req.header(header::AUTHORIZATION.as_str()) else {
            return Self::reject(resp, "Authorization header missing");
        };

        let token = match authorization.split_once(' ') {
            Some(("Bearer", token)) if !token.trim().is_empty() => token.trim(),
            _ => return Self::reject(resp, "Invalid authorization format"),
        };

        if !self.validator.validate(token, &self.secret) {
            return Self::reject(resp, "Invalid or expired token");
        }
        Ok(())
    }
}

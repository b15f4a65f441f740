//! Bearer token validation.
//!
//! Validation is a pure function of the token, the configured secret and the
//! current time. [`SignedTokenValidator`] is the bundled implementation: tokens have
//! the form `header.claims.signature`, every part base64url encoded without padding,
//! where the signature is the SHA-256 digest of `secret.header.claims` (the two encoded
//! parts, joined with dots). A numeric `exp` claim at or before now makes a token invalid.
//!
//! ```
//! use micro_api::token::{SignedTokenValidator, TokenValidator};
//! use serde_json::json;
//!
//! let claims = json!({ "sub": "alice" });
//! let token = SignedTokenValidator::issue(claims.as_object().unwrap(), "s3cret");
//!
//! let validator = SignedTokenValidator::new();
//! assert!(validator.validate(&token, "s3cret"));
//! assert!(!validator.validate(&token, "other"));
//! ```

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const TOKEN_HEADER: &str = r#"{"alg":"SHA256","typ":"JWT"}"#;

#[cfg_attr(test, mockall::automock)]
pub trait TokenValidator: Send + Sync {
    /// Whether `token` is valid under `secret`.
    fn validate(&self, token: &str, secret: &str) -> bool;
}

type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[derive(Clone)]
pub struct SignedTokenValidator {
    clock: Clock,
}

impl Default for SignedTokenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignedTokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTokenValidator").finish_non_exhaustive()
    }
}

impl SignedTokenValidator {
    /// A validator reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(unix_now)
    }

    /// A validator reading seconds since the unix epoch from `clock`.
    pub fn with_clock<C>(clock: C) -> Self
    where
        C: Fn() -> u64 + Send + Sync + 'static,
    {
        Self { clock: Arc::new(clock) }
    }

    /// Mints a token carrying `claims`, signed with `secret`.
    pub fn issue(claims: &Map<String, Value>, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER);
        let claims = URL_SAFE_NO_PAD.encode(Value::Object(claims.clone()).to_string());
        let signature = URL_SAFE_NO_PAD.encode(sign(secret, &header, &claims));
        format!("{header}.{claims}.{signature}")
    }

    fn check(&self, token: &str, secret: &str) -> Result<(), &'static str> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err("token must have three parts");
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_e| "signature is not base64url")?;
        if !constant_time_eq(&signature, &sign(secret, header, claims)) {
            return Err("signature mismatch");
        }

        URL_SAFE_NO_PAD.decode(header).map_err(|_e| "header is not base64url")?;
        let claims = URL_SAFE_NO_PAD.decode(claims).map_err(|_e| "claims are not base64url")?;
        let claims = match serde_json::from_slice::<Value>(&claims) {
            Ok(Value::Object(claims)) => claims,
            _ => return Err("claims are not a JSON object"),
        };

        if let Some(exp) = claims.get("exp").and_then(Value::as_f64) {
            #[allow(clippy::cast_precision_loss, reason = "unix seconds stay far below 2^52")]
            let now = (self.clock)() as f64;
            if exp <= now {
                return Err("token expired");
            }
        }
        Ok(())
    }
}

impl TokenValidator for SignedTokenValidator {
    fn validate(&self, token: &str, secret: &str) -> bool {
        match self.check(token, secret) {
            Ok(()) => true,
            Err(reason) => {
                debug!(reason, "token rejected");
                false
            }
        }
    }
}

fn sign(secret: &str, header: &str, claims: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(header.as_bytes());
    hasher.update(b".");
    hasher.update(claims.as_bytes());
    hasher.finalize().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs()).unwrap_or_default()
}

//! Signed, expiring tokens.
//!
//! Two classes share one format: session tokens ([`SessionClaims`]) issued at
//! login, and download capabilities ([`DownloadClaims`]) scoped to a single
//! file. Both are compact HS256 JWS strings whose payload is the caller's
//! claim object plus the reserved `iat`/`exp` fields.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use zeroize::Zeroize;

pub mod claims;
pub mod clock;

pub use claims::{download_ttl, DownloadClaims, Role, SessionClaims, DOWNLOAD_TTL_MINUTES};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;

const ISSUED_AT: &str = "iat";
const EXPIRES_AT: &str = "exp";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("ttl must be at least one second")]
    InvalidTtl,
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

/// HMAC key material. Built once from configuration; the raw secret is wiped
/// after the jsonwebtoken keys are derived from it.
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let mut secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let key = Self {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        };
        secret.zeroize();
        Ok(key)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// A freshly minted token together with its validity window.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Claims recovered from a token that passed signature and expiry checks.
#[derive(Debug, Clone)]
pub struct Verified<C> {
    pub claims: C,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    key: Arc<SigningKey>,
    clock: Arc<dyn Clock>,
    validation: Validation,
}

impl TokenService {
    pub fn new(key: SigningKey) -> Self {
        Self::with_clock(key, Arc::new(SystemClock))
    }

    pub fn with_clock(key: SigningKey, clock: Arc<dyn Clock>) -> Self {
        // Expiry is checked here against the injected clock, with no leeway,
        // so jsonwebtoken's own time checks are switched off.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            key: Arc::new(key),
            clock,
            validation,
        }
    }

    /// Mints a token carrying `claims`, valid for `ttl` from now.
    pub fn mint<C: Serialize>(&self, claims: &C, ttl: Duration) -> Result<String, TokenError> {
        self.issue(claims, ttl).map(|issued| issued.token)
    }

    pub fn issue<C: Serialize>(&self, claims: &C, ttl: Duration) -> Result<IssuedToken, TokenError> {
        let ttl_secs = ttl.num_seconds();
        if ttl_secs < 1 {
            return Err(TokenError::InvalidTtl);
        }

        let mut body = match serde_json::to_value(claims) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(TokenError::InvalidClaims(
                    "claims must serialize to a JSON object".to_string(),
                ))
            }
            Err(e) => return Err(TokenError::InvalidClaims(e.to_string())),
        };
        for reserved in [ISSUED_AT, EXPIRES_AT] {
            if body.contains_key(reserved) {
                return Err(TokenError::InvalidClaims(format!(
                    "`{reserved}` is reserved"
                )));
            }
        }

        let iat = self.clock.now().timestamp();
        let exp = iat.checked_add(ttl_secs).ok_or(TokenError::InvalidTtl)?;
        let expires_at = DateTime::from_timestamp(exp, 0).ok_or(TokenError::InvalidTtl)?;
        body.insert(ISSUED_AT.to_string(), Value::from(iat));
        body.insert(EXPIRES_AT.to_string(), Value::from(exp));

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &body, &self.key.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            issued_at: timestamp(iat)?,
            expires_at,
        })
    }

    /// Checks signature and expiry and returns the claims exactly as minted.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        self.verify_envelope(token).map(|verified| verified.claims)
    }

    pub fn verify_envelope<C: DeserializeOwned>(&self, token: &str) -> Result<Verified<C>, TokenError> {
        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &self.key.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        let mut body = data.claims;
        let iat = take_timestamp(&mut body, ISSUED_AT)?;
        let exp = take_timestamp(&mut body, EXPIRES_AT)?;

        if self.clock.now().timestamp() >= exp {
            return Err(TokenError::Expired);
        }

        let claims = serde_json::from_value(Value::Object(body)).map_err(|e| {
            tracing::debug!("token claims did not match expected shape: {}", e);
            TokenError::Malformed
        })?;

        Ok(Verified {
            claims,
            issued_at: timestamp(iat)?,
            expires_at: timestamp(exp)?,
        })
    }

    pub fn issue_session(&self, claims: &SessionClaims, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue(claims, ttl)
    }

    /// Mints a download capability for `file_id` with the fixed 15 minute ttl.
    pub fn issue_download(&self, file_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue(&DownloadClaims { file_id }, download_ttl())
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

fn take_timestamp(body: &mut Map<String, Value>, field: &str) -> Result<i64, TokenError> {
    body.remove(field)
        .and_then(|v| v.as_i64())
        .ok_or(TokenError::Malformed)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    DateTime::from_timestamp(secs, 0).ok_or(TokenError::Malformed)
}

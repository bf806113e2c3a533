use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use docshare_tokens::{Role, SessionClaims};

use crate::error::ApiError;
use crate::AppState;

/// Extractor that verifies the bearer session token. Role checks are left to
/// the handler via [`Session::require`].
#[derive(Debug)]
pub struct Session(pub SessionClaims);

impl Session {
    pub fn require(self, role: Role, denied: &'static str) -> Result<SessionClaims, ApiError> {
        if self.0.role == role {
            Ok(self.0)
        } else {
            tracing::info!("{} ({}) denied: requires {}", self.0.sub, self.0.role, role);
            Err(ApiError::Forbidden(denied))
        }
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthenticated("Not authenticated"))?;

        match state.tokens.verify::<SessionClaims>(token) {
            Ok(claims) => Ok(Session(claims)),
            Err(e) => {
                tracing::debug!("session token rejected: {}", e);
                Err(ApiError::Unauthenticated("Could not validate credentials"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_bearer_scheme_case_insensitively() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn require_checks_role() {
        let claims = SessionClaims {
            sub: "a@x.com".to_string(),
            role: Role::Client,
            principal_id: uuid::Uuid::new_v4(),
        };
        assert!(Session(claims.clone()).require(Role::Client, "nope").is_ok());
        assert!(matches!(
            Session(claims).require(Role::Operation, "nope"),
            Err(ApiError::Forbidden("nope"))
        ));
    }
}

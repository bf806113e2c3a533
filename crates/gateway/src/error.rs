use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docshare_tokens::TokenError;

use crate::store::StoreError;

/// Every failure a request can end in. Each maps to one status code and an
/// `{"error": ...}` body; none outlive the request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email not verified")]
    NotVerified,
    #[error("Invalid verification token")]
    InvalidVerificationToken,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("File type not allowed")]
    UnsupportedType,
    #[error("{0}")]
    BadRequest(String),
    #[error("Upload exceeds the configured size limit")]
    PayloadTooLarge,
    #[error("File not found")]
    NotFound,
    #[error("Invalid or expired token")]
    InvalidOrExpiredLink,
    #[error("File not found on server")]
    StorageMissing,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::InvalidCredentials | ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotVerified | ApiError::Forbidden(_) | ApiError::InvalidOrExpiredLink => {
                StatusCode::FORBIDDEN
            }
            ApiError::InvalidVerificationToken | ApiError::UnsupportedType | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound | ApiError::StorageMissing => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!("request failed: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(format!("store: {e}"))
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        ApiError::Internal(format!("token: {e}"))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(format!("io: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::DuplicateEmail.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotVerified.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Unauthenticated("no").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidOrExpiredLink.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::StorageMissing.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::UnsupportedType.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let response = ApiError::Internal("connection refused to db-primary".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(axum::http::header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = ApiError::Unauthenticated("Not authenticated").into_response();
        assert_eq!(
            response.headers().get(axum::http::header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}

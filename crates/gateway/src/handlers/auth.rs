use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use docshare_tokens::{Role, SessionClaims};

use crate::accounts::{
    generate_verification_token, hash_password, is_acceptable_password, is_reasonable_email,
    normalize_email, verify_password_or_decoy,
};
use crate::error::ApiError;
use crate::handlers::extract::{FormBody, JsonBody, QueryParams};
use crate::models::{
    LoginForm, MessageResponse, NewPrincipal, SignupRequest, SignupResponse, TokenQuery, TokenResponse,
};
use crate::notify;
use crate::store::StoreError;
use crate::AppState;

pub async fn signup(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&payload.email);
    if !is_reasonable_email(&email) {
        return Err(ApiError::BadRequest("Invalid email format".to_string()));
    }
    if !is_acceptable_password(&payload.password) {
        return Err(ApiError::BadRequest(
            "Password must be between 1 and 128 characters".to_string(),
        ));
    }
    tracing::info!("Signup request received for email: {}", email);

    // Cheap early exit; the store's unique constraint is what actually
    // guarantees a single principal per email.
    if state.store.find_principal_by_email(&email).await?.is_some() {
        return Err(ApiError::DuplicateEmail);
    }

    let password_hash = hash_password(payload.password).await?;
    let verification_token = generate_verification_token();

    let principal = match state
        .store
        .insert_principal(NewPrincipal {
            email,
            password_hash,
            role: Role::Client,
            verified: false,
            verification_token: Some(verification_token.clone()),
        })
        .await
    {
        Ok(principal) => principal,
        Err(StoreError::Duplicate) => return Err(ApiError::DuplicateEmail),
        Err(e) => return Err(e.into()),
    };

    let verification_url = state.config.verification_url(&verification_token);
    notify::dispatch(
        Arc::clone(&state.notifier),
        principal.email.clone(),
        verification_url.clone(),
    );

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User registered successfully. Verification email sent.".to_string(),
            verification_url,
        }),
    ))
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<TokenQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = state
        .store
        .consume_verification_token(&query.token)
        .await?
        .ok_or(ApiError::InvalidVerificationToken)?;

    tracing::info!("Email verified for {}", principal.email);
    Ok(Json(MessageResponse {
        message: "Email verified successfully.".to_string(),
    }))
}

pub async fn client_login(
    State(state): State<Arc<AppState>>,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    login(&state, Role::Client, form).await.map(Json)
}

pub async fn operation_login(
    State(state): State<Arc<AppState>>,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    login(&state, Role::Operation, form).await.map(Json)
}

async fn login(state: &AppState, role: Role, form: LoginForm) -> Result<TokenResponse, ApiError> {
    let email = normalize_email(&form.username);
    if !is_reasonable_email(&email) || !is_acceptable_password(&form.password) {
        return Err(ApiError::InvalidCredentials);
    }

    // A principal of the other role is indistinguishable from no principal,
    // and both cost one argon2 verification like a wrong password does.
    let principal = state
        .store
        .find_principal_by_email(&email)
        .await?
        .filter(|p| p.role == role);
    let stored_hash = principal.as_ref().map(|p| p.password_hash.clone());
    let password_ok = verify_password_or_decoy(form.password, stored_hash).await?;

    let principal = match principal {
        Some(principal) if password_ok => principal,
        _ => {
            tracing::info!("{} login failed for {}", role, email);
            return Err(ApiError::InvalidCredentials);
        }
    };

    if role == Role::Client && !principal.verified {
        return Err(ApiError::NotVerified);
    }

    let claims = SessionClaims {
        sub: principal.email,
        role: principal.role,
        principal_id: principal.id,
    };
    let issued = state.tokens.issue_session(&claims, state.config.session_ttl)?;
    tracing::info!("{} login succeeded for {}, session valid until {}", role, claims.sub, issued.expires_at);

    Ok(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_string(),
    })
}

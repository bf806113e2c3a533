use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use docshare_tokens::Role;
use rand::RngCore;
use tokio::sync::OnceCell;
use tokio::task;

use crate::config::OperationSeed;
use crate::error::ApiError;
use crate::models::NewPrincipal;
use crate::store::{DataStore, StoreError};

pub const MAX_PASSWORD_LEN: usize = 128;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn is_reasonable_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 254 {
        return false;
    }
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    parts.next().is_none()
        && !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn is_acceptable_password(password: &str) -> bool {
    !password.is_empty() && password.len() <= MAX_PASSWORD_LEN
}

/// 16 random bytes, base64url without padding. Plain random value, not a
/// signed token; it is only ever compared against the stored copy.
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_blocking(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

fn verify_blocking(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash could not be parsed: {}", e);
            false
        }
    }
}

/// Argon2 is deliberately slow, so it runs off the async workers.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    task::spawn_blocking(move || hash_blocking(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing worker failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    task::spawn_blocking(move || verify_blocking(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("password verification worker failed: {e}")))
}

/// Hash of a random throwaway password, checked against when a login names
/// no usable principal.
static DECOY_HASH: OnceCell<String> = OnceCell::const_new();

/// Verifies `password` against `stored_hash`, or against a decoy hash when
/// there is none. Either way one full argon2 verification runs, so an
/// unknown email costs as much as a wrong password.
pub async fn verify_password_or_decoy(
    password: String,
    stored_hash: Option<String>,
) -> Result<bool, ApiError> {
    match stored_hash {
        Some(hash) => verify_password(password, hash).await,
        None => {
            let decoy = DECOY_HASH
                .get_or_try_init(|| hash_password(generate_verification_token()))
                .await?;
            verify_password(password, decoy.clone()).await?;
            Ok(false)
        }
    }
}

/// Creates the configured operation principal unless that email is already
/// registered. Safe to run on every start.
pub async fn provision_operation_account(
    store: &dyn DataStore,
    seed: &OperationSeed,
) -> anyhow::Result<()> {
    let email = normalize_email(&seed.email);
    if !is_reasonable_email(&email) {
        anyhow::bail!("operation account email {:?} is not a valid address", seed.email);
    }
    if !is_acceptable_password(&seed.password) {
        anyhow::bail!("operation account password must be 1 to {} characters", MAX_PASSWORD_LEN);
    }

    if let Some(existing) = store.find_principal_by_email(&email).await? {
        if existing.role != Role::Operation {
            tracing::warn!("{} is registered with role {}; not provisioning", email, existing.role);
        }
        return Ok(());
    }

    let password_hash = hash_password(seed.password.to_string()).await?;

    match store
        .insert_principal(NewPrincipal {
            email: email.clone(),
            password_hash,
            role: Role::Operation,
            verified: true,
            verification_token: None,
        })
        .await
    {
        Ok(_) => {
            tracing::info!("Provisioned operation account {}", email);
            Ok(())
        }
        Err(StoreError::Duplicate) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_and_checked() {
        assert_eq!(normalize_email("  A@X.com "), "a@x.com");
        assert!(is_reasonable_email("a@x.com"));
        assert!(!is_reasonable_email("a@x"));
        assert!(!is_reasonable_email("a@@x.com"));
        assert!(!is_reasonable_email("@x.com"));
        assert!(!is_reasonable_email("a@.com"));
    }

    #[test]
    fn short_passwords_are_allowed() {
        assert!(is_acceptable_password("pw1"));
        assert!(!is_acceptable_password(""));
        assert!(!is_acceptable_password(&"x".repeat(MAX_PASSWORD_LEN + 1)));
    }

    #[test]
    fn verification_tokens_are_url_safe_and_unique() {
        let a = generate_verification_token();
        let b = generate_verification_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password("pw1".to_string()).await.unwrap();
        assert!(verify_password("pw1".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("pw2".to_string(), hash).await.unwrap());
        assert!(!verify_password("pw1".to_string(), "not-a-phc-string".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_principal_still_pays_for_a_verification() {
        let real = hash_password("pw1".to_string()).await.unwrap();
        assert!(verify_password_or_decoy("pw1".to_string(), Some(real)).await.unwrap());

        assert!(!verify_password_or_decoy("pw1".to_string(), None).await.unwrap());
        let decoy = DECOY_HASH.get().expect("decoy hash is built on first miss");
        assert!(PasswordHash::new(decoy).is_ok());

        // The decoy is reused, not rebuilt per miss.
        let first = decoy.clone();
        assert!(!verify_password_or_decoy("other".to_string(), None).await.unwrap());
        assert_eq!(DECOY_HASH.get(), Some(&first));
    }

    fn seed(email: &str, password: &str) -> OperationSeed {
        OperationSeed {
            email: email.to_string(),
            password: zeroize::Zeroizing::new(password.to_string()),
        }
    }

    #[tokio::test]
    async fn operation_account_is_provisioned_once() {
        let store = crate::store::MemoryStore::new();
        provision_operation_account(&store, &seed(" Ops@X.com", "ops-password")).await.unwrap();
        provision_operation_account(&store, &seed("ops@x.com", "other")).await.unwrap();

        assert_eq!(store.principal_count().await, 1);
        let ops = store.find_principal_by_email("ops@x.com").await.unwrap().unwrap();
        assert_eq!(ops.role, Role::Operation);
        assert!(ops.verified);
        assert!(verify_password("ops-password".to_string(), ops.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_seed_is_rejected() {
        let store = crate::store::MemoryStore::new();
        assert!(provision_operation_account(&store, &seed("not-an-email", "pw")).await.is_err());
        assert!(provision_operation_account(&store, &seed("ops@x.com", "")).await.is_err());
        assert_eq!(store.principal_count().await, 0);
    }
}

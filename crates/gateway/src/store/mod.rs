//! Persistence behind a narrow find/insert/update interface.
//!
//! Handlers only ever see `Arc<dyn DataStore>`; the binary picks Postgres
//! when `DATABASE_URL` is set and the in-memory store otherwise.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{FileRecord, NewPrincipal, Principal};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the email is taken.
    async fn insert_principal(&self, principal: NewPrincipal) -> Result<Principal, StoreError>;

    /// Marks the owner of `token` verified and clears the token in one step,
    /// so a token can be redeemed at most once.
    async fn consume_verification_token(&self, token: &str) -> Result<Option<Principal>, StoreError>;

    async fn insert_file(&self, record: FileRecord) -> Result<FileRecord, StoreError>;

    async fn find_file(&self, id: Uuid) -> Result<Option<FileRecord>, StoreError>;

    /// All files, oldest first.
    async fn list_files(&self) -> Result<Vec<FileRecord>, StoreError>;
}

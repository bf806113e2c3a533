use async_trait::async_trait;
use docshare_tokens::Role;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DataStore, StoreError};
use crate::models::{FileRecord, NewPrincipal, Principal};

const PRINCIPAL_COLUMNS: &str = "id, email, password_hash, role, verified, verification_token";

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    verified: bool,
    verification_token: Option<String>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = StoreError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Corrupt(format!("principal {}: {}", row.id, e)))?;
        Ok(Principal {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            verified: row.verified,
            verification_token: row.verification_token,
        })
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

fn map_unique(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn insert_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            INSERT INTO principals (id, email, password_hash, role, verified, verification_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(new.verified)
        .bind(&new.verification_token)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;

        Principal::try_from(row)
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            UPDATE principals
            SET verified = TRUE, verification_token = NULL
            WHERE verification_token = $1
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn insert_file(&self, record: FileRecord) -> Result<FileRecord, StoreError> {
        sqlx::query(
            "INSERT INTO files (id, filename, storage_path, uploaded_by) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.id)
        .bind(&record.filename)
        .bind(&record.storage_path)
        .bind(record.uploaded_by)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;

        Ok(record)
    }

    async fn find_file(&self, id: Uuid) -> Result<Option<FileRecord>, StoreError> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT id, filename, storage_path, uploaded_by FROM files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT id, filename, storage_path, uploaded_by FROM files ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

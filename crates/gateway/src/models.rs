use chrono::{DateTime, Utc};
use docshare_tokens::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub verified: bool,
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub verified: bool,
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub uploaded_by: Uuid,
}

// ── API Payloads ────────────────────────────────────────────────
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub message: String,
    pub verification_url: String,
}

/// OAuth2 password-grant form. Extra fields such as `grant_type` or `scope`
/// are accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_id: Uuid,
    pub filename: String,
}

impl From<FileRecord> for FileSummary {
    fn from(record: FileRecord) -> Self {
        Self {
            file_id: record.id,
            filename: record.filename,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadLinkResponse {
    #[serde(rename = "download-link")]
    pub download_link: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

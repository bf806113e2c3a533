use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use docshare_tokens::Role;
use uuid::Uuid;

use crate::blobs::sanitize_filename;
use crate::error::ApiError;
use crate::handlers::middleware::Session;
use crate::models::{DownloadLinkResponse, FileListResponse, FileRecord, FileSummary, UploadResponse};
use crate::AppState;

pub const ALLOWED_EXTENSIONS: [&str; 3] = [".pptx", ".docx", ".xlsx"];

/// Extension check on the final path component, ignoring case.
pub fn has_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| lower.len() > ext.len() && lower.ends_with(ext))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let claims = session.require(Role::Operation, "Only operation users can upload files")?;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .and_then(sanitize_filename)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        if !has_allowed_extension(&filename) {
            return Err(ApiError::UnsupportedType);
        }

        let file_id = Uuid::new_v4();
        let mut writer = state.blobs.create(file_id, &filename).await?;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    writer.discard().await;
                    return Err(multipart_error(e));
                }
            };
            if let Err(e) = writer.write(&chunk).await {
                writer.discard().await;
                return Err(e.into());
            }
        }
        let (path, size) = writer.finish().await?;

        let inserted = state
            .store
            .insert_file(FileRecord {
                id: file_id,
                filename,
                storage_path: path.to_string_lossy().into_owned(),
                uploaded_by: claims.principal_id,
            })
            .await;
        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                state.blobs.remove(&path).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            "UPLOAD SUCCESS: {} ({} bytes) as {} by {}",
            record.filename,
            size,
            record.id,
            claims.sub
        );

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                message: "File uploaded successfully".to_string(),
                file_id: record.id,
            }),
        ));
    }

    Err(ApiError::BadRequest("Missing `file` field".to_string()))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<FileListResponse>, ApiError> {
    session.require(Role::Client, "Only client users allowed")?;

    let files = state
        .store
        .list_files()
        .await?
        .into_iter()
        .map(FileSummary::from)
        .collect();

    Ok(Json(FileListResponse { files }))
}

/// Issues a 15 minute capability link for one file. The file must exist now;
/// it is resolved again when the link is redeemed.
pub async fn download_link(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(file_id): Path<String>,
) -> Result<Json<DownloadLinkResponse>, ApiError> {
    let claims = session.require(Role::Client, "Only client users allowed")?;

    let file_id = Uuid::parse_str(&file_id).map_err(|_| ApiError::NotFound)?;
    let record = state.store.find_file(file_id).await?.ok_or(ApiError::NotFound)?;

    let issued = state.tokens.issue_download(record.id)?;
    tracing::info!("Download link for {} issued to {}, valid until {}", record.id, claims.sub, issued.expires_at);

    Ok(Json(DownloadLinkResponse {
        download_link: state.config.download_url(&issued.token),
        message: "success".to_string(),
        expires_at: issued.expires_at,
    }))
}

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use docshare_tokens::DownloadClaims;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::handlers::extract::QueryParams;
use crate::models::TokenQuery;
use crate::AppState;

/// `attachment; filename="..."` with an ASCII-only fallback name. When the
/// fallback had to alter the name, the exact name follows as an RFC 5987
/// `filename*` parameter.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    if fallback == filename {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}

/// Redeems a download capability. No session is involved: a valid, unexpired
/// token is the whole authorization, and it names exactly one file.
pub async fn download_by_token(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<TokenQuery>,
) -> Result<Response, ApiError> {
    let claims = state
        .tokens
        .verify::<DownloadClaims>(&query.token)
        .map_err(|e| {
            tracing::info!("download link rejected: {}", e);
            ApiError::InvalidOrExpiredLink
        })?;

    let record = state
        .store
        .find_file(claims.file_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let Some((file, len)) = state.blobs.open_blob(&record.storage_path).await? else {
        tracing::error!("File {} has a record but no blob at {}", record.id, record.storage_path);
        return Err(ApiError::StorageMissing);
    };

    tracing::info!("GET SUCCESS: {} ({} bytes) via download link", record.filename, len);

    let mut response = (StatusCode::OK, Body::from_stream(ReaderStream::new(file))).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&record.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_quotes_filename() {
        assert_eq!(content_disposition("report.xlsx"), "attachment; filename=\"report.xlsx\"");
        assert_eq!(
            content_disposition("a\"b\\c.docx"),
            "attachment; filename=\"a_b_c.docx\"; filename*=UTF-8''a%22b%5Cc.docx"
        );
    }

    #[test]
    fn disposition_keeps_non_ascii_name() {
        let value = content_disposition("Pr\u{e4}sentation.pptx");
        assert_eq!(
            value,
            "attachment; filename=\"Pr_sentation.pptx\"; filename*=UTF-8''Pr%C3%A4sentation.pptx"
        );
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}

//! Upload and result endpoints

use async_trait::async_trait;
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    Extension, Json,
};
use serde::Serialize;
use tracing::info;

use crate::api::auth::UserIdentity;
use crate::error::{ApiError, ApiResult, TaskError};
use crate::models::TaskId;
use crate::services::{ByteSource, TaskResult};
use crate::AppState;

/// Multipart form field carrying the archive
const FILE_FIELD: &str = "file";

/// POST /upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: TaskId,
}

/// Streams one multipart field, stopping as soon as the cap is exceeded
pub struct MultipartSource<'a> {
    field: Field<'a>,
}

impl<'a> MultipartSource<'a> {
    pub fn new(field: Field<'a>) -> Self {
        Self { field }
    }
}

fn read_failure(e: MultipartError, limit: u64) -> TaskError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        TaskError::FileTooLarge { size: None, limit }
    } else {
        TaskError::InvalidFile(format!("unreadable upload body: {}", e.body_text()))
    }
}

#[async_trait]
impl<'a> ByteSource for MultipartSource<'a> {
    async fn read_all(&mut self, limit: u64) -> Result<Vec<u8>, TaskError> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self
            .field
            .chunk()
            .await
            .map_err(|e| read_failure(e, limit))?
        {
            let size = (buffer.len() + chunk.len()) as u64;
            if size > limit {
                return Err(TaskError::FileTooLarge {
                    size: Some(size),
                    limit,
                });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer)
    }
}

/// Request Content-Length, if present and numeric
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// POST /upload
///
/// Accepts a multipart `file` field, creates a PENDING task and returns its
/// id; analysis continues in the background.
pub async fn upload_archive(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e.body_text())))?;

    let field = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e.body_text())))?
            .ok_or_else(|| ApiError::BadRequest(format!("Missing '{}' field", FILE_FIELD)))?;
        if field.name() == Some(FILE_FIELD) {
            break field;
        }
    };

    let filename = field.file_name().map(str::to_string);
    let size_hint = content_length(&headers);

    let task_id = state
        .service
        .submit(filename.as_deref(), size_hint, MultipartSource::new(field))
        .await?;

    info!(task_id = %task_id, subject = %identity.subject, "Upload accepted");
    Ok((StatusCode::CREATED, Json(UploadResponse { task_id })))
}

/// GET /results/:task_id
pub async fn get_results(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskResult>> {
    let view = state
        .service
        .get_task_result(&TaskId::from(task_id))
        .await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(content_length(&headers), Some(1234));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&headers), None);
    }
}

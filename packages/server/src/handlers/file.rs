use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::Json;
use common::storage::{ByteRange, FileId, RangeRequest};
use tracing::{debug, instrument};

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::file::{FileDeleteResponse, FileInfoResponse};
use crate::state::AppState;
use crate::utils::filename::content_disposition_value;

fn parse_file_id(raw: &str) -> Result<FileId, AppError> {
    Ok(FileId::from_hex(raw)?)
}

#[utoipa::path(
    get,
    path = "/{file_id}",
    tag = "Files",
    operation_id = "downloadFile",
    summary = "Download a stored file",
    description = "Streams the file content. A single `Range: bytes=` header is honoured \
        with a 206 response; other range forms fall back to the full body.",
    params(
        ("file_id" = String, Path, description = "32-character hex file ID"),
        ("Range" = Option<String>, Header, description = "Optional single byte range"),
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/pdf"),
        (status = 206, description = "Partial file content", content_type = "application/pdf"),
        (status = 400, description = "Malformed file ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 416, description = "Range outside the file (RANGE_NOT_SATISFIABLE)", body = ErrorBody),
        (status = 500, description = "Stored chunks are inconsistent (CORRUPTED_FILE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers), fields(file_id = %file_id))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_file_id(&file_id)?;
    let meta = state.blobs.file_info(&id).await?;

    let range = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(value) => match ByteRange::parse(value, meta.size_bytes) {
            RangeRequest::Full => None,
            RangeRequest::Partial(range) => Some(range),
            RangeRequest::Unsatisfiable => {
                return Err(AppError::RangeNotSatisfiable {
                    size: meta.size_bytes,
                });
            }
        },
        None => None,
    };

    let body = state.blobs.stream(&meta, range).await?;

    let content_type = HeaderValue::from_str(&meta.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&meta.original_name),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");

    builder = match range {
        Some(range) => {
            debug!(start = range.start, end = range.end, "Serving partial content");
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, range.len().to_string())
                .header(header::CONTENT_RANGE, range.content_range(meta.size_bytes))
        }
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, meta.size_bytes.to_string()),
    };

    builder
        .body(Body::from_stream(body))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

#[utoipa::path(
    get,
    path = "/{file_id}/info",
    tag = "Files",
    operation_id = "getFileInfo",
    summary = "Get stored file metadata",
    params(("file_id" = String, Path, description = "32-character hex file ID")),
    responses(
        (status = 200, description = "File metadata", body = FileInfoResponse),
        (status = 400, description = "Malformed file ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(file_id = %file_id))]
pub async fn file_info(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileInfoResponse>, AppError> {
    let id = parse_file_id(&file_id)?;
    let meta = state.blobs.file_info(&id).await?;
    Ok(Json(meta.into()))
}

#[utoipa::path(
    delete,
    path = "/{file_id}",
    tag = "Files",
    operation_id = "deleteFile",
    summary = "Delete a stored file",
    description = "Removes the file's metadata and chunks. Deleting a missing file succeeds \
        with `deleted: false`.",
    params(("file_id" = String, Path, description = "32-character hex file ID")),
    responses(
        (status = 200, description = "Delete outcome", body = FileDeleteResponse),
        (status = 400, description = "Malformed file ID (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(file_id = %file_id, user_id = auth_user.user_id))]
pub async fn delete_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileDeleteResponse>, AppError> {
    auth_user.require_permission("file:delete")?;
    let id = parse_file_id(&file_id)?;
    let deleted = state.blobs.delete(&id).await?;
    Ok(Json(FileDeleteResponse { deleted }))
}

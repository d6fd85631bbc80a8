use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `INVALID_CREDENTIALS`, `ACCOUNT_SUSPENDED`,
    /// `PERMISSION_DENIED`, `NOT_FOUND`, `CONFLICT`, `EMAIL_TAKEN`,
    /// `INVALID_FILE_TYPE`, `PAYLOAD_TOO_LARGE`, `RANGE_NOT_SATISFIABLE`,
    /// `CORRUPTED_FILE`, `STORAGE_FAILURE`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Title must be 1-200 characters")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    InvalidCredentials,
    AccountSuspended,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    EmailTaken,
    InvalidFileType(String),
    PayloadTooLarge(String),
    /// Requested byte range lies outside a file of `size` bytes.
    RangeNotSatisfiable {
        size: u64,
    },
    CorruptedFile(String),
    StorageFailure(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "INVALID_CREDENTIALS",
                    message: "Invalid email or password".into(),
                },
            ),
            AppError::AccountSuspended => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "ACCOUNT_SUSPENDED",
                    message: "Your account has been suspended".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Insufficient permissions".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::EmailTaken => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "EMAIL_TAKEN",
                    message: "An account with this email already exists".into(),
                },
            ),
            AppError::InvalidFileType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorBody {
                    code: "INVALID_FILE_TYPE",
                    message: msg,
                },
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "PAYLOAD_TOO_LARGE",
                    message: msg,
                },
            ),
            AppError::RangeNotSatisfiable { size } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                ErrorBody {
                    code: "RANGE_NOT_SATISFIABLE",
                    message: format!("Requested range is outside the file ({size} bytes)"),
                },
            ),
            AppError::CorruptedFile(detail) => {
                tracing::error!("Corrupted file: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "CORRUPTED_FILE",
                        message: "The stored file is damaged and cannot be served".into(),
                    },
                )
            }
            AppError::StorageFailure(detail) => {
                tracing::error!("Storage failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "STORAGE_FAILURE",
                        message: "File storage is unavailable".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let unsatisfiable = if let AppError::RangeNotSatisfiable { size } = &self {
            Some(*size)
        } else {
            None
        };

        let (status, body) = self.status_and_body();

        if let Some(size) = unsatisfiable {
            (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                Json(body),
            )
                .into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFileType(msg) => {
                AppError::InvalidFileType(format!("Only PDF files are allowed ({msg})"))
            }
            StorageError::SizeExceeded { limit } => AppError::PayloadTooLarge(format!(
                "File exceeds maximum size of {limit} bytes"
            )),
            StorageError::NotFound(_) => AppError::NotFound("File not found".into()),
            StorageError::InvalidId(msg) => AppError::Validation(format!("Invalid file ID: {msg}")),
            StorageError::RangeNotSatisfiable { size } => AppError::RangeNotSatisfiable { size },
            StorageError::Source(e) => AppError::Validation(format!("Upload read error: {e}")),
            StorageError::CorruptedFile { .. } => AppError::CorruptedFile(err.to_string()),
            other => AppError::StorageFailure(other.to_string()),
        }
    }
}

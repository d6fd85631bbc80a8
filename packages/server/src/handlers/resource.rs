use std::collections::BTreeMap;

use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use common::storage::{BoxReader, FileMetadata, UploadRequest};
use futures::channel::mpsc;
use futures::SinkExt;
use sea_orm::sea_query::{Expr, ExprTrait, Func, LikeExpr, OnConflict};
use sea_orm::*;
use tokio_util::io::StreamReader;
use tracing::{info, instrument};

use crate::entity::{bookmark, resource, resource_like};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::resource::*;
use crate::models::shared::{Pagination, escape_like};
use crate::state::AppState;
use crate::utils::catalog::{PendingBlob, find_resource, with_uploaders};
use crate::utils::filename::display_filename;

/// Multipart form overhead allowed on top of the file size cap.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn upload_body_limit(max_file_bytes: u64) -> DefaultBodyLimit {
    let limit = usize::try_from(max_file_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);
    DefaultBodyLimit::max(limit)
}

fn contains_ci(column: resource::Column, term: &str) -> Expr {
    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(format!("%{}%", escape_like(term).to_lowercase())).escape('\\'))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Resources",
    operation_id = "listResources",
    summary = "List approved resources",
    description = "Returns approved resources, newest first. Filters combine with AND; \
        `search` matches title, description or subject case-insensitively.",
    params(ResourceListQuery),
    responses(
        (status = 200, description = "Page of resources", body = ResourceListResponse),
        (status = 400, description = "Invalid query (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_resources(
    State(state): State<AppState>,
    Query(query): Query<ResourceListQuery>,
) -> Result<Json<ResourceListResponse>, AppError> {
    let page = std::cmp::Ord::max(query.page.unwrap_or(1), 1);
    let per_page = query.per_page.unwrap_or(12).clamp(1, 100);

    let mut select =
        resource::Entity::find().filter(resource::Column::Status.eq(resource::STATUS_APPROVED));

    if let Some(branch) = query.branch.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        select = select.filter(resource::Column::Branch.eq(branch));
    }
    if let Some(semester) = query.semester {
        select = select.filter(resource::Column::Semester.eq(semester));
    }
    if let Some(subject) = query.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(contains_ci(resource::Column::Subject, subject));
    }
    if let Some(kind) = query.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        select = select.filter(resource::Column::Kind.eq(kind));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(contains_ci(resource::Column::Title, search))
                .add(contains_ci(resource::Column::Description, search))
                .add(contains_ci(resource::Column::Subject, search)),
        );
    }

    let total = select
        .clone()
        .paginate(&state.db, per_page)
        .num_items()
        .await?;
    let total_pages = total.div_ceil(per_page);

    let models = select
        .order_by_desc(resource::Column::CreatedAt)
        .order_by_desc(resource::Column::Id)
        .offset(Some((page - 1) * per_page))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    Ok(Json(ResourceListResponse {
        data: with_uploaders(&state.db, models).await?,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Resources",
    operation_id = "getResource",
    summary = "Get a resource",
    description = "Approved resources are public. Pending and rejected ones are visible to \
        their uploader and to admins only.",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Resource", body = ResourceResponse),
        (status = 401, description = "Invalid token (TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not approved (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security((), ("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn get_resource(
    auth_user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ResourceResponse>, AppError> {
    let model = find_resource(&state.db, id).await?;

    if model.status != resource::STATUS_APPROVED {
        let allowed = auth_user.as_ref().is_some_and(|user| {
            user.user_id == model.uploaded_by || user.is_admin()
        });
        if !allowed {
            return Err(AppError::PermissionDenied);
        }
    }

    let mut responses = with_uploaders(&state.db, vec![model]).await?;
    responses
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::Internal("resource vanished while loading uploader".into()))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Resources",
    operation_id = "uploadResource",
    summary = "Upload a study resource",
    description = "Multipart form with text fields `title`, `description`, `branch`, \
        `semester`, `subject`, `kind` (`type` is accepted too) and one PDF in `file`. \
        The resource starts as `pending` until a moderator approves it.",
    request_body(content_type = "multipart/form-data", description = "Resource fields and PDF"),
    responses(
        (status = 201, description = "Resource created", body = ResourceResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 413, description = "File too large (PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 415, description = "Not a PDF (INVALID_FILE_TYPE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("resource:upload")?;

    let mut form = UploadResourceForm::default();
    let mut stored: Option<FileMetadata> = None;
    let mut pending = PendingBlob::new(state.blobs.clone());

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "file" {
                if pending.is_tracking() {
                    return Err(AppError::Validation("Only one file may be uploaded".into()));
                }
                let meta = stream_field_to_store(field, &state, auth_user.user_id).await?;
                pending.track(meta.file_id);
                stored = Some(meta);
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read '{name}': {e}")))?;
                form.set(&name, text);
            }
        }

        let meta = stored
            .as_ref()
            .ok_or_else(|| AppError::Validation("Please upload a PDF file".into()))?;
        let fields = form.validate()?;

        let now = Utc::now();
        let model = resource::ActiveModel {
            title: Set(fields.title),
            description: Set(fields.description),
            branch: Set(fields.branch),
            semester: Set(fields.semester),
            subject: Set(fields.subject),
            kind: Set(fields.kind),
            file_id: Set(meta.file_id.to_hex()),
            file_name: Set(meta.original_name.clone()),
            uploaded_by: Set(auth_user.user_id),
            status: Set(resource::STATUS_PENDING.to_string()),
            rejection_reason: Set(None),
            likes_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&state.db).await?)
    }
    .await;

    match result {
        Ok(model) => {
            pending.keep();
            info!(resource_id = model.id, file_id = %model.file_id, "Resource uploaded");
            let mut responses = with_uploaders(&state.db, vec![model]).await?;
            let response = responses
                .pop()
                .ok_or_else(|| AppError::Internal("resource vanished after insert".into()))?;
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(e) => {
            // The blob is useless without its resource row.
            pending.discard().await;
            Err(e)
        }
    }
}

/// Stream a multipart field into the blob store without buffering it whole.
///
/// The field is pumped through a bounded channel that the blob store reads as
/// an `AsyncRead`; both halves run on the current task.
async fn stream_field_to_store(
    mut field: Field<'_>,
    state: &AppState,
    uploader_id: i32,
) -> Result<FileMetadata, AppError> {
    let raw_name = field
        .file_name()
        .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
    let original_name = display_filename(raw_name)
        .map_err(|e| AppError::Validation(e.message().into()))?
        .to_string();
    let content_type = field.content_type().map(str::to_string);

    let (mut tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(4);
    let reader: BoxReader = Box::new(StreamReader::new(rx));

    let pump = async move {
        loop {
            let item = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(e) => Err(std::io::Error::other(e.to_string())),
            };
            let failed = item.is_err();
            if failed {
                let _ = tx.send(item).await;
                break;
            }
            // A send error means the store stopped reading. Drain the rest so
            // the client gets the error response instead of a reset.
            if tx.send(item).await.is_err() {
                while let Ok(Some(_)) = field.chunk().await {}
                break;
            }
        }
    };

    let request = UploadRequest {
        original_name,
        content_type,
        custom_metadata: BTreeMap::from([("uploaderId".to_string(), uploader_id.to_string())]),
    };
    let (_, stored) = tokio::join!(pump, state.blobs.upload(request, reader));
    Ok(stored?)
}

#[utoipa::path(
    post,
    path = "/{id}/like",
    tag = "Resources",
    operation_id = "toggleLike",
    summary = "Like or unlike a resource",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "New like state", body = LikeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Resource not approved (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id, user_id = auth_user.user_id))]
pub async fn toggle_like(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<LikeResponse>, AppError> {
    auth_user.require_permission("resource:interact")?;

    let txn = state.db.begin().await?;
    let model = find_resource(&txn, id).await?;
    if model.status != resource::STATUS_APPROVED {
        return Err(AppError::PermissionDenied);
    }

    let existing = resource_like::Entity::find_by_id((auth_user.user_id, id))
        .one(&txn)
        .await?;
    let liked = existing.is_none();

    if liked {
        resource_like::ActiveModel {
            user_id: Set(auth_user.user_id),
            resource_id: Set(id),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;
        resource::Entity::update_many()
            .col_expr(
                resource::Column::LikesCount,
                Expr::col(resource::Column::LikesCount).add(1),
            )
            .filter(resource::Column::Id.eq(id))
            .exec(&txn)
            .await?;
    } else {
        resource_like::Entity::delete_by_id((auth_user.user_id, id))
            .exec(&txn)
            .await?;
        resource::Entity::update_many()
            .col_expr(
                resource::Column::LikesCount,
                Expr::col(resource::Column::LikesCount).sub(1),
            )
            .filter(resource::Column::Id.eq(id))
            .filter(resource::Column::LikesCount.gt(0))
            .exec(&txn)
            .await?;
    }

    let likes_count = find_resource(&txn, id).await?.likes_count;
    txn.commit().await?;

    Ok(Json(LikeResponse { liked, likes_count }))
}

#[utoipa::path(
    post,
    path = "/{id}/bookmark",
    tag = "Resources",
    operation_id = "toggleBookmark",
    summary = "Bookmark or unbookmark a resource",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "New bookmark state", body = BookmarkResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Resource not approved (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id, user_id = auth_user.user_id))]
pub async fn toggle_bookmark(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<BookmarkResponse>, AppError> {
    auth_user.require_permission("resource:interact")?;

    let model = find_resource(&state.db, id).await?;
    if model.status != resource::STATUS_APPROVED {
        return Err(AppError::PermissionDenied);
    }

    let removed = bookmark::Entity::delete_by_id((auth_user.user_id, id))
        .exec(&state.db)
        .await?
        .rows_affected
        > 0;

    if !removed {
        bookmark::Entity::insert(bookmark::ActiveModel {
            user_id: Set(auth_user.user_id),
            resource_id: Set(id),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([
                bookmark::Column::UserId,
                bookmark::Column::ResourceId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&state.db)
        .await?;
    }

    Ok(Json(BookmarkResponse {
        bookmarked: !removed,
    }))
}

#[utoipa::path(
    get,
    path = "/user/bookmarks",
    tag = "Resources",
    operation_id = "listBookmarks",
    summary = "Approved resources the caller bookmarked",
    responses(
        (status = 200, description = "Bookmarked resources, most recent first", body = ResourceCollection),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_bookmarks(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ResourceCollection>, AppError> {
    let marks = bookmark::Entity::find()
        .filter(bookmark::Column::UserId.eq(auth_user.user_id))
        .order_by_desc(bookmark::Column::CreatedAt)
        .all(&state.db)
        .await?;
    let ids: Vec<i32> = marks.iter().map(|b| b.resource_id).collect();

    let mut models = if ids.is_empty() {
        Vec::new()
    } else {
        resource::Entity::find()
            .filter(resource::Column::Id.is_in(ids.clone()))
            .filter(resource::Column::Status.eq(resource::STATUS_APPROVED))
            .all(&state.db)
            .await?
    };
    models.sort_by_key(|m| ids.iter().position(|&id| id == m.id));

    let data = with_uploaders(&state.db, models).await?;
    Ok(Json(ResourceCollection {
        count: data.len() as u64,
        data,
    }))
}

#[utoipa::path(
    get,
    path = "/user/my-uploads",
    tag = "Resources",
    operation_id = "listMyUploads",
    summary = "Resources the caller uploaded, in any status",
    responses(
        (status = 200, description = "Uploads, newest first", body = ResourceCollection),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_my_uploads(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ResourceCollection>, AppError> {
    let models = resource::Entity::find()
        .filter(resource::Column::UploadedBy.eq(auth_user.user_id))
        .order_by_desc(resource::Column::CreatedAt)
        .order_by_desc(resource::Column::Id)
        .all(&state.db)
        .await?;

    let data = with_uploaders(&state.db, models).await?;
    Ok(Json(ResourceCollection {
        count: data.len() as u64,
        data,
    }))
}

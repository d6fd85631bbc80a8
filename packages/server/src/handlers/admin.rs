use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{resource, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::admin::{AdminResourceQuery, RejectRequest, StatsResponse, UserListResponse};
use crate::models::auth::UserProfile;
use crate::models::resource::{ResourceCollection, ResourceResponse};
use crate::models::shared::validate_text;
use crate::state::AppState;
use crate::utils::catalog::{self, find_resource, with_uploaders};

async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn count_with_status(db: &DatabaseConnection, status: &str) -> Result<u64, DbErr> {
    resource::Entity::find()
        .filter(resource::Column::Status.eq(status))
        .count(db)
        .await
}

async fn set_status(
    state: &AppState,
    id: i32,
    status: &str,
    reason: Option<String>,
) -> Result<ResourceResponse, AppError> {
    let model = find_resource(&state.db, id).await?;
    let mut active: resource::ActiveModel = model.into();
    active.status = Set(status.to_string());
    active.rejection_reason = Set(reason);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;

    info!(resource_id = id, status, "Resource moderated");
    let mut responses = with_uploaders(&state.db, vec![updated]).await?;
    responses
        .pop()
        .ok_or_else(|| AppError::Internal("resource vanished after update".into()))
}

#[utoipa::path(
    get,
    path = "/stats",
    tag = "Admin",
    operation_id = "adminStats",
    summary = "Dashboard counters",
    responses(
        (status = 200, description = "Counts of students and resources per status", body = StatsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn stats(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    auth_user.require_permission("resource:moderate")?;

    let total_students = user::Entity::find()
        .filter(user::Column::Role.eq(crate::entity::role::DEFAULT_ROLE))
        .count(&state.db)
        .await?;
    let total_uploads = resource::Entity::find().count(&state.db).await?;

    Ok(Json(StatsResponse {
        total_students,
        total_uploads,
        pending: count_with_status(&state.db, resource::STATUS_PENDING).await?,
        approved: count_with_status(&state.db, resource::STATUS_APPROVED).await?,
        rejected: count_with_status(&state.db, resource::STATUS_REJECTED).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/resources",
    tag = "Admin",
    operation_id = "adminListResources",
    summary = "List resources by moderation status",
    params(AdminResourceQuery),
    responses(
        (status = 200, description = "Resources, newest first", body = ResourceCollection),
        (status = 400, description = "Unknown status (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_resources(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AdminResourceQuery>,
) -> Result<Json<ResourceCollection>, AppError> {
    auth_user.require_permission("resource:moderate")?;

    let status = query.status.as_deref().unwrap_or(resource::STATUS_PENDING);
    if ![
        resource::STATUS_PENDING,
        resource::STATUS_APPROVED,
        resource::STATUS_REJECTED,
    ]
    .contains(&status)
    {
        return Err(AppError::Validation(
            "status must be pending, approved or rejected".into(),
        ));
    }

    let models = resource::Entity::find()
        .filter(resource::Column::Status.eq(status))
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

#[utoipa::path(
    put,
    path = "/resources/{id}/approve",
    tag = "Admin",
    operation_id = "approveResource",
    summary = "Approve a resource",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Approved resource", body = ResourceResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn approve_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ResourceResponse>, AppError> {
    auth_user.require_permission("resource:moderate")?;
    Ok(Json(
        set_status(&state, id, resource::STATUS_APPROVED, None).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/resources/{id}/reject",
    tag = "Admin",
    operation_id = "rejectResource",
    summary = "Reject a resource with a reason",
    params(("id" = i32, Path, description = "Resource ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected resource", body = ResourceResponse),
        (status = 400, description = "Missing reason (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn reject_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<RejectRequest>,
) -> Result<Json<ResourceResponse>, AppError> {
    auth_user.require_permission("resource:moderate")?;
    validate_text("Rejection reason", &payload.reason, 500)?;

    let reason = payload.reason.trim().to_string();
    Ok(Json(
        set_status(&state, id, resource::STATUS_REJECTED, Some(reason)).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/resources/{id}",
    tag = "Admin",
    operation_id = "adminDeleteResource",
    summary = "Delete a resource and its file",
    description = "Removes the resource with its likes and bookmarks, then its stored file. \
        A failure to remove the file is logged, not returned.",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "Resource deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    auth_user.require_permission("resource:moderate")?;

    let model = find_resource(&state.db, id).await?;
    catalog::delete_resource(&state.db, &state.blobs, model).await?;
    info!(resource_id = id, "Resource deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Admin",
    operation_id = "adminListUsers",
    summary = "List all accounts",
    responses(
        (status = 200, description = "Accounts, newest first", body = UserListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_users(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserListResponse>, AppError> {
    auth_user.require_permission("user:manage")?;

    let users = user::Entity::find()
        .order_by_desc(user::Column::CreatedAt)
        .order_by_desc(user::Column::Id)
        .all(&state.db)
        .await?;

    Ok(Json(UserListResponse {
        total: users.len() as u64,
        data: users.into_iter().map(UserProfile::from).collect(),
    }))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Admin",
    operation_id = "adminDeleteUser",
    summary = "Delete a student and everything they uploaded",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Admins cannot be deleted (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_user(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    auth_user.require_permission("user:manage")?;

    let target = find_user(&state.db, id).await?;
    if target.role == crate::entity::role::ADMIN_ROLE {
        return Err(AppError::PermissionDenied);
    }

    catalog::delete_user(&state.db, &state.blobs, target.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/users/{id}/toggle-status",
    tag = "Admin",
    operation_id = "toggleUserStatus",
    summary = "Suspend or reactivate an account",
    description = "Suspended accounts cannot log in. Tokens already issued stay valid until \
        they expire.",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Updated account", body = UserProfile),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Admins cannot be suspended (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn toggle_user_status(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<UserProfile>, AppError> {
    auth_user.require_permission("user:manage")?;

    let target = find_user(&state.db, id).await?;
    if target.role == crate::entity::role::ADMIN_ROLE {
        return Err(AppError::PermissionDenied);
    }

    let next = if target.account_status == user::STATUS_ACTIVE {
        user::STATUS_SUSPENDED
    } else {
        user::STATUS_ACTIVE
    };
    let mut active: user::ActiveModel = target.into();
    active.account_status = Set(next.to_string());
    let updated = active.update(&state.db).await?;

    info!(user_id = id, status = next, "Account status changed");
    Ok(Json(UserProfile::from(updated)))
}

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{bookmark, resource_like, role, role_permission, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MeResponse, SignupRequest,
    UpdateProfileRequest, UserProfile, normalize_email, validate_change_password,
    validate_login_request, validate_signup_request, validate_update_profile,
};
use crate::state::AppState;
use crate::utils::{hash, jwt};

/// Permissions granted to a role.
pub async fn permissions_for<C: ConnectionTrait>(
    db: &C,
    role: &str,
) -> Result<Vec<String>, DbErr> {
    Ok(role_permission::Entity::find()
        .filter(role_permission::Column::Role.eq(role))
        .all(db)
        .await?
        .into_iter()
        .map(|rp| rp.permission)
        .collect())
}

async fn issue_token(state: &AppState, user: user::Model) -> Result<AuthResponse, AppError> {
    let permissions = permissions_for(&state.db, &user.role).await?;

    let token = jwt::sign(
        user.id,
        &user.email,
        &user.role,
        permissions.clone(),
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    Ok(AuthResponse {
        token,
        user: UserProfile::from(user),
        permissions,
    })
}

#[utoipa::path(
    post,
    path = "/signup",
    tag = "Auth",
    operation_id = "signup",
    summary = "Create a student account",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Email already registered (EMAIL_TAKEN)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_signup_request(&payload)?;

    let email = normalize_email(&payload.email);

    let exists = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .count(&state.db)
        .await?
        > 0;
    if exists {
        return Err(AppError::EmailTaken);
    }

    let hash = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    let new_user = user::ActiveModel {
        name: Set(payload.name.trim().to_string()),
        email: Set(email),
        password: Set(hash),
        branch: Set(payload.branch.trim().to_string()),
        semester: Set(payload.semester),
        role: Set(role::DEFAULT_ROLE.to_string()),
        account_status: Set(user::STATUS_ACTIVE.to_string()),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let user = new_user.insert(&state.db).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            tracing::debug!("Signup race condition: unique constraint caught on insert");
            AppError::EmailTaken
        }
        _ => AppError::from(e),
    })?;

    Ok((StatusCode::CREATED, Json(issue_token(&state, user).await?)))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in with email and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Wrong email or password (INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 403, description = "Account suspended (ACCOUNT_SUSPENDED)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    validate_login_request(&payload)?;

    let user = user::Entity::find()
        .filter(user::Column::Email.eq(normalize_email(&payload.email)))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let is_valid = hash::verify_password(&payload.password, &user.password)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;

    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    if user.account_status == user::STATUS_SUSPENDED {
        return Err(AppError::AccountSuspended);
    }

    Ok(Json(issue_token(&state, user).await?))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "getMe",
    summary = "Current user's profile",
    responses(
        (status = 200, description = "Profile", body = MeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Account no longer exists (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, AppError> {
    let user = find_user(&state, auth_user.user_id).await?;

    let bookmarks = bookmark::Entity::find()
        .filter(bookmark::Column::UserId.eq(user.id))
        .order_by_desc(bookmark::Column::CreatedAt)
        .all(&state.db)
        .await?
        .into_iter()
        .map(|b| b.resource_id)
        .collect();

    let liked_resources = resource_like::Entity::find()
        .filter(resource_like::Column::UserId.eq(user.id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|l| l.resource_id)
        .collect();

    Ok(Json(MeResponse {
        user: UserProfile::from(user),
        permissions: auth_user.permissions,
        bookmarks,
        liked_resources,
    }))
}

async fn find_user(state: &AppState, user_id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

#[utoipa::path(
    put,
    path = "/profile",
    tag = "Auth",
    operation_id = "updateProfile",
    summary = "Update name, branch or semester",
    description = "Only the fields present in the body are changed. Email and role cannot be changed here.",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Account no longer exists (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_profile(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, AppError> {
    validate_update_profile(&payload)?;

    let mut active: user::ActiveModel = find_user(&state, auth_user.user_id).await?.into();
    if let Some(ref name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(ref branch) = payload.branch {
        active.branch = Set(branch.trim().to_string());
    }
    if let Some(semester) = payload.semester {
        active.semester = Set(semester);
    }

    let model = active.update(&state.db).await?;
    Ok(Json(UserProfile::from(model)))
}

#[utoipa::path(
    put,
    path = "/change-password",
    tag = "Auth",
    operation_id = "changePassword",
    summary = "Change the current password",
    description = "Requires the current password. Tokens issued before the change stay valid until they expire.",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Wrong current password (INVALID_CREDENTIALS) or unauthorized", body = ErrorBody),
        (status = 404, description = "Account no longer exists (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn change_password(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    validate_change_password(&payload)?;

    let user = find_user(&state, auth_user.user_id).await?;
    let is_valid = hash::verify_password(&payload.current_password, &user.password)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;
    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    let hash = hash::hash_password(&payload.new_password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;
    let mut active: user::ActiveModel = user.into();
    active.password = Set(hash);
    active.update(&state.db).await?;

    info!("Password changed");
    Ok(StatusCode::NO_CONTENT)
}

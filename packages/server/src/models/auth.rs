use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::AppError;
use crate::models::shared::{validate_semester, validate_text};

/// Request body for account creation.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct SignupRequest {
    #[schema(example = "Asha Verma")]
    pub name: String,
    #[schema(example = "asha@example.edu")]
    pub email: String,
    /// Password (8-128 characters).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    #[schema(example = "CSE")]
    pub branch: String,
    #[schema(example = 3)]
    pub semester: i32,
}

/// Lowercased, trimmed form of an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn validate_signup_request(payload: &SignupRequest) -> Result<(), AppError> {
    validate_text("Name", &payload.name, 100)?;
    let email = payload.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed || email.len() > 254 {
        return Err(AppError::Validation("Email address is not valid".into()));
    }
    validate_password(&payload.password)?;
    validate_text("Branch", &payload.branch, 50)?;
    validate_semester(payload.semester)
}

/// Request body for login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[schema(example = "asha@example.edu")]
    pub email: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Partial profile update. Omitted fields are left unchanged.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    #[schema(example = "Asha Verma")]
    pub name: Option<String>,
    #[schema(example = "ECE")]
    pub branch: Option<String>,
    #[schema(example = 4)]
    pub semester: Option<i32>,
}

pub fn validate_update_profile(payload: &UpdateProfileRequest) -> Result<(), AppError> {
    if *payload == UpdateProfileRequest::default() {
        return Err(AppError::Validation(
            "Provide at least one field to update".into(),
        ));
    }
    if let Some(ref name) = payload.name {
        validate_text("Name", name, 100)?;
        if name.trim().chars().count() < 2 {
            return Err(AppError::Validation(
                "Name must be at least 2 characters".into(),
            ));
        }
    }
    if let Some(ref branch) = payload.branch {
        validate_text("Branch", branch, 50)?;
    }
    if let Some(semester) = payload.semester {
        validate_semester(semester)?;
    }
    Ok(())
}

/// Request body for changing the current password.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ChangePasswordRequest {
    #[schema(example = "s3cure_P@ss!")]
    pub current_password: String,
    /// New password (8-128 characters).
    #[schema(example = "n3w_s3cure_P@ss!")]
    pub new_password: String,
}

pub fn validate_change_password(payload: &ChangePasswordRequest) -> Result<(), AppError> {
    if payload.current_password.is_empty() {
        return Err(AppError::Validation(
            "Current password must not be empty".into(),
        ));
    }
    validate_password(&payload.new_password)
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 || password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    Ok(())
}

/// Public view of an account.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserProfile {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "Asha Verma")]
    pub name: String,
    #[schema(example = "asha@example.edu")]
    pub email: String,
    #[schema(example = "CSE")]
    pub branch: String,
    #[schema(example = 3)]
    pub semester: i32,
    #[schema(example = "student")]
    pub role: String,
    #[schema(example = "active")]
    pub account_status: String,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            branch: user.branch,
            semester: user.semester,
            role: user.role,
            account_status: user.account_status,
            created_at: user.created_at,
        }
    }
}

/// Response of signup and login.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    /// JWT bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    pub user: UserProfile,
    /// Permissions granted to the user.
    #[schema(example = json!(["resource:upload", "resource:interact"]))]
    pub permissions: Vec<String>,
}

/// Current authenticated user's profile.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub user: UserProfile,
    #[schema(example = json!(["resource:upload", "resource:interact"]))]
    pub permissions: Vec<String>,
    /// Ids of bookmarked resources.
    pub bookmarks: Vec<i32>,
    /// Ids of liked resources.
    pub liked_resources: Vec<i32>,
}

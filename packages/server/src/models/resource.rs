use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{resource, user};
use crate::error::AppError;
use crate::models::shared::{Pagination, validate_semester, validate_text};

/// Query parameters of the public resource listing.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResourceListQuery {
    /// Page number (1-based). Default: 1.
    pub page: Option<u64>,
    /// Items per page (1-100). Default: 12.
    pub per_page: Option<u64>,
    /// Exact branch, e.g. `CSE`.
    pub branch: Option<String>,
    pub semester: Option<i32>,
    /// Case-insensitive substring of the subject.
    pub subject: Option<String>,
    /// One of `Notes`, `Assignment`, `PYQ`, `Lab`.
    pub kind: Option<String>,
    /// Case-insensitive substring of title, description or subject.
    pub search: Option<String>,
}

/// Text fields of the upload form, as received.
#[derive(Default)]
pub struct UploadResourceForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub branch: Option<String>,
    pub semester: Option<String>,
    pub subject: Option<String>,
    pub kind: Option<String>,
}

/// Validated resource attributes from an upload form.
#[derive(Debug, PartialEq)]
pub struct NewResource {
    pub title: String,
    pub description: String,
    pub branch: String,
    pub semester: i32,
    pub subject: String,
    pub kind: String,
}

fn required(field: &str, value: Option<String>, max: usize) -> Result<String, AppError> {
    let value = value.unwrap_or_default();
    validate_text(field, &value, max)?;
    Ok(value.trim().to_string())
}

impl UploadResourceForm {
    /// Record a multipart text field. Unknown fields are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "branch" => &mut self.branch,
            "semester" => &mut self.semester,
            "subject" => &mut self.subject,
            // `type` is the field name older clients send.
            "kind" | "type" => &mut self.kind,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn validate(self) -> Result<NewResource, AppError> {
        let title = required("Title", self.title, 200)?;
        let description = required("Description", self.description, 2000)?;
        let branch = required("Branch", self.branch, 50)?;
        let subject = required("Subject", self.subject, 100)?;

        let semester = self
            .semester
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .parse::<i32>()
            .map_err(|_| AppError::Validation("Semester must be a number".into()))?;
        validate_semester(semester)?;

        let kind = self.kind.unwrap_or_default().trim().to_string();
        if !resource::KINDS.contains(&kind.as_str()) {
            return Err(AppError::Validation(format!(
                "Type must be one of: {}",
                resource::KINDS.join(", ")
            )));
        }

        Ok(NewResource {
            title,
            description,
            branch,
            semester,
            subject,
            kind,
        })
    }
}

/// Uploader details shown alongside a resource.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploaderSummary {
    pub id: i32,
    #[schema(example = "Asha Verma")]
    pub name: String,
    #[schema(example = "CSE")]
    pub branch: String,
    #[schema(example = 3)]
    pub semester: i32,
}

impl From<&user::Model> for UploaderSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            branch: user.branch.clone(),
            semester: user.semester,
        }
    }
}

/// A study resource.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ResourceResponse {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = "DBMS Unit 3 notes")]
    pub title: String,
    pub description: String,
    #[schema(example = "CSE")]
    pub branch: String,
    #[schema(example = 4)]
    pub semester: i32,
    #[schema(example = "DBMS")]
    pub subject: String,
    #[schema(example = "Notes")]
    pub kind: String,
    /// Blob id of the attached PDF.
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015")]
    pub file_id: String,
    #[schema(example = "unit3.pdf")]
    pub file_name: String,
    /// Relative URL streaming the file.
    #[schema(example = "/api/v1/files/9f86d081884c7d659a2feaa0c55ad015")]
    pub file_url: String,
    #[schema(example = "approved")]
    pub status: String,
    pub rejection_reason: Option<String>,
    #[schema(example = 12)]
    pub likes_count: i32,
    pub uploader: Option<UploaderSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceResponse {
    pub fn new(model: resource::Model, uploader: Option<&user::Model>) -> Self {
        Self {
            file_url: format!("/api/v1/files/{}", model.file_id),
            id: model.id,
            title: model.title,
            description: model.description,
            branch: model.branch,
            semester: model.semester,
            subject: model.subject,
            kind: model.kind,
            file_id: model.file_id,
            file_name: model.file_name,
            status: model.status,
            rejection_reason: model.rejection_reason,
            likes_count: model.likes_count,
            uploader: uploader.map(UploaderSummary::from),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// A page of resources.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ResourceListResponse {
    pub data: Vec<ResourceResponse>,
    pub pagination: Pagination,
}

/// An unpaginated set of resources.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ResourceCollection {
    pub data: Vec<ResourceResponse>,
    #[schema(example = 3)]
    pub count: u64,
}

/// Result of toggling a like.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LikeResponse {
    pub liked: bool,
    #[schema(example = 13)]
    pub likes_count: i32,
}

/// Result of toggling a bookmark.
#[derive(Serialize, utoipa::ToSchema)]
pub struct BookmarkResponse {
    pub bookmarked: bool,
}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "rejected";

/// Accepted values of `kind`.
pub const KINDS: &[&str] = &["Notes", "Assignment", "PYQ", "Lab"];

/// A study resource submitted by a student. Only `approved` resources are
/// listed publicly.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub branch: String,
    pub semester: i32,
    pub subject: String,
    pub kind: String,

    /// Hex id of the blob holding the uploaded file.
    pub file_id: String,
    pub file_name: String,

    pub uploaded_by: i32,
    #[sea_orm(belongs_to, from = "uploaded_by", to = "id")]
    pub uploader: HasOne<super::user::Entity>,

    /// `pending`, `approved` or `rejected`.
    pub status: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_reason: Option<String>,
    pub likes_count: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

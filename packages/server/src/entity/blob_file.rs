use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Metadata index row for one blob.
///
/// Rows are inserted with `committed = false` when an upload starts and only
/// flipped once every chunk is written; readers ignore uncommitted rows.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blob_file")]
pub struct Model {
    /// 32 lowercase hex characters.
    #[sea_orm(primary_key, auto_increment = false)]
    pub file_id: String,

    pub stored_name: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub chunk_size: i32,
    pub committed: bool,
    /// JSON object of string pairs.
    #[sea_orm(column_type = "Text")]
    pub custom_metadata: String,

    pub uploaded_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

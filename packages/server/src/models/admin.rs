use serde::{Deserialize, Serialize};

use crate::models::auth::UserProfile;

/// Dashboard counters.
#[derive(Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    /// Accounts with the `student` role.
    #[schema(example = 120)]
    pub total_students: u64,
    #[schema(example = 58)]
    pub total_uploads: u64,
    #[schema(example = 5)]
    pub pending: u64,
    #[schema(example = 50)]
    pub approved: u64,
    #[schema(example = 3)]
    pub rejected: u64,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminResourceQuery {
    /// `pending` (default), `approved` or `rejected`.
    pub status: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RejectRequest {
    /// Shown to the uploader.
    #[schema(example = "Scanned pages are unreadable")]
    pub reason: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserProfile>,
    #[schema(example = 2)]
    pub total: u64,
}

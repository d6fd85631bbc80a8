use common::storage::BlobStore;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blobs: BlobStore,
    pub config: AppConfig,
}

use std::collections::HashMap;

use common::storage::{BlobStore, FileId};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::*;
use tracing::{info, warn};

use crate::entity::{bookmark, resource, resource_like, user};
use crate::error::AppError;
use crate::models::resource::ResourceResponse;

pub async fn find_resource<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<resource::Model, AppError> {
    resource::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Resource not found".into()))
}

/// Pair each resource with its uploader, keeping the input order.
pub async fn with_uploaders<C: ConnectionTrait>(
    db: &C,
    resources: Vec<resource::Model>,
) -> Result<Vec<ResourceResponse>, AppError> {
    let mut ids: Vec<i32> = resources.iter().map(|r| r.uploaded_by).collect();
    ids.sort_unstable();
    ids.dedup();

    let uploaders: HashMap<i32, user::Model> = if ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect()
    };

    Ok(resources
        .into_iter()
        .map(|r| {
            let uploader = uploaders.get(&r.uploaded_by);
            ResourceResponse::new(r, uploader)
        })
        .collect())
}

/// Remove a blob after its owning record is gone. Failures are logged only;
/// the stale-upload reaper does not cover committed blobs, so they are left
/// for manual cleanup.
pub async fn discard_blob(blobs: &BlobStore, file_id: &str) {
    let id = match FileId::from_hex(file_id) {
        Ok(id) => id,
        Err(e) => {
            warn!(file_id, error = %e, "Resource references an unparseable file id");
            return;
        }
    };
    if let Err(e) = blobs.delete(&id).await {
        warn!(%id, error = %e, "Failed to delete blob of removed resource");
    }
}

/// Deletes a freshly stored blob unless the record that owns it was saved.
///
/// Dropping an armed guard (for instance when the request future is cancelled
/// between the upload and the insert) spawns the delete on the runtime.
pub struct PendingBlob {
    blobs: BlobStore,
    file_id: Option<FileId>,
}

impl PendingBlob {
    pub fn new(blobs: BlobStore) -> Self {
        Self {
            blobs,
            file_id: None,
        }
    }

    pub fn track(&mut self, file_id: FileId) {
        self.file_id = Some(file_id);
    }

    pub fn is_tracking(&self) -> bool {
        self.file_id.is_some()
    }

    /// The owning record exists; keep the blob.
    pub fn keep(&mut self) {
        self.file_id = None;
    }

    /// Delete the tracked blob now.
    pub async fn discard(mut self) {
        if let Some(id) = self.file_id.take() {
            discard_blob(&self.blobs, &id.to_hex()).await;
        }
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        let Some(id) = self.file_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%id, "Upload request dropped before its resource was saved");
                let blobs = self.blobs.clone();
                handle.spawn(async move { discard_blob(&blobs, &id.to_hex()).await });
            }
            Err(_) => warn!(%id, "Upload request dropped outside a runtime; blob orphaned"),
        }
    }
}

/// Delete a resource, its likes and bookmarks, then its blob.
pub async fn delete_resource(
    db: &DatabaseConnection,
    blobs: &BlobStore,
    model: resource::Model,
) -> Result<(), AppError> {
    let txn = db.begin().await?;
    resource_like::Entity::delete_many()
        .filter(resource_like::Column::ResourceId.eq(model.id))
        .exec(&txn)
        .await?;
    bookmark::Entity::delete_many()
        .filter(bookmark::Column::ResourceId.eq(model.id))
        .exec(&txn)
        .await?;
    resource::Entity::delete_by_id(model.id).exec(&txn).await?;
    txn.commit().await?;

    discard_blob(blobs, &model.file_id).await;
    Ok(())
}

/// Delete a user together with everything they own.
///
/// Their resources go first (with likes, bookmarks and blobs), then the likes
/// and bookmarks they placed on other resources, then the account itself.
pub async fn delete_user(
    db: &DatabaseConnection,
    blobs: &BlobStore,
    user_id: i32,
) -> Result<(), AppError> {
    let owned = resource::Entity::find()
        .filter(resource::Column::UploadedBy.eq(user_id))
        .all(db)
        .await?;
    let owned_count = owned.len();
    for model in owned {
        delete_resource(db, blobs, model).await?;
    }

    let txn = db.begin().await?;
    let liked: Vec<i32> = resource_like::Entity::find()
        .filter(resource_like::Column::UserId.eq(user_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|like| like.resource_id)
        .collect();
    if !liked.is_empty() {
        resource::Entity::update_many()
            .col_expr(
                resource::Column::LikesCount,
                Expr::col(resource::Column::LikesCount).sub(1),
            )
            .filter(resource::Column::Id.is_in(liked))
            .filter(resource::Column::LikesCount.gt(0))
            .exec(&txn)
            .await?;
    }
    resource_like::Entity::delete_many()
        .filter(resource_like::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    bookmark::Entity::delete_many()
        .filter(bookmark::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    user::Entity::delete_by_id(user_id).exec(&txn).await?;
    txn.commit().await?;

    info!(user_id, resources = owned_count, "Deleted user and owned resources");
    Ok(())
}

use chrono::Utc;
use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder, SqliteQueryBuilder};
use sea_orm::*;
use tracing::{info, warn};

use crate::config::AdminConfig;
use crate::entity::{blob_file, resource, role, role_permission, user};
use crate::models::auth::normalize_email;
use crate::utils::hash::hash_password;

/// Default roles seeded on startup.
const DEFAULT_ROLES: &[&str] = &[role::ADMIN_ROLE, role::DEFAULT_ROLE];

/// Default role-permission mappings seeded on startup.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    // Admin: everything a student can do plus moderation
    ("admin", "resource:upload"),
    ("admin", "resource:interact"),
    ("admin", "resource:moderate"),
    ("admin", "user:manage"),
    ("admin", "file:delete"),
    // Student
    ("student", "resource:upload"),
    ("student", "resource:interact"),
];

/// Seed the `role` and `role_permission` tables with defaults.
pub async fn seed_role_permissions(db: &DatabaseConnection) -> Result<(), DbErr> {
    let mut roles_inserted = 0u64;
    for &name in DEFAULT_ROLES {
        let model = role::ActiveModel {
            name: Set(name.to_string()),
        };

        let result = role::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(role::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await;

        match result {
            Ok(rows) => roles_inserted += rows,
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if roles_inserted > 0 {
        info!("Seeded {} new roles", roles_inserted);
    }

    let mut perms_inserted = 0u64;
    for &(role, permission) in DEFAULT_MAPPINGS {
        let model = role_permission::ActiveModel {
            role: Set(role.to_string()),
            permission: Set(permission.to_string()),
        };

        let result = role_permission::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([
                    role_permission::Column::Role,
                    role_permission::Column::Permission,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await;

        match result {
            Ok(rows) => perms_inserted += rows,
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if perms_inserted > 0 {
        info!("Seeded {} new role-permission mappings", perms_inserted);
    }

    Ok(())
}

/// Create the configured administrator unless an account with that email
/// already exists. Does nothing when no admin credentials are configured.
pub async fn ensure_admin(db: &DatabaseConnection, config: &AdminConfig) -> Result<(), DbErr> {
    let (Some(email), Some(password)) = (config.email.as_deref(), config.password.as_deref())
    else {
        return Ok(());
    };
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        warn!("Admin credentials are configured but empty, skipping");
        return Ok(());
    }

    if let Some(existing) = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?
    {
        if existing.role != role::ADMIN_ROLE {
            warn!(%email, role = %existing.role, "Configured admin email belongs to a non-admin account");
        }
        return Ok(());
    }

    let password_hash = hash_password(password)
        .map_err(|e| DbErr::Custom(format!("Failed to hash admin password: {e}")))?;

    user::ActiveModel {
        name: Set(config.name.clone()),
        email: Set(email.clone()),
        password: Set(password_hash),
        branch: Set("Administration".into()),
        semester: Set(1),
        role: Set(role::ADMIN_ROLE.to_string()),
        account_status: Set(user::STATUS_ACTIVE.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(%email, "Created administrator account");
    Ok(())
}

/// Ensure composite indexes used by listing and the upload reaper exist.
///
/// Schema sync does not create composite non-unique indexes, so they are
/// created here. Failures are logged and do not stop start-up.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let indexes = [
        (
            "idx_resource_status_created",
            Index::create()
                .if_not_exists()
                .name("idx_resource_status_created")
                .table(resource::Entity)
                .col(resource::Column::Status)
                .col(resource::Column::CreatedAt)
                .to_owned(),
        ),
        (
            "idx_blob_file_committed_uploaded",
            Index::create()
                .if_not_exists()
                .name("idx_blob_file_committed_uploaded")
                .table(blob_file::Entity)
                .col(blob_file::Column::Committed)
                .col(blob_file::Column::UploadedAt)
                .to_owned(),
        ),
    ];

    for (name, stmt) in indexes {
        let sql = render_index(db.get_database_backend(), &stmt);
        match db.execute_unprepared(&sql).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}

fn render_index(backend: DbBackend, stmt: &IndexCreateStatement) -> String {
    match backend {
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(PostgresQueryBuilder),
    }
}

use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/resources", resource_routes(config))
        .nest("/files", file_routes())
        .nest("/admin", admin_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::signup))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
        .routes(routes!(handlers::auth::update_profile))
        .routes(routes!(handlers::auth::change_password))
}

fn resource_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    // Only the upload route accepts bodies larger than axum's default limit.
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::resource::upload_resource))
        .layer(handlers::resource::upload_body_limit(
            config.storage.max_size_bytes,
        ));

    OpenApiRouter::new()
        .routes(routes!(handlers::resource::list_resources))
        .routes(routes!(handlers::resource::get_resource))
        .routes(routes!(handlers::resource::toggle_like))
        .routes(routes!(handlers::resource::toggle_bookmark))
        .routes(routes!(handlers::resource::list_bookmarks))
        .routes(routes!(handlers::resource::list_my_uploads))
        .merge(upload)
}

fn file_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::file::download_file,
            handlers::file::delete_file
        ))
        .routes(routes!(handlers::file::file_info))
}

fn admin_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::admin::stats))
        .routes(routes!(handlers::admin::list_resources))
        .routes(routes!(handlers::admin::approve_resource))
        .routes(routes!(handlers::admin::reject_resource))
        .routes(routes!(handlers::admin::delete_resource))
        .routes(routes!(handlers::admin::list_users))
        .routes(routes!(handlers::admin::delete_user))
        .routes(routes!(handlers::admin::toggle_user_status))
}

use std::net::SocketAddr;

use anyhow::Context;
use server::config::AppConfig;
use server::state::AppState;
use server::{build_router, database, seed, storage};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = database::init_db(&config.database.url)
        .await
        .context("Failed to connect to the database")?;
    info!("Database connected and schema synced");

    seed::seed_role_permissions(&db).await?;
    seed::ensure_indexes(&db).await?;
    seed::ensure_admin(&db, &config.admin).await?;

    let blobs = storage::build_blob_store(&db, config.storage.clone())
        .await
        .context("Failed to initialise file storage")?;
    info!(
        backend = ?config.storage.chunk_backend,
        chunk_size = config.storage.chunk_size_bytes,
        max_size = config.storage.max_size_bytes,
        "File storage ready"
    );
    let _reaper = storage::spawn_reaper(blobs.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host/server.port")?;

    let app = build_router(AppState { db, blobs, config });

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

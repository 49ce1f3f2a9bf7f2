//! Service entry point: config, database, registry, HTTP server.
//!
//! Run from repo root: `cargo run -p scaffold-app`

mod models;

use crud_scaffold::{
    build_app, ensure_database_exists, ensure_tables, init_tracing, load_from_dir, AppConfig,
    PgStore, RegistryBuilder, Store,
};
use models::{Note, Product, Widget};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(project = %config.project_name, database = %config.database.redacted_url(), "starting");

    let connect = config.database.connect_options();
    ensure_database_exists(&connect, &config.database.name).await?;
    let pool = config.database.pool_options().connect_with(connect).await?;

    let mut builder = RegistryBuilder::new(config.api_prefix.clone())
        .model::<Note>()
        .model::<Product>()
        .model::<Widget>();
    if let Some(dir) = &config.models_path {
        let defs = load_from_dir(dir).await?;
        tracing::info!(count = defs.len(), path = %dir.display(), "loaded model definitions");
        builder = builder.definitions(defs);
    }
    let registry = Arc::new(builder.build()?);

    if config.database.auto_create_tables {
        ensure_tables(&pool, &registry).await?;
    }

    let store = PgStore::new(pool.clone());
    store.ping().await?;
    let app = build_app(registry, Arc::new(store), &config.project_name);

    let listener = TcpListener::bind(config.bind_addr()?).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

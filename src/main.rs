use std::sync::Arc;

use pokedream_backend::{
    api::{self, AppState},
    config::{self, Config, StorageKind},
    db::Database,
    metrics,
    store::{json::JsonStore, Store},
};

async fn serve<S: Store>(store: S, config: &Config) {
    let state = AppState::new(Arc::new(store), config);
    let app = api::router(state, config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(
        "PokéDream backend listening on port {} (season {})",
        config.port,
        config.season
    );
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    config::set_local_mode(config.local_mode);
    if config.local_mode {
        tracing::info!("Running in LOCAL MODE: admin checks and rate limits are off");
    } else if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set; admin endpoints are disabled");
    }

    metrics::register_metrics();

    match config.storage {
        StorageKind::Json => {
            let store = JsonStore::open(&config.data_dir)
                .await
                .expect("Failed to open JSON data directory");
            tracing::info!("Using JSON storage in {}", config.data_dir.display());
            serve(store, &config).await;
        }
        StorageKind::Sqlite => {
            let db = Database::new(&config.database_url)
                .await
                .expect("Failed to initialize database");
            tracing::info!("Using SQLite storage at {}", config.database_url);
            serve(db, &config).await;
        }
    }
}

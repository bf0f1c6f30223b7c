use anyhow::{Context, Result};
use harvester_common::handshake::load_private_key;
use harvester_server::config::ServerConfig;
use harvester_server::persistence;
use harvester_server::state::AppState;
use harvester_server::{app, init_tracing, shutdown_signal};
use harvester_storage::engine::redact_dsn;
use harvester_storage::SnapshotFile;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = ServerConfig::load(config_path.as_deref())?;
    init_tracing(&config.log_level)?;

    let private_key = match &config.crypto_key {
        Some(path) => Some(
            load_private_key(path)
                .with_context(|| format!("loading private key {}", path.display()))?,
        ),
        None => None,
    };

    let db = config
        .database_dsn
        .as_deref()
        .map(redact_dsn)
        .unwrap_or_else(|| "memory".to_string());
    tracing::info!(
        address = %config.address,
        store_interval_secs = config.store_interval_secs,
        snapshot = %config.file_storage_path.display(),
        restore = config.restore,
        db = %db,
        signing = config.key.is_some(),
        encryption = private_key.is_some(),
        "harvester-server starting"
    );

    let storage =
        harvester_storage::open(config.database_dsn.as_deref(), config.request_timeout())
            .await
            .context("opening metric storage")?;
    let snapshot = SnapshotFile::new(config.file_storage_path.clone());
    persistence::bootstrap(storage.as_ref(), &snapshot, config.restore).await?;

    let store_handle = tokio::spawn(persistence::store_loop(
        storage.clone(),
        snapshot.clone(),
        config.store_interval(),
    ));

    let address = config.address.clone();
    let state = AppState::new(storage.clone(), config, private_key);
    let app = app::build_http_app(state);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(backend = storage.name(), address = %address, "Server started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server error");
    }

    store_handle.abort();
    persistence::final_flush(storage.as_ref(), &snapshot).await;
    if let Err(e) = storage.close().await {
        tracing::warn!(error = %e, "Failed to close storage");
    }
    tracing::info!("Server stopped");
    served.context("serving HTTP")
}

use std::sync::Arc;

use tracing::{error, info};

use workbench::{Config, Database, FileService, FsBlobStore, ProjectService, RetryExecutor};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = workbench::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        workbench::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    info!("Workbench - project file engine");

    let db = match Database::open(&config.database.path, config.database.max_connections).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {e}");
            std::process::exit(1);
        }
    };

    let blobs = match FsBlobStore::new(&config.storage.path) {
        Ok(blobs) => blobs,
        Err(e) => {
            error!("Failed to open blob storage: {e}");
            std::process::exit(1);
        }
    };

    let retry = RetryExecutor::new(config.retry.to_retry_config())
        .with_health_check(Arc::new(db.clone()));

    let files = FileService::new(&db, &blobs, &retry)
        .with_max_file_size(config.storage.max_file_size_bytes());
    let projects = ProjectService::new(&db, &blobs, &retry);

    info!(
        database = %config.database.path,
        storage = %blobs.base_path().display(),
        max_attempts = retry.config().max_attempts(),
        max_file_size = files.max_file_size(),
        "Stores ready"
    );

    match projects.list("local").await {
        Ok(list) => info!(projects = list.len(), "Local workspace opened"),
        Err(e) => error!("Failed to list projects: {e}"),
    }

    db.close().await;
}

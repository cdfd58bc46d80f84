//! Beacon ingestion API server entrypoint.

#![forbid(unsafe_code)]

use std::sync::Arc;

use beacon_core::observability::init_logging;
use beacon_core::storage::{LocalFsBackend, MemoryBackend, StorageBackend};

use beacon_api::config::ApiConfig;
use beacon_api::identity::StaticSessionStore;
use beacon_api::server;

#[tokio::main]
async fn main() -> beacon_core::Result<()> {
    let config = ApiConfig::from_env();
    init_logging(config.log_format);
    beacon_ingest::metrics::register_metrics();

    let backend: Arc<dyn StorageBackend> = match &config.data_dir {
        Some(root) => {
            tracing::info!(root = %root.display(), "using local filesystem backend");
            Arc::new(LocalFsBackend::new(root.clone())?)
        }
        None => {
            tracing::warn!("BEACON_DATA_DIR unset, using in-memory backend");
            Arc::new(MemoryBackend::new())
        }
    };

    let sessions = Arc::new(StaticSessionStore::new());

    server::run(&config, backend, sessions).await
}

use crate::config::AppConfig;
use crate::services::storage::{BlobStorage, LocalDiskStorage};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn BlobStorage>> {
    tokio::fs::create_dir_all(&config.storage_root).await?;
    info!("📦 Blob storage root: {}", config.storage_root);
    Ok(Arc::new(LocalDiskStorage::new(config.storage_root.clone())))
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Opaque blob store keyed by relative paths such as
/// `documents/{uuid}.pdf` and `documents/modified/modified_{uuid}.docx`.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Disk-backed storage rooted at a media directory.
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        // Keys are generated internally; reject anything path-shaped anyway.
        let safe: PathBuf = Path::new(key)
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        self.root.join(safe)
    }
}

#[async_trait]
impl BlobStorage for LocalDiskStorage {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("writing blob {}", key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading blob {}", key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("deleting blob {}", key))?;
        Ok(())
    }
}

//! # jb-blob-local
//!
//! Local filesystem implementation of `BlobStore`.
//! Blob paths map directly onto files below the root; each file has a
//! `.meta.json` sidecar carrying its `BlobMeta`.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jb_core::{BlobMeta, BlobStore};
use tokio::fs;
use tracing::debug;

pub struct FsBlobStore {
    /// Root directory for all blobs (e.g., "./data/blobs")
    root_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root_path: root }
    }

    /// Resolves a blob path below the root, rejecting anything that could escape it.
    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("invalid blob path {path:?}");
        }
        Ok(self.root_path.join(relative))
    }

    fn sidecar(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    async fn read_meta(file: &Path) -> anyhow::Result<Option<BlobMeta>> {
        match fs::read(Self::sidecar(file)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Metadata for files placed by hand, without a sidecar.
    async fn meta_from_fs(path: &str, file: &Path) -> anyhow::Result<Option<BlobMeta>> {
        let stat = match fs::metadata(file).await {
            Ok(stat) => stat,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let updated_at = stat.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
        Ok(Some(BlobMeta {
            path: path.to_string(),
            size: stat.len(),
            content_type: mime_guess::from_path(path).first_or_octet_stream().to_string(),
            updated_at,
        }))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> anyhow::Result<BlobMeta> {
        let file = self.resolve(path)?;

        // 1. Ensure directory exists
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        // 2. Timestamp strictly after the previous version
        let mut updated_at = Utc::now();
        if let Some(previous) = Self::read_meta(&file).await? {
            if updated_at <= previous.updated_at {
                updated_at = previous.updated_at + Duration::milliseconds(1);
            }
        }

        // 3. Save data, then metadata
        let content_type = if content_type.is_empty() {
            mime_guess::from_path(path).first_or_octet_stream().to_string()
        } else {
            content_type.to_string()
        };
        let meta = BlobMeta {
            path: path.to_string(),
            size: data.len() as u64,
            content_type,
            updated_at,
        };
        fs::write(&file, &data)
            .await
            .with_context(|| format!("writing {}", file.display()))?;
        fs::write(Self::sidecar(&file), serde_json::to_vec(&meta)?).await?;

        debug!(path, size = meta.size, "blob stored");
        Ok(meta)
    }

    async fn download(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let file = self.resolve(path)?;
        match fs::read(&file).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", file.display())),
        }
    }

    async fn metadata(&self, path: &str) -> anyhow::Result<Option<BlobMeta>> {
        let file = self.resolve(path)?;
        match Self::read_meta(&file).await? {
            Some(meta) => Ok(Some(meta)),
            None => Self::meta_from_fs(path, &file).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());

        let meta = store.upload("user_images/u1.jpg", vec![9, 9], "image/jpeg").await.unwrap();
        assert_eq!(meta.size, 2);
        assert_eq!(store.download("user_images/u1.jpg").await.unwrap(), Some(vec![9, 9]));
        assert_eq!(store.metadata("user_images/u1.jpg").await.unwrap(), Some(meta));
    }

    #[tokio::test]
    async fn missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        assert_eq!(store.download("profile_images/nobody.jpg").await.unwrap(), None);
        assert_eq!(store.metadata("profile_images/nobody.jpg").await.unwrap(), None);
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        assert!(store.upload("../outside.jpg", vec![1], "").await.is_err());
        assert!(store.download("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn overwrite_moves_timestamp_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        let first = store.upload("user_images/u1.jpg", vec![1], "").await.unwrap();
        let second = store.upload("user_images/u1.jpg", vec![2], "").await.unwrap();
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn hand_placed_files_get_derived_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("user_images")).unwrap();
        std::fs::write(dir.path().join("user_images/u7.jpg"), [1, 2, 3]).unwrap();

        let store = FsBlobStore::new(dir.path().to_path_buf());
        let meta = store.metadata("user_images/u7.jpg").await.unwrap().unwrap();
        assert_eq!(meta.size, 3);
        assert_eq!(meta.content_type, "image/jpeg");
    }
}

//! # jb-cache-local
//!
//! Local filesystem implementation of `LocalCache`.
//! Layout under the root directory:
//!
//! - `jokes.json`: the last-known feed as a JSON array
//! - `images/ab/<sha256>.jpg` plus a `.json` sidecar holding the remote timestamp
//! - `kv/<sha256>.json`: small key/value entries such as reaction maps

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jb_core::documents::decode_records;
use jb_core::{CachedImage, Joke, LocalCache, ReactionMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

const JOKES_FILE: &str = "jokes.json";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Kept at full precision: it is compared against `BlobMeta::updated_at`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageStamp {
    updated_at: DateTime<Utc>,
}

pub struct FileCache {
    /// Root directory for all cached state (e.g., "./data/cache")
    root_path: PathBuf,
}

impl FileCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root_path: root }
    }

    fn jokes_path(&self) -> PathBuf {
        self.root_path.join(JOKES_FILE)
    }

    /// Generates a sharded path: "images/ab/ab...hash.jpg"
    fn image_path(&self, key: &str) -> PathBuf {
        let hash = format!("{:x}", Sha256::digest(key.as_bytes()));
        let mut path = self.root_path.join("images");
        path.push(&hash[0..2]);
        path.push(format!("{hash}.jpg"));
        path
    }

    /// Keys are hashed so distinct keys never share a file.
    fn kv_path(&self, key: &str) -> PathBuf {
        let hash = format!("{:x}", Sha256::digest(key.as_bytes()));
        self.root_path.join("kv").join(format!("{hash}.json"))
    }

    fn reactions_key(user_id: &str) -> String {
        format!("reactions_{user_id}")
    }

    /// Reads a file, treating any failure as a miss.
    fn read_or_miss(path: &Path) -> Option<Vec<u8>> {
        match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache miss");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable cache entry");
                None
            }
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
        let bytes = Self::read_or_miss(path)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt cache entry");
                None
            }
        }
    }

    /// Writes through a temp file and rename so readers never see half a file.
    async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        // Unique per write; concurrent stores of the same file must not share one.
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{seq}.tmp"));
        fs::write(&tmp, data)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl LocalCache for FileCache {
    /// Loads the cached feed. Each record is decoded on its own, so a
    /// malformed entry costs only itself.
    fn load_jokes(&self) -> Vec<Joke> {
        let Some(records) = Self::read_json::<Vec<serde_json::Value>>(&self.jokes_path()) else {
            return Vec::new();
        };
        decode_records(records, "joke")
    }

    async fn store_jokes(&self, jokes: &[Joke]) -> anyhow::Result<()> {
        let data = serde_json::to_vec(jokes)?;
        Self::write_atomic(&self.jokes_path(), &data).await
    }

    fn load_reactions(&self, user_id: &str) -> ReactionMap {
        Self::read_json(&self.kv_path(&Self::reactions_key(user_id))).unwrap_or_default()
    }

    async fn store_reactions(&self, user_id: &str, reactions: &ReactionMap) -> anyhow::Result<()> {
        let data = serde_json::to_vec(reactions)?;
        Self::write_atomic(&self.kv_path(&Self::reactions_key(user_id)), &data).await
    }

    fn load_image(&self, key: &str) -> Option<CachedImage> {
        let path = self.image_path(key);
        let stamp: ImageStamp = Self::read_json(&path.with_extension("json"))?;
        let bytes = Self::read_or_miss(&path)?;
        Some(CachedImage {
            bytes,
            updated_at: stamp.updated_at,
        })
    }

    /// The sidecar is written last: an interrupted store reads back as a miss.
    async fn store_image(&self, key: &str, image: &CachedImage) -> anyhow::Result<()> {
        let path = self.image_path(key);
        Self::write_atomic(&path, &image.bytes).await?;
        let stamp = serde_json::to_vec(&ImageStamp {
            updated_at: image.updated_at,
        })?;
        Self::write_atomic(&path.with_extension("json"), &stamp).await
    }
}

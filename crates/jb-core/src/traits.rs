//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the services.
//! Remote adapters return `anyhow::Result`; the gateway in `jb-sync` turns
//! those into `AppError::Remote`.

use async_trait::async_trait;

use crate::documents::{Document, Query};
use crate::models::{BlobMeta, CachedImage, Joke, ReactionMap};

/// Remote document collection contract.
///
/// Collections are slash-separated paths such as `jokes` or
/// `jokes/{joke_id}/punchlines`. Documents are JSON objects.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Ordered, cursor-paginated read of a collection.
    async fn query(&self, query: Query) -> anyhow::Result<Vec<Document>>;

    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>>;

    /// Creates a document and returns its server-assigned id.
    async fn insert(&self, collection: &str, fields: serde_json::Value) -> anyhow::Result<String>;

    /// Shallow upsert: top-level keys in `fields` replace stored ones.
    async fn merge(&self, collection: &str, id: &str, fields: serde_json::Value) -> anyhow::Result<()>;

    /// Atomically adds `delta` to a numeric field. Fails if the document is missing.
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> anyhow::Result<()>;

    /// Deletes one top-level field. Missing documents or fields are not an error.
    async fn remove_field(&self, collection: &str, id: &str, field: &str) -> anyhow::Result<()>;
}

/// Remote object storage contract for user images.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes at `path`, replacing any existing object.
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> anyhow::Result<BlobMeta>;
    /// Returns `None` when nothing is stored at `path`.
    async fn download(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn metadata(&self, path: &str) -> anyhow::Result<Option<BlobMeta>>;
}

/// On-device mirror of the last-known state.
///
/// Loads are synchronous and infallible: anything unreadable is a miss.
/// Stores are async and may fail; callers log and move on.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait LocalCache: Send + Sync {
    fn load_jokes(&self) -> Vec<Joke>;
    async fn store_jokes(&self, jokes: &[Joke]) -> anyhow::Result<()>;

    fn load_reactions(&self, user_id: &str) -> ReactionMap;
    async fn store_reactions(&self, user_id: &str, reactions: &ReactionMap) -> anyhow::Result<()>;

    fn load_image(&self, key: &str) -> Option<CachedImage>;
    async fn store_image(&self, key: &str, image: &CachedImage) -> anyhow::Result<()>;
}

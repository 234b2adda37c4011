//! # integration-tests
//!
//! Shared fixtures: seeded in-memory remotes, a scratch-directory cache,
//! a document store that can hold a query mid-flight and a cache whose
//! writes can be made to stall.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jb_cache_local::FileCache;
use jb_core::documents::{punchlines_of, Document, Query, JOKES};
use jb_core::{BlobStore, CachedImage, DocumentStore, Joke, LocalCache, ReactionMap};
use jb_memory::{MemoryBlobStore, MemoryDocumentStore};
use jb_sync::{ImageService, JokeSyncService, ReactionService, RemoteGateway};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const BASE_MS: i64 = 1_700_000_000_000;

/// Writes `count` jokes, `joke-000` oldest. Every third joke gets one punchline.
pub fn seed_jokes(store: &MemoryDocumentStore, count: usize) {
    for i in 0..count {
        let id = format!("joke-{i:03}");
        let created = BASE_MS + i as i64 * 1_000;
        store.put(
            JOKES,
            &id,
            json!({
                "setup": format!("Setup number {i}"),
                "status": "approved",
                "authorId": format!("author-{}", i % 4),
                "createdAt": created,
                "views": 0,
                "likes": 0,
                "dislikes": 0,
            }),
        );
        if i % 3 == 0 {
            store.put(
                &punchlines_of(&id),
                &format!("pl-{i:03}"),
                json!({
                    "text": format!("Punchline {i}"),
                    "status": "approved",
                    "authorId": "author-9",
                    "createdAt": created + 10,
                    "likes": 0,
                    "dislikes": 0,
                }),
            );
        }
    }
}

/// In-memory remote plus an on-disk cache in a scratch directory.
pub struct Harness {
    pub docs: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub cache: Arc<FileCache>,
    pub gateway: Arc<RemoteGateway>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_docs(Arc::new(MemoryDocumentStore::new()))
    }

    pub fn with_docs(docs: Arc<MemoryDocumentStore>) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let dir = tempfile::tempdir().expect("scratch dir");
        let cache = Arc::new(FileCache::new(dir.path().to_path_buf()));
        let gateway = Arc::new(RemoteGateway::new(
            Arc::clone(&docs) as Arc<dyn DocumentStore>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
        ));
        Self { docs, blobs, cache, gateway, dir }
    }

    pub fn cache(&self) -> Arc<dyn LocalCache> {
        Arc::clone(&self.cache) as Arc<dyn LocalCache>
    }

    pub fn feed(&self, page_size: usize) -> JokeSyncService {
        JokeSyncService::new(Arc::clone(&self.gateway), self.cache(), page_size)
    }

    pub fn images(&self) -> Arc<ImageService> {
        Arc::new(ImageService::new(Arc::clone(&self.gateway), self.cache()))
    }

    pub fn reactions(&self) -> ReactionService {
        ReactionService::new(Arc::clone(&self.gateway), self.cache())
    }

    /// A second cache handle on the same directory, as after an app restart.
    pub fn reopened_cache(&self) -> FileCache {
        FileCache::new(self.dir.path().to_path_buf())
    }
}

/// Wraps the memory store so the next `jokes` query can be held mid-flight.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryDocumentStore,
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedStore {
    /// The next query against `jokes` signals `entered` and waits for `release`.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn query(&self, query: Query) -> anyhow::Result<Vec<Document>> {
        if query.collection == JOKES && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.query(query).await
    }

    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn insert(&self, collection: &str, fields: Value) -> anyhow::Result<String> {
        self.inner.insert(collection, fields).await
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> anyhow::Result<()> {
        self.inner.merge(collection, id, fields).await
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> anyhow::Result<()> {
        self.inner.increment(collection, id, field, delta).await
    }

    async fn remove_field(&self, collection: &str, id: &str, field: &str) -> anyhow::Result<()> {
        self.inner.remove_field(collection, id, field).await
    }
}

/// A file cache whose next `store_jokes` stalls before writing.
pub struct SlowCache {
    pub inner: FileCache,
    armed: AtomicBool,
    delay: Duration,
    pub entered: Notify,
}

impl SlowCache {
    pub fn new(inner: FileCache, delay: Duration) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            delay,
            entered: Notify::new(),
        }
    }

    /// The next `store_jokes` signals `entered`, then sleeps before writing.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalCache for SlowCache {
    fn load_jokes(&self) -> Vec<Joke> {
        self.inner.load_jokes()
    }

    async fn store_jokes(&self, jokes: &[Joke]) -> anyhow::Result<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            tokio::time::sleep(self.delay).await;
        }
        self.inner.store_jokes(jokes).await
    }

    fn load_reactions(&self, user_id: &str) -> ReactionMap {
        self.inner.load_reactions(user_id)
    }

    async fn store_reactions(&self, user_id: &str, reactions: &ReactionMap) -> anyhow::Result<()> {
        self.inner.store_reactions(user_id, reactions).await
    }

    fn load_image(&self, key: &str) -> Option<CachedImage> {
        self.inner.load_image(key)
    }

    async fn store_image(&self, key: &str, image: &CachedImage) -> anyhow::Result<()> {
        self.inner.store_image(key, image).await
    }
}

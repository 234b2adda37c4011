//! # Jokebox Binary
//!
//! Assembles the plugins selected at compile time and runs one sync cycle:
//! publish the cached feed, refresh it from the remote, page to the end,
//! and (given `user_id` in the settings) sync that user's reactions.

use std::sync::Arc;

use jb_cache_local::FileCache;
use jb_configs::{DocumentBackend, LogSettings, Settings};
use jb_core::{BlobStore, DocumentStore, LocalCache};
use jb_sync::{FetchOutcome, ImageService, JokeSyncService, ReactionService, RemoteGateway};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Feature-gated imports
#[cfg(feature = "docs-sqlite")]
use jb_docs_sqlite::SqliteDocumentStore;

#[cfg(feature = "blob-local")]
use jb_blob_local::FsBlobStore;

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn document_store(settings: &Settings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match settings.documents {
        DocumentBackend::Memory => Ok(Arc::new(jb_memory::MemoryDocumentStore::new())),
        #[cfg(feature = "docs-sqlite")]
        DocumentBackend::Sqlite => Ok(Arc::new(SqliteDocumentStore::new(&settings.database_url).await?)),
        #[cfg(not(feature = "docs-sqlite"))]
        DocumentBackend::Sqlite => anyhow::bail!("built without the docs-sqlite feature"),
    }
}

#[cfg(feature = "blob-local")]
fn blob_store(settings: &Settings) -> Arc<dyn BlobStore> {
    Arc::new(FsBlobStore::new(settings.blob_root.clone()))
}

#[cfg(not(feature = "blob-local"))]
fn blob_store(_settings: &Settings) -> Arc<dyn BlobStore> {
    Arc::new(jb_memory::MemoryBlobStore::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = jb_configs::load()?;
    init_tracing(&settings.log);

    // 1. Initialize remote stores and the local cache
    let docs = document_store(&settings).await?;
    let blobs = blob_store(&settings);
    let cache: Arc<dyn LocalCache> = Arc::new(FileCache::new(settings.cache_dir.clone()));

    // 2. Wire services
    let gateway = Arc::new(RemoteGateway::new(docs, blobs));
    let images = Arc::new(ImageService::new(Arc::clone(&gateway), Arc::clone(&cache)));
    let feed = JokeSyncService::new(Arc::clone(&gateway), Arc::clone(&cache), settings.page_size)
        .with_images(images);
    let reactions = ReactionService::new(Arc::clone(&gateway), Arc::clone(&cache));

    // 3. Cached first, then remote
    let cached = feed.load_cached();
    info!(cached, "🃏 Jokebox sync starting");

    let mut outcome = feed.fetch_initial().await;
    while matches!(outcome, FetchOutcome::Replaced { .. } | FetchOutcome::Unchanged { .. } | FetchOutcome::Appended { .. }) {
        outcome = feed.fetch_more().await;
    }
    feed.wait_for_prefetch().await;

    let state = feed.snapshot();
    match &state.last_error {
        Some(err) => warn!(error = %err, jokes = state.jokes.len(), "sync finished with errors"),
        None => info!(jokes = state.jokes.len(), has_more = state.has_more, "sync finished"),
    }

    // 4. Reactions for the configured user
    if let Some(user_id) = &settings.user_id {
        let source = reactions.sign_in(user_id).await;
        let session = reactions.snapshot();
        info!(user = %user_id, ?source, count = session.reactions.len(), "reactions loaded");
    }

    Ok(())
}

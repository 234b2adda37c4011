//! # Joke Synchronization Service
//!
//! Orchestrates load cache → publish → fetch remote page → reconcile → persist,
//! and owns the pagination cursor and in-flight guard.
//!
//! # Developer Note
//! The remote store is the source of truth and the last successful fetch
//! wins. Local mutations are optimistic and never rolled back; their remote
//! halves run as detached tasks whose failures are only logged.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use jb_core::{
    validate_text, AppError, ContentStatus, Joke, LocalCache, Punchline, Reactable, ReactionCounts,
    ReactionKind, Result, MAX_PUNCHLINE_CHARS, MAX_SETUP_CHARS,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::gateway::{ReactionTarget, RemoteGateway};
use crate::images::ImageService;
use crate::state::{FeedState, FetchOutcome, Optimistic};

pub const DEFAULT_PAGE_SIZE: usize = 20;

pub struct JokeSyncService {
    gateway: Arc<RemoteGateway>,
    cache: Arc<dyn LocalCache>,
    images: Option<Arc<ImageService>>,
    page_size: usize,
    state: watch::Sender<FeedState>,
    prefetch: Mutex<Option<JoinHandle<()>>>,
    /// Serializes cache writes; each writer snapshots the state while holding it.
    persist_lock: Mutex<()>,
}

impl JokeSyncService {
    /// A `page_size` of 0 means [`DEFAULT_PAGE_SIZE`].
    pub fn new(gateway: Arc<RemoteGateway>, cache: Arc<dyn LocalCache>, page_size: usize) -> Self {
        let (state, _) = watch::channel(FeedState::default());
        Self {
            gateway,
            cache,
            images: None,
            page_size: if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size },
            state,
            prefetch: Mutex::new(None),
            persist_lock: Mutex::new(()),
        }
    }

    /// Enables author avatar prefetch after the feed changes.
    pub fn with_images(mut self, images: Arc<ImageService>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Publishes whatever the device cached last time. Never fails.
    pub fn load_cached(&self) -> usize {
        let mut jokes = self.cache.load_jokes();
        jokes.iter_mut().for_each(Joke::clamp_counts);
        let count = jokes.len();
        self.state.send_modify(|s| s.jokes = jokes);
        info!(count, "loaded jokes from cache");
        count
    }

    /// Fetches the newest page and replaces the feed if it differs.
    #[instrument(skip(self))]
    pub async fn fetch_initial(&self) -> FetchOutcome {
        self.state.send_modify(|s| s.is_loading = true);

        let page = match self.gateway.fetch_jokes(None, self.page_size).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "initial joke fetch failed, keeping current feed");
                self.record_failure(err, false);
                return FetchOutcome::Failed;
            }
        };

        let has_more = page.raw_count >= self.page_size;
        let mut replaced = None;
        let mut total = 0;
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.last_error = None;
            s.cursor = page.cursor;
            s.has_more = has_more;
            s.generation += 1;
            if s.jokes != page.jokes {
                s.jokes = page.jokes;
                replaced = Some(s.jokes.clone());
            }
            total = s.jokes.len();
        });

        let Some(jokes) = replaced else {
            debug!(total, "remote feed unchanged");
            return FetchOutcome::Unchanged { total };
        };

        self.persist().await;
        self.start_prefetch(&jokes).await;
        info!(total, has_more, "feed replaced from remote");
        FetchOutcome::Replaced { total }
    }

    /// Appends the next page. A no-op while another page is loading, once the
    /// feed is exhausted, or before the first successful `fetch_initial`.
    #[instrument(skip(self))]
    pub async fn fetch_more(&self) -> FetchOutcome {
        let mut claim = None;
        self.state.send_if_modified(|s| {
            if s.is_loading_more || !s.has_more || s.cursor.is_none() {
                return false;
            }
            s.is_loading_more = true;
            claim = Some((s.cursor.clone(), s.generation));
            true
        });
        let Some((cursor, generation)) = claim else {
            debug!("fetch_more skipped");
            return FetchOutcome::Skipped;
        };

        let page = match self.gateway.fetch_jokes(cursor, self.page_size).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "next joke page failed");
                self.record_failure(err, true);
                return FetchOutcome::Failed;
            }
        };

        let has_more = page.raw_count >= self.page_size;
        let mut merged = None;
        let mut added = 0;
        self.state.send_modify(|s| {
            s.is_loading_more = false;
            if s.generation != generation {
                return;
            }
            let known: HashSet<&str> = s.jokes.iter().map(|j| j.id.as_str()).collect();
            let fresh: Vec<Joke> = page
                .jokes
                .into_iter()
                .filter(|j| !known.contains(j.id.as_str()))
                .collect();
            added = fresh.len();
            s.jokes.extend(fresh);
            if page.cursor.is_some() {
                s.cursor = page.cursor;
            }
            s.has_more = has_more;
            s.last_error = None;
            merged = Some(s.jokes.len());
        });

        let Some(total) = merged else {
            debug!(generation, "dropping page from superseded feed");
            return FetchOutcome::Stale;
        };

        self.persist().await;
        debug!(added, total, has_more, "appended joke page");
        FetchOutcome::Appended { added, total }
    }

    /// Flips like/dislike on the joke or punchline with `id`.
    ///
    /// The new pair is published and cached before this returns; the remote
    /// increments run in the returned task.
    pub async fn toggle_reaction(&self, id: &str, kind: ReactionKind) -> Result<Optimistic<ReactionCounts>> {
        let mut change = None;
        self.state.send_if_modified(|s| {
            for joke in s.jokes.iter_mut() {
                if joke.id == id {
                    let (before, after) = joke.toggle(kind);
                    let target = ReactionTarget::Joke { joke_id: joke.id.clone() };
                    change = Some((target, before, after));
                    return true;
                }
                let joke_id = joke.id.clone();
                if let Some(punchline) = joke.punchline_mut(id) {
                    let (before, after) = punchline.toggle(kind);
                    let target = ReactionTarget::Punchline {
                        joke_id,
                        punchline_id: punchline.id.clone(),
                    };
                    change = Some((target, before, after));
                    return true;
                }
            }
            false
        });
        let Some((target, before, after)) = change else {
            return Err(AppError::not_found("Joke or punchline", id));
        };

        self.persist().await;

        let gateway = Arc::clone(&self.gateway);
        let delta = before.delta_to(after);
        let remote = tokio::spawn(async move {
            if let Err(err) = gateway.apply_reaction_delta(&target, delta).await {
                warn!(error = %err, target = target.id(), "remote reaction update failed");
            }
        });
        Ok(Optimistic { value: after, remote })
    }

    /// Counts a view locally and mirrors the increment remotely.
    pub async fn record_view(&self, joke_id: &str) -> Result<Optimistic<u64>> {
        let mut views = None;
        self.state.send_if_modified(|s| match s.jokes.iter_mut().find(|j| j.id == joke_id) {
            Some(joke) => {
                joke.views += 1;
                views = Some(joke.views);
                true
            }
            None => false,
        });
        let views = views.ok_or_else(|| AppError::not_found("Joke", joke_id))?;

        self.persist().await;

        let gateway = Arc::clone(&self.gateway);
        let id = joke_id.to_string();
        let remote = tokio::spawn(async move {
            if let Err(err) = gateway.increment_views(&id).await {
                warn!(error = %err, joke = %id, "remote view increment failed");
            }
        });
        Ok(Optimistic { value: views, remote })
    }

    /// Creates a pending joke remotely and puts it at the top of the feed.
    pub async fn submit_joke(&self, author_id: &str, setup: &str) -> Result<Joke> {
        let setup = validate_text("setup", setup, MAX_SETUP_CHARS)?;
        let joke = self.gateway.create_joke(author_id, &setup, Utc::now()).await?;

        self.state.send_modify(|s| s.jokes.insert(0, joke.clone()));
        self.persist().await;
        info!(joke = %joke.id, author = author_id, "joke submitted");
        Ok(joke)
    }

    /// Creates a pending punchline under `joke_id` and attaches it locally.
    pub async fn add_punchline(&self, author_id: &str, joke_id: &str, text: &str) -> Result<Punchline> {
        let text = validate_text("punchline", text, MAX_PUNCHLINE_CHARS)?;
        let punchline = self
            .gateway
            .create_punchline(joke_id, author_id, &text, Utc::now())
            .await?;

        let attached = self.state.send_if_modified(|s| match s.jokes.iter_mut().find(|j| j.id == joke_id) {
            Some(joke) => {
                joke.punchlines.push(punchline.clone());
                true
            }
            None => false,
        });
        if attached {
            self.persist().await;
        }
        Ok(punchline)
    }

    /// Moderation: writes the status remotely, then locally.
    pub async fn set_status(&self, joke_id: &str, status: ContentStatus) -> Result<()> {
        self.gateway.set_joke_status(joke_id, status).await?;

        let changed = self.state.send_if_modified(|s| match s.jokes.iter_mut().find(|j| j.id == joke_id) {
            Some(joke) if joke.status != status => {
                joke.status = status;
                true
            }
            _ => false,
        });
        if changed {
            self.persist().await;
        }
        Ok(())
    }

    /// Waits for the avatar prefetch started by the last feed replacement.
    pub async fn wait_for_prefetch(&self) {
        let handle = self.prefetch.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "image prefetch task failed");
            }
        }
    }

    fn record_failure(&self, err: AppError, paging: bool) {
        self.state.send_modify(|s| {
            if paging {
                s.is_loading_more = false;
            } else {
                s.is_loading = false;
            }
            s.last_error = Some(err.to_string());
        });
    }

    /// Writes the current feed. The snapshot is taken under the lock, so the
    /// last write to finish always carries the newest list.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let jokes = self.state.borrow().jokes.clone();
        if let Err(err) = self.cache.store_jokes(&jokes).await {
            warn!(error = %err, "failed to persist joke cache");
        }
    }

    async fn start_prefetch(&self, jokes: &[Joke]) {
        let Some(images) = &self.images else {
            return;
        };
        let mut seen = HashSet::new();
        let authors: Vec<String> = jokes
            .iter()
            .map(|j| j.author_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let images = Arc::clone(images);
        let handle = tokio::spawn(async move {
            images.prefetch_user_images(&authors).await;
        });
        *self.prefetch.lock().await = Some(handle);
    }
}

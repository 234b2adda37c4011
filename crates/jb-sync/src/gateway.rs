//! # Remote Data Gateway
//!
//! Thin wrapper that knows the remote collection layout and turns domain
//! requests into `DocumentStore` / `BlobStore` calls. Adapter errors become
//! `AppError::Remote`; malformed documents are skipped, never fatal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jb_core::documents::{
    self, decode_all, decode_joke, decode_punchline, decode_reactions, decode_user, punchlines_of,
    Cursor, Direction, Query, CREATED_AT, JOKES, USERS, USER_REACTIONS,
};
use jb_core::{
    AppError, BlobMeta, BlobStore, ContentStatus, DocumentStore, Joke, Punchline, ReactionKind,
    ReactionMap, Result, User,
};
use serde_json::{json, Value};
use tracing::{debug, instrument};

/// One page of the joke feed.
#[derive(Debug, Clone, PartialEq)]
pub struct JokePage {
    pub jokes: Vec<Joke>,
    /// Position after the last document returned, malformed ones included.
    pub cursor: Option<Cursor>,
    /// Documents the store returned before decoding.
    pub raw_count: usize,
}

/// Where a like/dislike lands remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionTarget {
    Joke { joke_id: String },
    Punchline { joke_id: String, punchline_id: String },
}

impl ReactionTarget {
    pub fn collection(&self) -> String {
        match self {
            Self::Joke { .. } => JOKES.to_string(),
            Self::Punchline { joke_id, .. } => punchlines_of(joke_id),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Joke { joke_id } => joke_id,
            Self::Punchline { punchline_id, .. } => punchline_id,
        }
    }
}

fn remote(err: anyhow::Error) -> AppError {
    AppError::Remote(err)
}

pub struct RemoteGateway {
    docs: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

impl RemoteGateway {
    pub fn new(docs: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { docs, blobs }
    }

    /// Newest-first page of jokes with their punchlines attached.
    #[instrument(skip(self, after), fields(has_cursor = after.is_some()))]
    pub async fn fetch_jokes(&self, after: Option<Cursor>, limit: usize) -> Result<JokePage> {
        let query = Query::new(JOKES, CREATED_AT, Direction::Descending)
            .start_after(after)
            .limit(limit);
        let docs = self.docs.query(query).await.map_err(remote)?;
        let cursor = docs.last().map(|doc| doc.cursor(CREATED_AT));

        let mut jokes = decode_all(&docs, decode_joke);
        for joke in &mut jokes {
            joke.punchlines = self.fetch_punchlines(&joke.id).await?;
        }
        debug!(returned = docs.len(), decoded = jokes.len(), "fetched joke page");

        Ok(JokePage {
            jokes,
            cursor,
            raw_count: docs.len(),
        })
    }

    /// Oldest-first punchlines of one joke.
    pub async fn fetch_punchlines(&self, joke_id: &str) -> Result<Vec<Punchline>> {
        let query = Query::new(punchlines_of(joke_id), CREATED_AT, Direction::Ascending);
        let docs = self.docs.query(query).await.map_err(remote)?;
        Ok(decode_all(&docs, |doc| decode_punchline(joke_id, doc)))
    }

    pub async fn create_joke(&self, author_id: &str, setup: &str, now: DateTime<Utc>) -> Result<Joke> {
        let fields = documents::new_joke_fields(author_id, setup, now);
        let id = self.docs.insert(JOKES, fields.clone()).await.map_err(remote)?;
        decode_joke(&documents::Document::new(id, fields))
    }

    pub async fn create_punchline(
        &self,
        joke_id: &str,
        author_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Punchline> {
        let fields = documents::new_punchline_fields(author_id, text, now);
        let id = self
            .docs
            .insert(&punchlines_of(joke_id), fields.clone())
            .await
            .map_err(remote)?;
        decode_punchline(joke_id, &documents::Document::new(id, fields))
    }

    /// Applies `(likes, dislikes)` deltas as atomic increments. Zero deltas are skipped.
    pub async fn apply_reaction_delta(&self, target: &ReactionTarget, delta: (i64, i64)) -> Result<()> {
        let collection = target.collection();
        for (field, amount) in [("likes", delta.0), ("dislikes", delta.1)] {
            if amount != 0 {
                self.docs
                    .increment(&collection, target.id(), field, amount)
                    .await
                    .map_err(remote)?;
            }
        }
        Ok(())
    }

    pub async fn increment_views(&self, joke_id: &str) -> Result<()> {
        self.docs.increment(JOKES, joke_id, "views", 1).await.map_err(remote)
    }

    pub async fn set_joke_status(&self, joke_id: &str, status: ContentStatus) -> Result<()> {
        self.docs
            .merge(JOKES, joke_id, json!({ "status": status.as_str() }))
            .await
            .map_err(remote)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        match self.docs.get(USERS, user_id).await.map_err(remote)? {
            Some(doc) => decode_user(&doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn create_user(&self, user_id: &str, email: &str, now: DateTime<Utc>) -> Result<User> {
        let fields = documents::new_user_fields(email, now);
        self.docs.merge(USERS, user_id, fields.clone()).await.map_err(remote)?;
        decode_user(&documents::Document::new(user_id, fields))
    }

    pub async fn merge_user(&self, user_id: &str, fields: Value) -> Result<()> {
        self.docs.merge(USERS, user_id, fields).await.map_err(remote)
    }

    /// The user's reaction map; a user who never reacted has an empty one.
    pub async fn load_reactions(&self, user_id: &str) -> Result<ReactionMap> {
        let doc = self.docs.get(USER_REACTIONS, user_id).await.map_err(remote)?;
        Ok(doc.map(|doc| decode_reactions(&doc)).unwrap_or_default())
    }

    /// Sets or, with `None`, clears one punchline's reaction.
    pub async fn set_reaction(
        &self,
        user_id: &str,
        punchline_id: &str,
        reaction: Option<ReactionKind>,
    ) -> Result<()> {
        let result = match reaction {
            Some(kind) => {
                let mut fields = serde_json::Map::new();
                fields.insert(punchline_id.to_string(), Value::from(kind.as_str()));
                self.docs.merge(USER_REACTIONS, user_id, Value::Object(fields)).await
            }
            None => self.docs.remove_field(USER_REACTIONS, user_id, punchline_id).await,
        };
        result.map_err(remote)
    }

    pub async fn upload_blob(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<BlobMeta> {
        self.blobs.upload(path, data, content_type).await.map_err(remote)
    }

    pub async fn download_blob(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.blobs.download(path).await.map_err(remote)
    }

    pub async fn blob_metadata(&self, path: &str) -> Result<Option<BlobMeta>> {
        self.blobs.metadata(path).await.map_err(remote)
    }
}

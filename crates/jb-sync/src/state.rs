//! # Published State
//!
//! Snapshots handed to the presentation layer. Services own a
//! `tokio::sync::watch` sender; consumers either `subscribe()` for change
//! notifications or poll `snapshot()`.

use jb_core::documents::Cursor;
use jb_core::{Joke, ReactionMap};
use tokio::task::JoinHandle;

/// Everything the joke feed screen needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState {
    pub jokes: Vec<Joke>,
    /// False once a page came back short.
    pub has_more: bool,
    pub is_loading: bool,
    /// Pagination in-flight guard.
    pub is_loading_more: bool,
    /// Message of the last failed remote call, cleared by the next success.
    pub last_error: Option<String>,
    pub cursor: Option<Cursor>,
    /// Bumped on every applied `fetch_initial`; older pagination results are dropped.
    pub generation: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            jokes: Vec::new(),
            has_more: true,
            is_loading: false,
            is_loading_more: false,
            last_error: None,
            cursor: None,
            generation: 0,
        }
    }
}

/// What a fetch did to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Remote list equals the local one; nothing was written.
    Unchanged { total: usize },
    /// Remote list replaced the local one and was cached.
    Replaced { total: usize },
    Appended { added: usize, total: usize },
    /// Guard not satisfied: already loading, no more pages, or no cursor yet.
    Skipped,
    /// A newer `fetch_initial` landed while this page was in flight.
    Stale,
    /// Remote call failed; see `FeedState::last_error`.
    Failed,
}

/// The signed-in user's reactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionSession {
    pub user_id: Option<String>,
    pub reactions: ReactionMap,
}

/// Result of an optimistic mutation: the value already applied locally and
/// the background task mirroring it remotely. Dropping `remote` detaches it.
#[derive(Debug)]
pub struct Optimistic<T> {
    pub value: T,
    pub remote: JoinHandle<()>,
}

//! # Domain Models
//!
//! These structs represent the core entities of Jokebox.
//! Identifiers are assigned by the remote document store and never change
//! once assigned; they are the only key used to reconcile cache and remote.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Moderation state of a joke or punchline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Pending,
    /// Older documents were written with `active` before moderation existed.
    #[serde(alias = "active")]
    Approved,
    Rejected,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A single like or dislike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

/// The current user's reactions keyed by punchline id.
pub type ReactionMap = BTreeMap<String, ReactionKind>;

/// The `(likes, dislikes)` pair carried by jokes and punchlines.
///
/// Each side is either 0 or 1 and at most one side is set. This is one
/// reaction per item, not a per-user counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub likes: u32,
    pub dislikes: u32,
}

impl ReactionCounts {
    pub const NONE: Self = Self { likes: 0, dislikes: 0 };
    pub const LIKED: Self = Self { likes: 1, dislikes: 0 };
    pub const DISLIKED: Self = Self { likes: 0, dislikes: 1 };

    /// Clamps arbitrary stored values into the allowed pairs.
    /// Any positive value counts as 1; when both are set the like wins.
    pub fn clamped(likes: u32, dislikes: u32) -> Self {
        match (likes > 0, dislikes > 0) {
            (true, _) => Self::LIKED,
            (false, true) => Self::DISLIKED,
            (false, false) => Self::NONE,
        }
    }

    /// Flips `kind`: setting one side clears the other, setting an
    /// already-set side clears it.
    pub fn toggled(self, kind: ReactionKind) -> Self {
        match kind {
            ReactionKind::Like if self.likes == 1 => Self::NONE,
            ReactionKind::Like => Self::LIKED,
            ReactionKind::Dislike if self.dislikes == 1 => Self::NONE,
            ReactionKind::Dislike => Self::DISLIKED,
        }
    }

    /// Per-field increments that turn `self` into `next`.
    pub fn delta_to(self, next: Self) -> (i64, i64) {
        (
            i64::from(next.likes) - i64::from(self.likes),
            i64::from(next.dislikes) - i64::from(self.dislikes),
        )
    }
}

/// An answer attached to a joke. Lives remotely in `jokes/{joke_id}/punchlines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Punchline {
    pub id: String,
    /// Back-reference to the owning joke.
    pub joke_id: String,
    pub text: String,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub dislikes: u32,
    #[serde(default)]
    pub status: ContentStatus,
    pub author_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// The fundamental unit of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Joke {
    pub id: String,
    pub setup: String,
    #[serde(default)]
    pub punchlines: Vec<Punchline>,
    #[serde(default)]
    pub status: ContentStatus,
    pub author_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub dislikes: u32,
}

impl Joke {
    pub fn punchline_mut(&mut self, id: &str) -> Option<&mut Punchline> {
        self.punchlines.iter_mut().find(|p| p.id == id)
    }

    /// Forces this joke's and its punchlines' pairs into the allowed set.
    pub fn clamp_counts(&mut self) {
        self.set_counts(self.counts());
        for punchline in &mut self.punchlines {
            punchline.set_counts(punchline.counts());
        }
    }
}

/// A registered user. `id` equals the auth subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "favouriteJokesIDs")]
    pub favourite_joke_ids: Vec<String>,
}

/// Anything carrying a `(likes, dislikes)` pair.
pub trait Reactable {
    fn counts(&self) -> ReactionCounts;
    fn set_counts(&mut self, counts: ReactionCounts);

    /// Applies a toggle and returns `(before, after)`.
    fn toggle(&mut self, kind: ReactionKind) -> (ReactionCounts, ReactionCounts) {
        let before = self.counts();
        let after = before.toggled(kind);
        self.set_counts(after);
        (before, after)
    }
}

impl Reactable for Joke {
    fn counts(&self) -> ReactionCounts {
        ReactionCounts::clamped(self.likes, self.dislikes)
    }

    fn set_counts(&mut self, counts: ReactionCounts) {
        self.likes = counts.likes;
        self.dislikes = counts.dislikes;
    }
}

impl Reactable for Punchline {
    fn counts(&self) -> ReactionCounts {
        ReactionCounts::clamped(self.likes, self.dislikes)
    }

    fn set_counts(&mut self, counts: ReactionCounts) {
        self.likes = counts.likes;
        self.dislikes = counts.dislikes;
    }
}

/// Metadata for an object in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub updated_at: DateTime<Utc>,
}

/// An image held in the local cache, stamped with the remote `updated_at`
/// it was downloaded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub bytes: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Blob path of the small avatar shown next to a user's content.
pub fn user_image_path(user_id: &str) -> String {
    format!("user_images/{user_id}.jpg")
}

/// Blob path of the full-size profile photo.
pub fn profile_image_path(user_id: &str) -> String {
    format!("profile_images/{user_id}.jpg")
}

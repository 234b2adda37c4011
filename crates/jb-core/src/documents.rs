//! # Documents
//!
//! The remote store speaks schemaless JSON documents. This module holds the
//! query vocabulary shared by all `DocumentStore` adapters and the mapping
//! between documents and domain models.
//!
//! # Developer Note
//! Decoding is strict per document and lenient per batch: one malformed
//! document is reported and skipped, it never poisons the page it came in.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{AppError, Result};
use crate::models::{ContentStatus, Joke, Punchline, ReactionCounts, ReactionKind, ReactionMap, User};

pub const JOKES: &str = "jokes";
pub const USERS: &str = "users";
pub const USER_REACTIONS: &str = "user_reactions";
pub const CREATED_AT: &str = "createdAt";

/// Subcollection holding the punchlines of one joke.
pub fn punchlines_of(joke_id: &str) -> String {
    format!("{JOKES}/{joke_id}/punchlines")
}

/// A stored document: its id plus a JSON object of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self { id: id.into(), fields }
    }

    /// Position of this document in a query ordered by `order_by`.
    pub fn cursor(&self, order_by: &str) -> Cursor {
        Cursor {
            value: self.fields.get(order_by).cloned().unwrap_or(Value::Null),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// "Start after" marker: the ordered field's value and the id that breaks ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub value: Value,
    pub id: String,
}

/// An ordered read of one collection. Ties on `order_by` are broken by id
/// in the same direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub order_by: String,
    pub direction: Direction,
    pub start_after: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>, order_by: &str, direction: Direction) -> Self {
        Self {
            collection: collection.into(),
            order_by: order_by.to_string(),
            direction,
            start_after: None,
            limit: None,
        }
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Orders two documents the way this query returns them.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ord = compare_json(
            a.fields.get(&self.order_by).unwrap_or(&Value::Null),
            b.fields.get(&self.order_by).unwrap_or(&Value::Null),
        )
        .then_with(|| a.id.cmp(&b.id));
        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }

    /// True when `doc` sorts strictly after the cursor.
    pub fn is_after_cursor(&self, doc: &Document) -> bool {
        match &self.start_after {
            None => true,
            Some(cursor) => {
                let mut fields = serde_json::Map::new();
                fields.insert(self.order_by.clone(), cursor.value.clone());
                let marker = Document::new(cursor.id.clone(), Value::Object(fields));
                self.compare(doc, &marker) == Ordering::Greater
            }
        }
    }
}

/// Total order over JSON scalars: null < bool < number < string < other.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&y.as_f64().unwrap_or_default()),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JokeFields {
    setup: String,
    #[serde(default)]
    status: ContentStatus,
    author_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    views: i64,
    #[serde(default)]
    likes: i64,
    #[serde(default)]
    dislikes: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PunchlineFields {
    text: String,
    #[serde(default)]
    status: ContentStatus,
    author_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    likes: i64,
    #[serde(default)]
    dislikes: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserFields {
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(default, rename = "favouriteJokesIDs")]
    favourite_joke_ids: Vec<String>,
}

fn non_negative(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

fn fields_of<T: DeserializeOwned>(doc: &Document) -> Result<T> {
    T::deserialize(&doc.fields).map_err(|err| AppError::decode(&doc.id, err))
}

/// Decodes a joke document. Punchlines live in a subcollection and are
/// attached by the caller.
pub fn decode_joke(doc: &Document) -> Result<Joke> {
    let f: JokeFields = fields_of(doc)?;
    let counts = ReactionCounts::clamped(non_negative(f.likes), non_negative(f.dislikes));
    Ok(Joke {
        id: doc.id.clone(),
        setup: f.setup,
        punchlines: Vec::new(),
        status: f.status,
        author_id: f.author_id,
        created_at: f.created_at,
        views: u64::try_from(f.views.max(0)).unwrap_or_default(),
        likes: counts.likes,
        dislikes: counts.dislikes,
    })
}

pub fn decode_punchline(joke_id: &str, doc: &Document) -> Result<Punchline> {
    let f: PunchlineFields = fields_of(doc)?;
    let counts = ReactionCounts::clamped(non_negative(f.likes), non_negative(f.dislikes));
    Ok(Punchline {
        id: doc.id.clone(),
        joke_id: joke_id.to_string(),
        text: f.text,
        likes: counts.likes,
        dislikes: counts.dislikes,
        status: f.status,
        author_id: f.author_id,
        created_at: f.created_at,
    })
}

pub fn decode_user(doc: &Document) -> Result<User> {
    let f: UserFields = fields_of(doc)?;
    Ok(User {
        id: doc.id.clone(),
        email: f.email,
        name: f.name,
        username: f.username,
        created_at: f.created_at,
        favourite_joke_ids: f.favourite_joke_ids,
    })
}

/// Reads a `user_reactions` document. Unknown reaction strings are dropped.
pub fn decode_reactions(doc: &Document) -> ReactionMap {
    let Some(fields) = doc.fields.as_object() else {
        warn!(id = %doc.id, "reaction document is not an object");
        return ReactionMap::new();
    };
    fields
        .iter()
        .filter_map(|(punchline_id, value)| {
            match serde_json::from_value::<ReactionKind>(value.clone()) {
                Ok(kind) => Some((punchline_id.clone(), kind)),
                Err(_) => {
                    warn!(user = %doc.id, punchline = %punchline_id, "skipping unknown reaction");
                    None
                }
            }
        })
        .collect()
}

/// Decodes every document, logging and skipping the malformed ones.
pub fn decode_all<T>(docs: &[Document], decode: impl Fn(&Document) -> Result<T>) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(doc) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(error = %err, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// Deserializes each JSON record on its own so one bad entry only costs itself.
pub fn decode_records<T: DeserializeOwned>(records: Vec<Value>, kind: &str) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(index, kind, error = %err, "skipping malformed cache record");
                None
            }
        })
        .collect()
}

pub fn new_joke_fields(author_id: &str, setup: &str, created_at: DateTime<Utc>) -> Value {
    json!({
        "setup": setup,
        "status": ContentStatus::Pending.as_str(),
        "authorId": author_id,
        "createdAt": created_at.timestamp_millis(),
        "views": 0,
        "likes": 0,
        "dislikes": 0,
    })
}

pub fn new_punchline_fields(author_id: &str, text: &str, created_at: DateTime<Utc>) -> Value {
    json!({
        "text": text,
        "status": ContentStatus::Pending.as_str(),
        "authorId": author_id,
        "createdAt": created_at.timestamp_millis(),
        "likes": 0,
        "dislikes": 0,
    })
}

pub fn new_user_fields(email: &str, created_at: DateTime<Utc>) -> Value {
    json!({
        "email": email,
        "createdAt": created_at.timestamp_millis(),
        "favouriteJokesIDs": [],
    })
}

//! # jb-memory
//!
//! In-process implementations of `DocumentStore` and `BlobStore`.
//! Used by tests and by the binary when no real backend is configured.

use std::collections::HashMap;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use jb_core::documents::{Document, Query};
use jb_core::{BlobMeta, BlobStore, DocumentStore};
use serde_json::Value;
use uuid::Uuid;

fn as_object(fields: Value) -> anyhow::Result<serde_json::Map<String, Value>> {
    match fields {
        Value::Object(map) => Ok(map),
        other => bail!("document fields must be an object, got {other}"),
    }
}

/// Collections keyed by path, documents keyed by id.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, HashMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document with a caller-chosen id, replacing any existing one.
    pub fn put(&self, collection: &str, id: &str, fields: Value) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    pub fn field(&self, collection: &str, id: &str, field: &str) -> Option<Value> {
        self.collections
            .get(collection)?
            .get(id)?
            .get(field)
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(&self, query: Query) -> anyhow::Result<Vec<Document>> {
        let mut docs: Vec<Document> = match self.collections.get(&query.collection) {
            Some(collection) => collection
                .iter()
                .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                .filter(|doc| query.is_after_cursor(doc))
                .collect(),
            None => Vec::new(),
        };
        docs.sort_by(|a, b| query.compare(a, b));
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).cloned())
            .map(|fields| Document::new(id, fields)))
    }

    async fn insert(&self, collection: &str, fields: Value) -> anyhow::Result<String> {
        let fields = Value::Object(as_object(fields)?);
        let id = Uuid::new_v4().simple().to_string();
        self.put(collection, &id, fields);
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> anyhow::Result<()> {
        let patch = as_object(fields)?;
        let mut collection = self.collections.entry(collection.to_string()).or_default();
        let doc = collection
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let target = doc
            .as_object_mut()
            .ok_or_else(|| anyhow!("stored document {id} is not an object"))?;
        target.extend(patch);
        Ok(())
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> anyhow::Result<()> {
        let mut docs = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("no document {collection}/{id}"))?;
        let doc = docs
            .get_mut(id)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("no document {collection}/{id}"))?;
        let current = match doc.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| anyhow!("{collection}/{id}.{field} is not an integer"))?,
        };
        doc.insert(field.to_string(), Value::from(current + delta));
        Ok(())
    }

    async fn remove_field(&self, collection: &str, id: &str, field: &str) -> anyhow::Result<()> {
        if let Some(mut docs) = self.collections.get_mut(collection) {
            if let Some(doc) = docs.get_mut(id).and_then(Value::as_object_mut) {
                doc.remove(field);
            }
        }
        Ok(())
    }
}

/// Blobs keyed by path.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (Vec<u8>, BlobMeta)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> anyhow::Result<BlobMeta> {
        let content_type = if content_type.is_empty() {
            mime_guess::from_path(path).first_or_octet_stream().to_string()
        } else {
            content_type.to_string()
        };
        // Keep updated_at strictly increasing per path so freshness checks see every overwrite.
        let mut updated_at = Utc::now();
        if let Some(existing) = self.blobs.get(path) {
            if updated_at <= existing.1.updated_at {
                updated_at = existing.1.updated_at + Duration::milliseconds(1);
            }
        }
        let meta = BlobMeta {
            path: path.to_string(),
            size: data.len() as u64,
            content_type,
            updated_at,
        };
        self.blobs.insert(path.to_string(), (data, meta.clone()));
        Ok(meta)
    }

    async fn download(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(path).map(|entry| entry.0.clone()))
    }

    async fn metadata(&self, path: &str) -> anyhow::Result<Option<BlobMeta>> {
        Ok(self.blobs.get(path).map(|entry| entry.1.clone()))
    }
}

//! # jb-docs-sqlite Implementation
//!
//! Implements `DocumentStore` on a single SQLite table. Each row holds one
//! document's fields as JSON text; ordering and field updates go through
//! SQLite's JSON functions.

use std::str::FromStr;

use anyhow::{bail, Context};
use async_trait::async_trait;
use jb_core::documents::{Direction, Document, Query};
use jb_core::DocumentStore;
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    fields     TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)";

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Opens (creating if needed) the database at `url` and ensures the schema.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url {url}"))?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database; pin exactly one.
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        sqlx::query(SCHEMA).execute(&pool).await?;
        info!(url, "sqlite document store ready");
        Ok(Self { pool })
    }
}

/// JSON path addressing one top-level key.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn bind_json<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn as_object(fields: Value) -> anyhow::Result<Map<String, Value>> {
    match fields {
        Value::Object(map) => Ok(map),
        other => bail!("document fields must be an object, got {other}"),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn query(&self, query: Query) -> anyhow::Result<Vec<Document>> {
        let path = json_path(&query.order_by);
        let (order, op) = match query.direction {
            Direction::Ascending => ("ASC", ">"),
            Direction::Descending => ("DESC", "<"),
        };

        let mut sql = String::from("SELECT id, fields FROM documents WHERE collection = ?");
        if query.start_after.is_some() {
            sql.push_str(&format!(
                " AND (json_extract(fields, ?) {op} ? OR (json_extract(fields, ?) = ? AND id {op} ?))"
            ));
        }
        sql.push_str(&format!(" ORDER BY json_extract(fields, ?) {order}, id {order} LIMIT ?"));

        let mut q = sqlx::query(&sql).bind(query.collection.clone());
        if let Some(cursor) = &query.start_after {
            q = bind_json(q.bind(path.clone()), &cursor.value);
            q = bind_json(q.bind(path.clone()), &cursor.value);
            q = q.bind(cursor.id.clone());
        }
        let limit = query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        q = q.bind(path).bind(limit);

        let rows = q.fetch_all(&self.pool).await?;
        let docs = rows
            .into_iter()
            .map(|row| -> anyhow::Result<Document> {
                let id: String = row.try_get("id")?;
                let fields: String = row.try_get("fields")?;
                Ok(Document::new(id, serde_json::from_str(&fields)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        debug!(collection = %query.collection, count = docs.len(), "query");
        Ok(docs)
    }

    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>> {
        let row = sqlx::query("SELECT fields FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let fields: String = row.try_get("fields")?;
                Ok(Some(Document::new(id, serde_json::from_str(&fields)?)))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: &str, fields: Value) -> anyhow::Result<String> {
        let fields = Value::Object(as_object(fields)?);
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, fields) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(id.as_str())
            .bind(fields.to_string())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Read-merge-write inside a transaction so concurrent merges don't lose keys.
    async fn merge(&self, collection: &str, id: &str, fields: Value) -> anyhow::Result<()> {
        let patch = as_object(fields)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT fields FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let mut merged = match existing {
            Some(text) => as_object(serde_json::from_str(&text)?)?,
            None => Map::new(),
        };
        merged.extend(patch);

        sqlx::query(
            "INSERT INTO documents (collection, id, fields) VALUES (?, ?, ?)
             ON CONFLICT (collection, id) DO UPDATE SET fields = excluded.fields",
        )
        .bind(collection)
        .bind(id)
        .bind(Value::Object(merged).to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> anyhow::Result<()> {
        let path = json_path(field);
        let result = sqlx::query(
            "UPDATE documents
             SET fields = json_set(fields, ?, COALESCE(json_extract(fields, ?), 0) + ?)
             WHERE collection = ? AND id = ?",
        )
        .bind(path.as_str())
        .bind(path.as_str())
        .bind(delta)
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("no document {collection}/{id}");
        }
        Ok(())
    }

    async fn remove_field(&self, collection: &str, id: &str, field: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE documents SET fields = json_remove(fields, ?) WHERE collection = ? AND id = ?")
            .bind(json_path(field))
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jb_core::documents::CREATED_AT;
    use serde_json::json;

    async fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn paginates_by_created_at_descending() {
        let store = store().await;
        for i in 0..5 {
            let id = store.insert("jokes", json!({ "createdAt": 1_000 + i })).await.unwrap();
            assert_eq!(id.len(), 32);
        }

        let query = Query::new("jokes", CREATED_AT, Direction::Descending).limit(3);
        let first = store.query(query.clone()).await.unwrap();
        let stamps: Vec<_> = first.iter().map(|d| d.fields["createdAt"].as_i64().unwrap()).collect();
        assert_eq!(stamps, [1_004, 1_003, 1_002]);

        let rest = store
            .query(query.start_after(first.last().map(|d| d.cursor(CREATED_AT))))
            .await
            .unwrap();
        let stamps: Vec<_> = rest.iter().map(|d| d.fields["createdAt"].as_i64().unwrap()).collect();
        assert_eq!(stamps, [1_001, 1_000]);
    }

    #[tokio::test]
    async fn ties_are_broken_by_id() {
        let store = store().await;
        for id in ["b", "a", "c"] {
            store.merge("jokes/j1/punchlines", id, json!({ "createdAt": 7 })).await.unwrap();
        }
        let query = Query::new("jokes/j1/punchlines", CREATED_AT, Direction::Ascending).limit(2);
        let first = store.query(query.clone()).await.unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);

        let rest = store
            .query(query.start_after(first.last().map(|d| d.cursor(CREATED_AT))))
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "c");
    }

    #[tokio::test]
    async fn increment_is_in_place_and_needs_a_document() {
        let store = store().await;
        assert!(store.increment("jokes", "nope", "likes", 1).await.is_err());

        let id = store.insert("jokes", json!({ "likes": 0, "setup": "s" })).await.unwrap();
        store.increment("jokes", &id, "likes", 1).await.unwrap();
        store.increment("jokes", &id, "views", 2).await.unwrap();

        let doc = store.get("jokes", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["likes"], json!(1));
        assert_eq!(doc.fields["views"], json!(2));
        assert_eq!(doc.fields["setup"], json!("s"));
    }

    #[tokio::test]
    async fn merge_is_shallow_and_remove_field_drops_keys() {
        let store = store().await;
        store.merge("users", "u1", json!({ "email": "a@b.c", "favouriteJokesIDs": ["j1", "j2"] })).await.unwrap();
        store.merge("users", "u1", json!({ "favouriteJokesIDs": ["j2"] })).await.unwrap();
        store.remove_field("users", "u1", "email").await.unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.fields, json!({ "favouriteJokesIDs": ["j2"] }));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        assert!(store().await.get("users", "ghost").await.unwrap().is_none());
    }
}
